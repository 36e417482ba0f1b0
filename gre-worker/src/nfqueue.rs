//! Netfilter queue backed packet source.

use std::io;
use std::time::Duration;

use gre_tracker::classify::Verdict;
use gre_tracker::config::Config;
use gre_tracker::packet::ipv4::IPV4_MIN_HEADER_LEN;
use gre_tracker::queue::{self, PacketQueue, RECV_RETRY_STEP};
use nfq::{Message, Queue};
use tracing::{debug, warn};

pub struct NfQueue {
    queue: Queue,
    queue_id: u16,
}

impl NfQueue {
    /// Open and bind the queue, copying only the IPv4 header of each packet.
    pub fn open(config: &Config) -> io::Result<Self> {
        let mut queue = Queue::open()?;
        queue.bind(config.queue_id)?;
        queue.set_copy_range(config.queue_id, IPV4_MIN_HEADER_LEN as u16)?;
        queue.set_queue_max_len(config.queue_id, config.queue_maxlen)?;
        queue.set_nonblocking(true);

        Ok(NfQueue {
            queue,
            queue_id: config.queue_id,
        })
    }

    /// Non-blocking receive; `Ok(None)` when nothing is pending.
    fn try_recv(&mut self) -> io::Result<Option<Message>> {
        match self.queue.recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl PacketQueue for NfQueue {
    type Packet = Message;

    fn recv_timeout(&mut self, timeout: Duration) -> io::Result<Option<Message>> {
        queue::recv_until(timeout, RECV_RETRY_STEP, || self.try_recv())
    }

    fn payload<'a>(&self, packet: &'a Message) -> &'a [u8] {
        packet.get_payload()
    }

    fn verdict(&mut self, mut packet: Message, verdict: Verdict) -> io::Result<()> {
        packet.set_verdict(match verdict {
            Verdict::Accept => nfq::Verdict::Accept,
        });
        self.queue.verdict(packet)
    }
}

impl Drop for NfQueue {
    fn drop(&mut self) {
        match self.queue.unbind(self.queue_id) {
            Ok(()) => debug!("unbound queue {}", self.queue_id),
            Err(e) => warn!("unbind queue {} failed: {}", self.queue_id, e),
        }
    }
}
