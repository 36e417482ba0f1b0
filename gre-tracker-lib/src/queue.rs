//! Packet source interface and the packet loop.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use tracing::error;

use crate::classify::{Classifier, Verdict};
use crate::lifecycle::Shutdown;

/// A source of packets that each need a verdict.
///
/// The packet handle itself is the opaque identifier the verdict refers to.
pub trait PacketQueue {
    type Packet;

    /// Wait up to `timeout` for the next packet; `Ok(None)` on timeout.
    fn recv_timeout(&mut self, timeout: Duration) -> io::Result<Option<Self::Packet>>;

    /// Bytes of the packet, starting at the IP header.
    fn payload<'a>(&self, packet: &'a Self::Packet) -> &'a [u8];

    /// Issue `verdict` for `packet`.
    fn verdict(&mut self, packet: Self::Packet, verdict: Verdict) -> io::Result<()>;
}

/// Pause between two attempts of [`recv_until`].
pub const RECV_RETRY_STEP: Duration = Duration::from_millis(5);

/// Bounded wait over a non-blocking receive.
///
/// Calls `try_recv` until it yields a packet or fails, sleeping `step`
/// between attempts; `Ok(None)` once `timeout` has elapsed. `try_recv` is
/// called at least once, even with a zero timeout.
pub fn recv_until<T, F>(
    timeout: Duration,
    step: Duration,
    mut try_recv: F,
) -> io::Result<Option<T>>
where
    F: FnMut() -> io::Result<Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(packet) = try_recv()? {
            return Ok(Some(packet));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(step.min(deadline - now));
    }
}

/// Classify packets from `queue` until `shutdown` is triggered.
///
/// Receive and verdict errors are logged and the loop carries on;
/// interrupted waits are retried silently.
pub fn run<Q: PacketQueue>(
    queue: &mut Q,
    classifier: &mut Classifier,
    shutdown: &Shutdown,
    poll_timeout: Duration,
) {
    while !shutdown.is_triggered() {
        let packet = match queue.recv_timeout(poll_timeout) {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                classifier.flush_stats();
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("recv error: {}", e);
                continue;
            }
        };

        let verdict = classifier.classify(queue.payload(&packet));
        if let Err(e) = queue.verdict(packet, verdict) {
            error!("set verdict failed: {}", e);
        }
    }
    classifier.flush_stats();
}
