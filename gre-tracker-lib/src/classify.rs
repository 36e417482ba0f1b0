//! Packet classification.
//!
//! Every queued packet is inspected for an IPv4 header carrying GRE. The
//! source of a GRE packet is recorded in the session table, and the first
//! sighting of a source triggers a tunnel add. The verdict is always
//! accept: the worker only watches traffic, it never filters it.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{info, trace};

use crate::dispatch::TunnelDispatcher;
use crate::packet::ipv4::Ipv4Header;
use crate::packet::{PacketHeader, PacketHeaderError};
use crate::stats::{LocalStats, FLUSH_INTERVAL};

/// Verdict returned to the packet source. Packets are only ever accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
}

/// What a packet turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Shorter than an IPv4 header.
    TooShort,
    /// Version field is not 4.
    NotIpv4,
    /// IPv4, some protocol other than GRE.
    NotGre,
    /// GRE over IPv4 from this source.
    Gre(Ipv4Addr),
}

/// Decide what `payload` is from its IPv4 header alone.
pub fn inspect(payload: &[u8]) -> Classification {
    match Ipv4Header::from_prefix(payload) {
        Ok((header, _)) if header.is_gre() => Classification::Gre(header.src_ip()),
        Ok(_) => Classification::NotGre,
        Err(PacketHeaderError::TooShort(_)) => Classification::TooShort,
        Err(PacketHeaderError::Invalid(_)) => Classification::NotIpv4,
    }
}

pub struct Classifier {
    dispatcher: Arc<TunnelDispatcher>,
    local: LocalStats,
}

impl Classifier {
    pub fn new(dispatcher: Arc<TunnelDispatcher>) -> Self {
        Classifier {
            dispatcher,
            local: LocalStats::new(),
        }
    }

    /// Classify one packet and return its verdict.
    ///
    /// A new GRE source is added before returning; in inline mode this
    /// blocks for as long as the control script runs.
    pub fn classify(&mut self, payload: &[u8]) -> Verdict {
        self.local.packets += 1;
        self.local.bytes += payload.len() as u64;

        match inspect(payload) {
            Classification::TooShort => self.local.too_short += 1,
            Classification::NotIpv4 => self.local.not_ipv4 += 1,
            Classification::NotGre => self.local.not_gre += 1,
            Classification::Gre(src) => {
                self.local.gre += 1;
                if self.dispatcher.table().observe(src).is_new() {
                    self.local.new_sessions += 1;
                    info!("Add GRE Tunnel: {}", src);
                    self.dispatcher.add(src);
                } else {
                    trace!("GRE from {} refreshed", src);
                }
            }
        }

        if self.local.should_flush(FLUSH_INTERVAL) {
            self.flush_stats();
        }

        Verdict::Accept
    }

    /// Push batched counters to the shared stats.
    pub fn flush_stats(&mut self) {
        self.local.flush(self.dispatcher.stats());
    }
}

impl Drop for Classifier {
    fn drop(&mut self) {
        self.flush_stats();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::stats::Stats;
    use crate::testing::capture_logs;
    use crate::tracker::session::SessionTable;
    use crate::tunnel::testing::ScriptEnv;

    const ENDPOINT: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);

    pub(crate) fn ipv4_packet(version: u8, protocol: u8, src: Ipv4Addr) -> Vec<u8> {
        // IHL 5, total length 24, TTL 64, no checksum
        let mut packet = vec![(version << 4) | 5, 0x00, 0x00, 0x18];
        packet.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x40, protocol, 0x00, 0x00]);
        packet.extend_from_slice(&src.octets());
        packet.extend_from_slice(&[192, 0, 2, 1]);
        packet.extend_from_slice(&[0x00, 0x00, 0x65, 0x58]);
        packet
    }

    fn classifier(env: &ScriptEnv) -> Classifier {
        let dispatcher = TunnelDispatcher::new(
            env.controller.clone(),
            Arc::new(SessionTable::new()),
            Arc::new(Stats::default()),
            &Config::default(),
        )
        .unwrap();
        Classifier::new(Arc::new(dispatcher))
    }

    #[test]
    fn test_inspect() {
        assert_eq!(inspect(&ipv4_packet(4, 47, ENDPOINT)), Classification::Gre(ENDPOINT));
        assert_eq!(inspect(&ipv4_packet(4, 6, ENDPOINT)), Classification::NotGre);
        assert_eq!(inspect(&ipv4_packet(6, 47, ENDPOINT)), Classification::NotIpv4);
        assert_eq!(inspect(&[0x45; 19]), Classification::TooShort);
        assert_eq!(inspect(&[]), Classification::TooShort);
    }

    #[test]
    fn test_inspect_header_only_capture() {
        // queue copy range truncates right after the fixed header
        let packet = ipv4_packet(4, 47, ENDPOINT);
        assert_eq!(inspect(&packet[..20]), Classification::Gre(ENDPOINT));
    }

    #[test]
    fn test_new_gre_source_adds_tunnel_once() {
        let env = ScriptEnv::new(0, "0");
        let mut classifier = classifier(&env);
        let packet = ipv4_packet(4, 47, ENDPOINT);

        let (verdicts, logs) =
            capture_logs(|| [classifier.classify(&packet), classifier.classify(&packet)]);
        assert_eq!(verdicts, [Verdict::Accept, Verdict::Accept]);

        assert_eq!(logs.matches("Add GRE Tunnel: 203.0.113.5").count(), 1);
        assert_eq!(env.started(), vec!["gre int 203.0.113.5 brEoGREPPPoE eth0"]);
        assert!(classifier.dispatcher.table().contains(ENDPOINT));
    }

    #[test]
    fn test_non_gre_is_accepted_untouched() {
        let env = ScriptEnv::new(0, "0");
        let mut classifier = classifier(&env);

        assert_eq!(classifier.classify(&ipv4_packet(4, 6, ENDPOINT)), Verdict::Accept);
        assert_eq!(classifier.classify(&ipv4_packet(6, 47, ENDPOINT)), Verdict::Accept);

        assert!(classifier.dispatcher.table().is_empty());
        assert!(env.calls().is_empty());
    }

    #[test]
    fn test_short_packet_is_accepted() {
        let env = ScriptEnv::new(0, "0");
        let mut classifier = classifier(&env);

        assert_eq!(classifier.classify(&[0x45, 0x00, 0x00]), Verdict::Accept);
        assert_eq!(classifier.classify(&[]), Verdict::Accept);
        assert!(classifier.dispatcher.table().is_empty());
    }

    #[test]
    fn test_failed_add_still_accepts() {
        let env = ScriptEnv::new(1, "0");
        let mut classifier = classifier(&env);

        let verdict = classifier.classify(&ipv4_packet(4, 47, ENDPOINT));
        assert_eq!(verdict, Verdict::Accept);
        // entry stays: no retry on the next packet
        classifier.classify(&ipv4_packet(4, 47, ENDPOINT));
        assert_eq!(env.started().len(), 1);
    }

    #[test]
    fn test_stats_flushed() {
        let env = ScriptEnv::new(0, "0");
        let mut classifier = classifier(&env);
        let stats = Arc::clone(classifier.dispatcher.stats());

        classifier.classify(&ipv4_packet(4, 47, ENDPOINT));
        classifier.classify(&ipv4_packet(4, 17, ENDPOINT));
        classifier.classify(&[0u8; 4]);
        classifier.flush_stats();

        assert_eq!(stats.get(&stats.packets), 3);
        assert_eq!(stats.get(&stats.gre), 1);
        assert_eq!(stats.get(&stats.not_gre), 1);
        assert_eq!(stats.get(&stats.too_short), 1);
        assert_eq!(stats.get(&stats.new_sessions), 1);
        assert_eq!(stats.get(&stats.adds_ok), 1);
    }
}
