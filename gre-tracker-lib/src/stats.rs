use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

/// Packet-thread counters, batched to avoid an atomic per packet
///
/// The packet loop accumulates here and periodically flushes into the
/// shared [`Stats`].
///
/// ```ignore
/// let stats = Arc::new(Stats::default());
/// let mut local = LocalStats::new();
///
/// for packet in packets {
///     local.packets += 1;
///     if local.should_flush(FLUSH_INTERVAL) {
///         local.flush(&stats);
///     }
/// }
/// local.flush(&stats);
/// ```
#[derive(Default, Debug, Clone)]
pub struct LocalStats {
    pub packets: u64,
    pub bytes: u64,
    pub too_short: u64,
    pub not_ipv4: u64,
    pub not_gre: u64,
    pub gre: u64,
    pub new_sessions: u64,
}

impl LocalStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all local counters to the shared stats and reset them
    #[inline]
    pub fn flush(&mut self, stats: &Stats) {
        macro_rules! flush_counter {
            ($field:ident) => {
                if self.$field > 0 {
                    stats.$field.fetch_add(self.$field, Ordering::Relaxed);
                    self.$field = 0;
                }
            };
        }

        flush_counter!(packets);
        flush_counter!(bytes);
        flush_counter!(too_short);
        flush_counter!(not_ipv4);
        flush_counter!(not_gre);
        flush_counter!(gre);
        flush_counter!(new_sessions);
    }

    /// True every `interval` packets (`interval` must be a power of 2)
    #[inline]
    pub fn should_flush(&self, interval: u64) -> bool {
        self.packets & (interval - 1) == 0
    }
}

/// Flush interval for local stats (must be power of 2)
pub const FLUSH_INTERVAL: u64 = 1024;

#[derive(Default, Debug)]
pub struct Stats {
    // Packet thread
    pub packets: AtomicU64,
    pub bytes: AtomicU64,
    pub too_short: AtomicU64,
    pub not_ipv4: AtomicU64,
    pub not_gre: AtomicU64,
    pub gre: AtomicU64,
    pub new_sessions: AtomicU64,

    // Tunnel control, from any thread
    pub adds_ok: AtomicU64,
    pub adds_failed: AtomicU64,
    pub deletes_ok: AtomicU64,
    pub deletes_failed: AtomicU64,
    pub expired: AtomicU64,
}

impl Stats {
    #[inline]
    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "packets={} bytes={} short={} non-ipv4={} non-gre={} gre={} \
             sessions={} add ok/fail={}/{} del ok/fail={}/{} expired={}",
            self.get(&self.packets),
            self.get(&self.bytes),
            self.get(&self.too_short),
            self.get(&self.not_ipv4),
            self.get(&self.not_gre),
            self.get(&self.gre),
            self.get(&self.new_sessions),
            self.get(&self.adds_ok),
            self.get(&self.adds_failed),
            self.get(&self.deletes_ok),
            self.get(&self.deletes_failed),
            self.get(&self.expired),
        )
    }
}
