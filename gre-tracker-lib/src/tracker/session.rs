//! Session table: which GRE endpoints are currently active.
//!
//! A single mutex guards a recency-ordered map from endpoint address to
//! [`SessionEntry`]. Times come from the monotonic clock, so wall-clock
//! steps neither delay nor hasten expiry. Both operations hold the lock
//! only for the map work itself; callers act on the results (tunnel
//! add/delete) after the lock is released.

use std::net::Ipv4Addr;

use parking_lot::Mutex;
use serde::Serialize;

use crate::timestamp::{Interval, Timestamp};
use crate::tracker::{Trackable, Tracker};

/// Pre-sized number of sessions.
pub const DEFAULT_TABLE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionEntry {
    /// Time of the first packet of this session.
    pub first_seen: Timestamp,
    /// Time of the most recent packet.
    pub last_seen: Timestamp,
    /// Packets observed since the session started.
    pub packets: u64,
}

impl Trackable for SessionEntry {
    type Timestamp = Timestamp;

    fn timestamp(&self) -> Timestamp {
        self.last_seen
    }

    fn set_timestamp(&mut self, ts: Timestamp) {
        self.last_seen = self.last_seen.max(ts);
    }
}

/// Result of [`SessionTable::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sighting since the address was last evicted.
    New,
    /// The address was already tracked; its `last_seen` was advanced.
    Refreshed,
}

impl Observation {
    #[inline]
    pub fn is_new(&self) -> bool {
        matches!(self, Observation::New)
    }
}

pub struct SessionTable {
    sessions: Mutex<Tracker<Ipv4Addr, SessionEntry>>,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TABLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SessionTable {
            sessions: Mutex::new(Tracker::with_capacity(capacity)),
        }
    }

    /// Insert-or-touch `addr` at the current [monotonic](Timestamp::monotonic) time.
    ///
    /// The clock is read under the table lock, so touch order is also
    /// `last_seen` order.
    pub fn observe(&self, addr: Ipv4Addr) -> Observation {
        let mut sessions = self.sessions.lock();
        Self::touch(&mut sessions, addr, Timestamp::monotonic())
    }

    /// Insert-or-touch `addr` at `now`.
    ///
    /// At most one caller sees [`Observation::New`] for an address between
    /// two evictions of it.
    pub fn observe_at(&self, addr: Ipv4Addr, now: Timestamp) -> Observation {
        Self::touch(&mut self.sessions.lock(), addr, now)
    }

    fn touch(
        sessions: &mut Tracker<Ipv4Addr, SessionEntry>,
        addr: Ipv4Addr,
        now: Timestamp,
    ) -> Observation {
        let (entry, created) = sessions.touch_or_insert_with(&addr, now, || SessionEntry {
            first_seen: now,
            last_seen: now,
            packets: 0,
        });
        entry.packets += 1;

        if created {
            Observation::New
        } else {
            Observation::Refreshed
        }
    }

    /// Remove every session idle for strictly longer than `idle_timeout`
    /// at `now` and return their addresses, least recently touched first.
    pub fn sweep(&self, now: Timestamp, idle_timeout: Interval) -> Vec<Ipv4Addr> {
        self.sessions
            .lock()
            .evict_where(|_, entry| now - entry.last_seen > idle_timeout)
            .into_iter()
            .map(|(addr, _)| addr)
            .collect()
    }

    /// Drop `addr` without waiting for it to expire.
    pub fn forget(&self, addr: Ipv4Addr) -> Option<SessionEntry> {
        self.sessions.lock().remove(&addr)
    }

    /// Remove all sessions, oldest first.
    pub fn drain(&self) -> Vec<Ipv4Addr> {
        self.sessions
            .lock()
            .drain()
            .into_iter()
            .map(|(addr, _)| addr)
            .collect()
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.sessions.lock().get(&addr).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, addr: Ipv4Addr) -> Option<SessionEntry> {
        self.sessions.lock().get(&addr).copied()
    }

    /// Addresses currently tracked, least recently touched first.
    #[cfg(test)]
    pub(crate) fn addresses(&self) -> Vec<Ipv4Addr> {
        self.sessions.lock().iter().map(|(addr, _)| *addr).collect()
    }
}
