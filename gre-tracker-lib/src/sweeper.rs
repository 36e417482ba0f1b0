//! Idle-session sweeper.
//!
//! A background thread that wakes every `sweep_interval`, evicts sessions
//! idle for longer than the timeout, and deletes their tunnels one at a
//! time. The table lock is released before the first delete, so packet
//! processing is never blocked on the control script.

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, Span};

use crate::config::Config;
use crate::dispatch::TunnelDispatcher;
use crate::lifecycle::Shutdown;
use crate::timestamp::{Interval, Timestamp};

pub struct Sweeper {
    dispatcher: Arc<TunnelDispatcher>,
    idle_timeout: Interval,
    interval: Duration,
}

impl Sweeper {
    pub fn new(dispatcher: Arc<TunnelDispatcher>, config: &Config) -> Self {
        Sweeper {
            dispatcher,
            idle_timeout: config.idle_timeout(),
            interval: config.sweep_interval(),
        }
    }

    /// One sweep at `now`: evict expired sessions, then delete their
    /// tunnels sequentially. Returns the evicted addresses.
    pub fn sweep_once(&self, now: Timestamp) -> Vec<Ipv4Addr> {
        let expired = self.dispatcher.table().sweep(now, self.idle_timeout);
        let stats = self.dispatcher.stats();
        for addr in &expired {
            stats.inc(&stats.expired);
            info!(
                "Del GRE Tunnel: {} (timeout {}s)",
                addr,
                self.idle_timeout.as_secs()
            );
            self.dispatcher.delete(*addr);
        }
        expired
    }

    /// Sweep until `shutdown` is triggered.
    pub fn run(&self, shutdown: &Shutdown) {
        debug!("sweeper started, interval {:?}", self.interval);
        while shutdown.sleep(self.interval) {
            self.sweep_once(Timestamp::monotonic());
        }
        debug!("sweeper stopped");
    }

    /// Run on a dedicated thread, inside the caller's tracing span.
    pub fn spawn(self, shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
        let span = Span::current();
        thread::Builder::new()
            .name("gre-sweeper".to_string())
            .spawn(move || {
                let _entered = span.enter();
                self.run(&shutdown)
            })
    }
}
