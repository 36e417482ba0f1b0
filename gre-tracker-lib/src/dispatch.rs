//! Routing of tunnel actions to the controller.
//!
//! Deletes always run on the calling thread. Adds either run inline on the
//! packet thread, or, with `add_workers > 0`, are queued to a small pool of
//! threads over a bounded channel so that a slow script does not hold back
//! verdicts. A full queue blocks the packet thread until a worker frees a
//! slot. A queued add whose session was swept in the meantime is dropped.

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn, Span};

use crate::config::Config;
use crate::stats::Stats;
use crate::tracker::session::SessionTable;
use crate::tunnel::{Action, TunnelController, TunnelError};

/// Pending adds per worker thread.
const ADD_QUEUE_DEPTH_PER_WORKER: usize = 256;

struct DispatchCore {
    controller: TunnelController,
    table: Arc<SessionTable>,
    stats: Arc<Stats>,
    forget_failed_add: bool,
}

impl DispatchCore {
    fn add(&self, addr: Ipv4Addr) -> bool {
        let result = self.controller.apply(Action::Add, addr).map(|()| true);
        self.record_add(addr, result)
    }

    /// Add for a request that waited in the pool queue. Skipped when the
    /// session is gone by the time the address lock is held, so that a
    /// sweeper delete that ran first is not undone.
    fn add_queued(&self, addr: Ipv4Addr) -> bool {
        let result = self
            .controller
            .apply_if(Action::Add, addr, || self.table.contains(addr));
        self.record_add(addr, result)
    }

    fn record_add(&self, addr: Ipv4Addr, result: Result<bool, TunnelError>) -> bool {
        match result {
            Ok(ran) => {
                if ran {
                    self.stats.inc(&self.stats.adds_ok);
                }
                ran
            }
            Err(_) => {
                self.stats.inc(&self.stats.adds_failed);
                if self.forget_failed_add && self.table.forget(addr).is_some() {
                    warn!("forgetting {} after failed add", addr);
                }
                false
            }
        }
    }

    fn delete(&self, addr: Ipv4Addr) -> bool {
        match self.controller.apply(Action::Delete, addr) {
            Ok(()) => {
                self.stats.inc(&self.stats.deletes_ok);
                true
            }
            Err(_) => {
                self.stats.inc(&self.stats.deletes_failed);
                false
            }
        }
    }
}

struct AddPool {
    tx: Mutex<Option<Sender<Ipv4Addr>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AddPool {
    fn spawn(core: &Arc<DispatchCore>, workers: usize) -> io::Result<Self> {
        let (tx, rx) = bounded(workers * ADD_QUEUE_DEPTH_PER_WORKER);
        let span = Span::current();

        let handles = (0..workers)
            .map(|id| {
                let core = Arc::clone(core);
                let rx = rx.clone();
                let span = span.clone();
                thread::Builder::new()
                    .name(format!("gre-add-{id}"))
                    .spawn(move || {
                        let _entered = span.enter();
                        add_worker(&core, &rx)
                    })
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(AddPool {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        })
    }

    /// Hand `addr` to the pool; gives it back when the pool is closed.
    fn submit(&self, addr: Ipv4Addr) -> Result<(), Ipv4Addr> {
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => tx.send(addr).map_err(|e| e.0),
            None => Err(addr),
        }
    }

    fn close(&self) {
        self.tx.lock().take();
        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                warn!("add worker panicked");
            }
        }
    }
}

fn add_worker(core: &DispatchCore, rx: &Receiver<Ipv4Addr>) {
    for addr in rx.iter() {
        core.add_queued(addr);
    }
    debug!("add worker exiting");
}

pub struct TunnelDispatcher {
    core: Arc<DispatchCore>,
    pool: Option<AddPool>,
}

impl TunnelDispatcher {
    pub fn new(
        controller: TunnelController,
        table: Arc<SessionTable>,
        stats: Arc<Stats>,
        config: &Config,
    ) -> io::Result<Self> {
        let core = Arc::new(DispatchCore {
            controller,
            table,
            stats,
            forget_failed_add: config.forget_failed_add,
        });
        let pool = match config.add_workers {
            0 => None,
            n => Some(AddPool::spawn(&core, n)?),
        };
        Ok(TunnelDispatcher { core, pool })
    }

    pub fn table(&self) -> &Arc<SessionTable> {
        &self.core.table
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.core.stats
    }

    /// Create the tunnel for a newly seen `addr`.
    ///
    /// Inline mode blocks until the script is done; pool mode only until the
    /// request is queued.
    pub fn add(&self, addr: Ipv4Addr) {
        let addr = match &self.pool {
            Some(pool) => match pool.submit(addr) {
                Ok(()) => return,
                Err(addr) => addr,
            },
            None => addr,
        };
        self.core.add(addr);
    }

    /// Remove the tunnel of `addr`, on the calling thread.
    pub fn delete(&self, addr: Ipv4Addr) -> bool {
        self.core.delete(addr)
    }

    /// Drain the session table and delete every tunnel still tracked.
    pub fn teardown(&self) -> usize {
        let addrs = self.core.table.drain();
        for addr in &addrs {
            info!("Del GRE Tunnel: {} (shutdown)", addr);
            self.core.delete(*addr);
        }
        addrs.len()
    }

    /// Stop the add pool after the queued adds have run.
    pub fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.close();
        }
    }
}

impl Drop for TunnelDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::{Interval, Timestamp};
    use crate::tunnel::testing::ScriptEnv;

    const ENDPOINT: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);

    fn dispatcher(env: &ScriptEnv, config: &Config) -> TunnelDispatcher {
        TunnelDispatcher::new(
            env.controller.clone(),
            Arc::new(SessionTable::new()),
            Arc::new(Stats::default()),
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_inline_add_and_delete() {
        let env = ScriptEnv::new(0, "0");
        let dispatcher = dispatcher(&env, &Config::default());

        dispatcher.add(ENDPOINT);
        // inline: done by the time add returns
        assert_eq!(env.started(), vec!["gre int 203.0.113.5 brEoGREPPPoE eth0"]);

        assert!(dispatcher.delete(ENDPOINT));
        let stats = dispatcher.stats();
        assert_eq!(stats.get(&stats.adds_ok), 1);
        assert_eq!(stats.get(&stats.deletes_ok), 1);
    }

    #[test]
    fn test_failed_add_keeps_session_by_default() {
        let env = ScriptEnv::new(1, "0");
        let dispatcher = dispatcher(&env, &Config::default());

        dispatcher.table().observe_at(ENDPOINT, Timestamp::from_secs(1));
        dispatcher.add(ENDPOINT);

        assert!(dispatcher.table().contains(ENDPOINT));
        let stats = dispatcher.stats();
        assert_eq!(stats.get(&stats.adds_failed), 1);
    }

    #[test]
    fn test_failed_add_forgets_session_when_configured() {
        let env = ScriptEnv::new(1, "0");
        let config = Config {
            forget_failed_add: true,
            ..Config::default()
        };
        let dispatcher = dispatcher(&env, &config);

        dispatcher.table().observe_at(ENDPOINT, Timestamp::from_secs(1));
        dispatcher.add(ENDPOINT);

        assert!(!dispatcher.table().contains(ENDPOINT));
        // next sighting retries
        assert!(dispatcher.table().observe(ENDPOINT).is_new());
    }

    #[test]
    fn test_pool_runs_all_adds() {
        let env = ScriptEnv::new(0, "0.05");
        let config = Config {
            add_workers: 4,
            ..Config::default()
        };
        let dispatcher = dispatcher(&env, &config);

        let addrs: Vec<_> = (1..=8).map(|i| Ipv4Addr::new(198, 51, 100, i)).collect();
        for addr in &addrs {
            dispatcher.table().observe(*addr);
            dispatcher.add(*addr);
        }
        dispatcher.shutdown();

        let mut started = env.started();
        started.sort();
        let mut expected: Vec<_> = addrs
            .iter()
            .map(|a| format!("gre int {a} brEoGREPPPoE eth0"))
            .collect();
        expected.sort();
        assert_eq!(started, expected);

        // closed pool falls back to inline
        dispatcher.add(ENDPOINT);
        assert_eq!(env.started().len(), 9);
    }

    #[test]
    fn test_queued_add_skipped_after_sweep() {
        let env = ScriptEnv::new(0, "0");
        let dispatcher = dispatcher(&env, &Config::default());
        let core = &dispatcher.core;

        core.table.observe_at(ENDPOINT, Timestamp::from_secs(1));
        assert!(core.add_queued(ENDPOINT));

        // swept and deleted while a second add waited in the queue
        assert_eq!(
            core.table.sweep(Timestamp::from_secs(100), Interval::from_secs(50)),
            vec![ENDPOINT]
        );
        assert!(core.delete(ENDPOINT));
        assert!(!core.add_queued(ENDPOINT));

        assert_eq!(
            env.started(),
            vec![
                "gre int 203.0.113.5 brEoGREPPPoE eth0",
                "gre del 203.0.113.5 brEoGREPPPoE eth0",
            ]
        );
        assert_eq!(dispatcher.stats().get(&dispatcher.stats().adds_ok), 1);
    }

    #[test]
    fn test_teardown_deletes_everything() {
        let env = ScriptEnv::new(0, "0");
        let dispatcher = dispatcher(&env, &Config::default());
        let other = Ipv4Addr::new(198, 51, 100, 1);

        dispatcher.table().observe_at(ENDPOINT, Timestamp::from_secs(1));
        dispatcher.table().observe_at(other, Timestamp::from_secs(2));

        assert_eq!(dispatcher.teardown(), 2);
        assert!(dispatcher.table().is_empty());
        assert_eq!(
            env.started(),
            vec![
                "gre del 203.0.113.5 brEoGREPPPoE eth0",
                "gre del 198.51.100.1 brEoGREPPPoE eth0",
            ]
        );
    }
}
