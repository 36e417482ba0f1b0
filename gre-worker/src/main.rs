use clap::Parser;
use gre_tracker::classify::Classifier;
use gre_tracker::config::{self, Config};
use gre_tracker::dispatch::TunnelDispatcher;
use gre_tracker::lifecycle::Shutdown;
use gre_tracker::queue;
use gre_tracker::stats::Stats;
use gre_tracker::sweeper::Sweeper;
use gre_tracker::tracker::session::SessionTable;
use gre_tracker::tunnel::lock::LockDir;
use gre_tracker::tunnel::TunnelController;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, info_span, warn};

mod nfqueue;

use nfqueue::NfQueue;

#[derive(Parser, Debug)]
#[command(name = "gre-worker")]
#[command(about = "Create and expire GRE tunnels for endpoints seen on an NFQUEUE", long_about = None)]
struct Args {
    /// Netfilter queue number
    #[arg(short, long, default_value_t = config::DEFAULT_QUEUE_ID)]
    queue: u16,

    /// Idle seconds before an endpoint's tunnel is removed
    #[arg(short, long, value_name = "SECS", default_value_t = config::DEFAULT_IDLE_TIMEOUT_SECS)]
    timeout: u64,

    /// Tunnel control script
    #[arg(short, long, value_name = "FILE", default_value = config::DEFAULT_SCRIPT)]
    script: PathBuf,

    /// Bridge interface passed to the script
    #[arg(short, long, default_value = config::DEFAULT_BRIDGE_IFACE)]
    bridge: String,

    /// WAN interface passed to the script
    #[arg(short, long, default_value = config::DEFAULT_WAN_IFACE)]
    wan: String,

    /// Directory for per-endpoint lock files
    #[arg(long, value_name = "DIR", default_value = config::DEFAULT_LOCK_DIR)]
    lock_dir: PathBuf,

    /// Interpreter for the script, empty to execute it directly
    #[arg(long, default_value = config::DEFAULT_INTERPRETER)]
    interpreter: String,

    /// Seconds between idle sweeps
    #[arg(long, value_name = "SECS", default_value_t = config::DEFAULT_SWEEP_INTERVAL_SECS)]
    sweep_interval: u64,

    /// Queue wait before re-checking for shutdown
    #[arg(long, value_name = "MS", default_value_t = config::DEFAULT_POLL_TIMEOUT_MS)]
    poll_timeout_ms: u64,

    /// Kernel queue length
    #[arg(long, default_value_t = config::DEFAULT_QUEUE_MAXLEN)]
    queue_maxlen: u32,

    /// Threads running tunnel adds, 0 to add on the packet thread
    #[arg(long, default_value_t = 0)]
    add_workers: usize,

    /// Delete every tracked tunnel on shutdown
    #[arg(long)]
    teardown_on_exit: bool,

    /// Forget an endpoint whose add failed, so its next packet retries
    #[arg(long)]
    forget_failed_add: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            queue_id: args.queue,
            idle_timeout: args.timeout,
            script: args.script,
            interpreter: args.interpreter,
            bridge_iface: args.bridge,
            wan_iface: args.wan,
            lock_dir: args.lock_dir,
            sweep_interval: args.sweep_interval,
            poll_timeout_ms: args.poll_timeout_ms,
            queue_maxlen: args.queue_maxlen,
            add_workers: args.add_workers,
            teardown_on_exit: args.teardown_on_exit,
            forget_failed_add: args.forget_failed_add,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from(Args::parse());
    let _span = info_span!("worker", q = config.queue_id).entered();

    if let Err(e) = run(&config) {
        error!("{}", e);
        std::process::exit(2);
    }
}

/// Set up, serve the queue until a signal arrives, then wind down.
fn run(config: &Config) -> Result<(), String> {
    let locks = LockDir::prepare(&config.lock_dir).map_err(|e| e.to_string())?;

    let shutdown = Shutdown::new();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, shutdown.flag())
            .map_err(|e| format!("cannot install handler for signal {signal}: {e}"))?;
    }

    let stats = Arc::new(Stats::default());
    let table = Arc::new(SessionTable::new());
    let controller = TunnelController::new(config, locks);
    let dispatcher = Arc::new(
        TunnelDispatcher::new(controller, table, Arc::clone(&stats), config)
            .map_err(|e| format!("cannot start add workers: {e}"))?,
    );

    let mut nfq = NfQueue::open(config)
        .map_err(|e| format!("cannot open queue {}: {}", config.queue_id, e))?;

    let sweeper = Sweeper::new(Arc::clone(&dispatcher), config)
        .spawn(shutdown.clone())
        .map_err(|e| format!("cannot start sweeper: {e}"))?;

    info!(
        "Worker started. queue={} timeout={}s script={}",
        config.queue_id,
        config.idle_timeout,
        config.script.display()
    );

    let mut classifier = Classifier::new(Arc::clone(&dispatcher));
    queue::run(&mut nfq, &mut classifier, &shutdown, config.poll_timeout());

    info!("Shutting down...");
    drop(nfq);
    drop(classifier);

    shutdown.trigger();
    if sweeper.join().is_err() {
        warn!("sweeper thread panicked");
    }
    dispatcher.shutdown();

    if config.teardown_on_exit {
        let removed = dispatcher.teardown();
        info!("removed {} tunnels", removed);
    }

    info!("{}", stats);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gre_tracker::timestamp::Interval;

    #[test]
    fn test_defaults_match_config() {
        let args = Args::try_parse_from(["gre-worker"]).unwrap();
        assert_eq!(Config::from(args), Config::default());
    }

    #[test]
    fn test_short_flags() {
        let args = Args::try_parse_from([
            "gre-worker",
            "-q",
            "3",
            "-t",
            "120",
            "-s",
            "/opt/tun.sh",
            "-b",
            "br0",
            "-w",
            "wan1",
        ])
        .unwrap();
        let config = Config::from(args);

        assert_eq!(config.queue_id, 3);
        assert_eq!(config.idle_timeout, 120);
        assert_eq!(config.script, PathBuf::from("/opt/tun.sh"));
        assert_eq!(config.bridge_iface, "br0");
        assert_eq!(config.wan_iface, "wan1");
    }

    #[test]
    fn test_long_only_flags() {
        let args = Args::try_parse_from([
            "gre-worker",
            "--lock-dir",
            "/tmp/locks",
            "--interpreter",
            "",
            "--add-workers",
            "2",
            "--teardown-on-exit",
            "--forget-failed-add",
        ])
        .unwrap();
        let config = Config::from(args);

        assert_eq!(config.lock_dir, PathBuf::from("/tmp/locks"));
        assert!(config.interpreter.is_empty());
        assert_eq!(config.add_workers, 2);
        assert!(config.teardown_on_exit);
        assert!(config.forget_failed_add);
    }

    #[test]
    fn test_huge_timeout_stays_positive() {
        let args = Args::try_parse_from(["gre-worker", "-t", "18446744073709551615"]).unwrap();
        assert!(Config::from(args).idle_timeout() > Interval::ZERO);
    }

    #[test]
    fn test_rejects_bad_queue() {
        assert!(Args::try_parse_from(["gre-worker", "-q", "70000"]).is_err());
        assert!(Args::try_parse_from(["gre-worker", "-t", "soon"]).is_err());
    }
}
