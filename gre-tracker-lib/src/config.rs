use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::timestamp::Interval;

pub const DEFAULT_QUEUE_ID: u16 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 50;
pub const DEFAULT_SCRIPT: &str = "./eogre_v4_pppoe.sh";
pub const DEFAULT_INTERPRETER: &str = "bash";
pub const DEFAULT_BRIDGE_IFACE: &str = "brEoGREPPPoE";
pub const DEFAULT_WAN_IFACE: &str = "eth0";
pub const DEFAULT_LOCK_DIR: &str = "/run/eogrelocks";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_QUEUE_MAXLEN: u32 = 8192;

/// Worker configuration, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Netfilter queue number to bind.
    pub queue_id: u16,
    /// Seconds without traffic after which an endpoint's tunnel is removed.
    pub idle_timeout: u64,
    /// Tunnel control script.
    pub script: PathBuf,
    /// Program used to run the script; empty executes the script directly.
    pub interpreter: String,
    /// Bridge the tunnels are attached to.
    pub bridge_iface: String,
    /// WAN device the GRE traffic arrives on.
    pub wan_iface: String,
    /// Directory holding one lock file per endpoint.
    pub lock_dir: PathBuf,
    /// Seconds between two sweeps of the session table.
    pub sweep_interval: u64,
    /// Milliseconds to wait on the queue before re-checking for shutdown.
    pub poll_timeout_ms: u64,
    /// Kernel-side queue length.
    pub queue_maxlen: u32,
    /// Threads running tunnel adds; 0 runs them on the packet thread.
    pub add_workers: usize,
    /// Delete every tracked tunnel on graceful shutdown.
    pub teardown_on_exit: bool,
    /// Drop the session when its add fails, so the next packet retries.
    pub forget_failed_add: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            queue_id: DEFAULT_QUEUE_ID,
            idle_timeout: DEFAULT_IDLE_TIMEOUT_SECS,
            script: PathBuf::from(DEFAULT_SCRIPT),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            bridge_iface: DEFAULT_BRIDGE_IFACE.to_string(),
            wan_iface: DEFAULT_WAN_IFACE.to_string(),
            lock_dir: PathBuf::from(DEFAULT_LOCK_DIR),
            sweep_interval: DEFAULT_SWEEP_INTERVAL_SECS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            queue_maxlen: DEFAULT_QUEUE_MAXLEN,
            add_workers: 0,
            teardown_on_exit: false,
            forget_failed_add: false,
        }
    }
}

impl Config {
    #[inline]
    pub fn idle_timeout(&self) -> Interval {
        Interval::from_secs(self.idle_timeout)
    }

    #[inline]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    #[inline]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.queue_id, 0);
        assert_eq!(config.idle_timeout(), Interval::from_secs(50));
        assert_eq!(config.script, PathBuf::from("./eogre_v4_pppoe.sh"));
        assert_eq!(config.bridge_iface, "brEoGREPPPoE");
        assert_eq!(config.wan_iface, "eth0");
        assert_eq!(config.lock_dir, PathBuf::from("/run/eogrelocks"));
        assert_eq!(config.sweep_interval(), Duration::from_secs(2));
        assert_eq!(config.poll_timeout(), Duration::from_secs(1));
        assert_eq!(config.add_workers, 0);
        assert!(!config.teardown_on_exit);
        assert!(!config.forget_failed_add);
    }

    #[test]
    fn test_sweep_interval_never_zero() {
        let config = Config {
            sweep_interval: 0,
            ..Config::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }
}
