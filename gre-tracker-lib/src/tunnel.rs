//! Tunnel control.
//!
//! Tunnels are created and removed by an external script, invoked as
//!
//! ```text
//! [interpreter] <script> gre <int|del> <addr> <bridge_iface> <wan_iface>
//! ```
//!
//! Every invocation runs under the per-address file lock, so an add and a
//! delete for the same endpoint never overlap. The script is expected to be
//! idempotent; failures are reported to the caller and never retried here.

use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::Config;

pub mod lock;

use lock::LockDir;

/// First positional argument of every script invocation.
pub const DOMAIN_TAG: &str = "gre";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    Add,
    Delete,
}

impl Action {
    /// Verb understood by the control script.
    #[inline]
    pub fn as_arg(&self) -> &'static str {
        match self {
            Action::Add => "int",
            Action::Delete => "del",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Add => write!(f, "add"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("lock_ip({addr}) failed: {source}")]
    Lock { addr: Ipv4Addr, source: io::Error },
    #[error("spawn {program} failed: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("script exit status={status} action={action} ip={addr}")]
    Exit {
        action: &'static str,
        addr: Ipv4Addr,
        status: ExitStatus,
    },
}

#[derive(Debug, Clone)]
pub struct TunnelController {
    script: PathBuf,
    interpreter: Option<String>,
    bridge_iface: String,
    wan_iface: String,
    locks: LockDir,
}

impl TunnelController {
    pub fn new(config: &Config, locks: LockDir) -> Self {
        TunnelController {
            script: config.script.clone(),
            interpreter: Some(config.interpreter.clone()).filter(|i| !i.is_empty()),
            bridge_iface: config.bridge_iface.clone(),
            wan_iface: config.wan_iface.clone(),
            locks,
        }
    }

    pub fn locks(&self) -> &LockDir {
        &self.locks
    }

    /// Build the script invocation for `action` on `addr`.
    pub fn command(&self, action: Action, addr: Ipv4Addr) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.script);
                cmd
            }
            None => Command::new(&self.script),
        };
        cmd.arg(DOMAIN_TAG)
            .arg(action.as_arg())
            .arg(addr.to_string())
            .arg(&self.bridge_iface)
            .arg(&self.wan_iface)
            .stdin(Stdio::null());
        cmd
    }

    /// Run `action` for `addr` and wait for the script to finish.
    ///
    /// Blocks first on the address lock, then on the child process; neither
    /// wait has a timeout. The lock is released on every exit path.
    pub fn apply(&self, action: Action, addr: Ipv4Addr) -> Result<(), TunnelError> {
        self.apply_if(action, addr, || true).map(|_| ())
    }

    /// Like [`apply`](Self::apply), but once the address lock is held the
    /// script only runs if `wanted()` still agrees. Returns whether it ran.
    pub fn apply_if<F>(
        &self,
        action: Action,
        addr: Ipv4Addr,
        wanted: F,
    ) -> Result<bool, TunnelError>
    where
        F: FnOnce() -> bool,
    {
        let result = self.run(action, addr, wanted);
        if let Err(e) = &result {
            error!("{} {} failed: {}", action, addr, e);
        }
        result
    }

    fn run<F>(&self, action: Action, addr: Ipv4Addr, wanted: F) -> Result<bool, TunnelError>
    where
        F: FnOnce() -> bool,
    {
        let _guard = self
            .locks
            .lock(addr)
            .map_err(|source| TunnelError::Lock { addr, source })?;

        if !wanted() {
            debug!("script {} {} no longer needed", action.as_arg(), addr);
            return Ok(false);
        }

        let mut cmd = self.command(action, addr);
        let status = cmd.status().map_err(|source| TunnelError::Spawn {
            program: cmd.get_program().to_string_lossy().into_owned(),
            source,
        })?;

        if status.success() {
            debug!("script {} {} done", action.as_arg(), addr);
            Ok(true)
        } else {
            Err(TunnelError::Exit {
                action: action.as_arg(),
                addr,
                status,
            })
        }
    }
}
