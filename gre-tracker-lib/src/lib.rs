//! GRE endpoint tracking.
//!
//! Watches queued IPv4 packets for GRE, keeps a table of the remote
//! endpoints currently sending it, and drives an external control script
//! to create a tunnel when an endpoint appears and to remove it once the
//! endpoint has been idle for the configured timeout.
//!
//! The moving parts:
//!
//! - [`classify::Classifier`] inspects each packet and always accepts it.
//! - [`tracker::session::SessionTable`] records which endpoints are active.
//! - [`tunnel::TunnelController`] runs the script under a per-endpoint lock.
//! - [`dispatch::TunnelDispatcher`] routes adds and deletes to the controller.
//! - [`sweeper::Sweeper`] expires idle endpoints in the background.
//! - [`lifecycle::Shutdown`] stops the packet loop and the sweeper.

#[macro_use]
mod macros;

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod packet;
pub mod queue;
pub mod stats;
pub mod sweeper;
pub mod timestamp;
pub mod tracker;
pub mod tunnel;

#[cfg(test)]
mod testing;
