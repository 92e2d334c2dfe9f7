//! Signal handling for interactive sessions.
//!
//! SIGINT and SIGTERM must both route through session cleanup, so a killed
//! session never leaves firewall drops applied silently. Registration
//! failures (containers, restricted environments) degrade gracefully to a
//! never-resolving signal source.

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::warn;

/// Unified SIGINT + SIGTERM source.
pub struct Signals {
    sigint: Option<Signal>,
    sigterm: Option<Signal>,
}

impl Signals {
    /// Install handlers. Failures are logged, not fatal; with neither
    /// handler registered, [`recv`](Signals::recv) never resolves.
    pub fn install() -> Self {
        let sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => Some(s),
            Err(err) => {
                warn!("Failed to register SIGINT handler: {}", err);
                None
            }
        };
        let sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(err) => {
                warn!("Failed to register SIGTERM handler: {}", err);
                None
            }
        };
        if sigint.is_none() && sigterm.is_none() {
            warn!("No signal handlers registered; cleanup on signal disabled");
        }
        Self { sigint, sigterm }
    }

    /// Wait for the next termination signal.
    pub async fn recv(&mut self) {
        match (&mut self.sigint, &mut self.sigterm) {
            (Some(int), Some(term)) => {
                tokio::select! {
                    _ = int.recv() => {}
                    _ = term.recv() => {}
                }
            }
            (Some(int), None) => {
                int.recv().await;
            }
            (None, Some(term)) => {
                term.recv().await;
            }
            (None, None) => std::future::pending().await,
        }
    }
}
