//! Process shutdown coordination.
//!
//! One [`Shutdown`] per process. Signal handlers are installed at most once
//! and the first trigger wins; later triggers are ignored.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Why the process is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C / SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// Requested from code.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupt"),
            Self::Terminate => f.write_str("terminate"),
            Self::Requested => f.write_str("requested"),
        }
    }
}

/// Cloneable shutdown trigger shared between signal handlers and the session.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
    signals_installed: Arc<AtomicBool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(None)),
            signals_installed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request shutdown. Returns `false` if shutdown was already requested.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self.tx.send_if_modified(|current| {
            if current.is_some() {
                false
            } else {
                *current = Some(reason);
                true
            }
        });
        if first {
            info!(%reason, "Shutdown requested");
        } else {
            debug!(%reason, "Shutdown already in progress");
        }
        first
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// Resolves with the first trigger's reason.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ShutdownReason::Requested),
            // The sender lives in `self`, so this is unreachable in practice.
            Err(_) => ShutdownReason::Requested,
        }
    }

    /// Spawn a task that triggers shutdown on Ctrl+C or SIGTERM.
    ///
    /// Returns `Ok(None)` if handlers were already installed.
    pub fn install_signal_handlers(&self) -> std::io::Result<Option<JoinHandle<()>>> {
        if self.signals_installed.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        #[cfg(unix)]
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        let this = self.clone();
        Ok(Some(tokio::spawn(async move {
            #[cfg(unix)]
            let sigterm_future = sigterm.recv();
            #[cfg(not(unix))]
            let sigterm_future = std::future::pending::<Option<()>>();

            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        this.trigger(ShutdownReason::Interrupt);
                    }
                }
                _ = sigterm_future => {
                    this.trigger(ShutdownReason::Terminate);
                }
                _ = this.wait() => {}
            }
        })))
    }
}

impl fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shutdown")
            .field("reason", &self.reason())
            .field("signals_installed", &self.signals_installed.load(Ordering::SeqCst))
            .finish()
    }
}
