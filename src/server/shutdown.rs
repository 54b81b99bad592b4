//! Coordinated shutdown for the controller
//!
//! One `ShutdownController` fans a single cancellation out to every
//! long-running task. Informers stop watching, the work queue stops taking
//! keys, and workers exit once the queue has drained.

use tokio::sync::watch;
use tracing::info;

/// Receiving half of the shutdown channel
///
/// Clones observe the same request. Waiting only needs a shared reference,
/// so one signal can be polled from several `select!` arms at once.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    stopped: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been requested or the controller is gone
    pub async fn wait(&self) {
        let mut stopped = self.stopped.clone();
        // Err means the sender was dropped; nobody is left to cancel us
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }

    pub fn is_shutdown(&self) -> bool {
        *self.stopped.borrow()
    }
}

/// Sending half of the shutdown channel
#[derive(Debug)]
pub struct ShutdownController {
    stopped: watch::Sender<bool>,
}

impl ShutdownController {
    /// Request shutdown; later calls are no-ops
    pub fn shutdown(&self) {
        let already = self.stopped.send_replace(true);
        if !already {
            info!("Shutdown requested");
        }
    }
}

pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (stopped_tx, stopped_rx) = watch::channel(false);
    (
        ShutdownController {
            stopped: stopped_tx,
        },
        ShutdownSignal {
            stopped: stopped_rx,
        },
    )
}

/// Wait for SIGTERM or SIGINT, returning the signal's name
///
/// # Errors
/// Fails when a handler cannot be installed.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for Ctrl+C on targets without unix signals
///
/// # Errors
/// Fails when the Ctrl+C handler cannot be installed.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("CTRL_C")
}
