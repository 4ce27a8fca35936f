//! Graceful shutdown signal handling.
//!
//! Trimmed to just the signal plumbing: `main.rs` drives the rest of the
//! shutdown sequence itself, since it is a short fixed list of `Dispatcher`
//! calls rather than a generic phase/handler registry for a much larger
//! set of subsystems.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

pub type ShutdownReceiver = broadcast::Receiver<()>;
pub type ShutdownSender = broadcast::Sender<()>;

/// Broadcasts a single shutdown signal to every subscriber exactly once.
#[derive(Clone)]
pub struct ShutdownController {
    sender: ShutdownSender,
    is_shutting_down: Arc<AtomicBool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            is_shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> ShutdownReceiver {
        self.sender.subscribe()
    }

    /// Idempotent: only the first caller actually broadcasts.
    pub fn shutdown(&self) {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("initiating graceful shutdown");
            let _ = self.sender.send(());
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// A future that resolves once shutdown has been triggered - handed to
    /// `axum::serve(...).with_graceful_shutdown(...)`.
    pub async fn wait(&self) {
        let mut receiver = self.subscribe();
        let _ = receiver.recv().await;
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for SIGINT or (on unix) SIGTERM, then triggers the controller.
pub async fn listen_for_shutdown_signals(controller: ShutdownController) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }

    controller.shutdown();
}
