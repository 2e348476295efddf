//! Cooperative shutdown shared between the Ctrl+C listener and run loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Cloneable stop flag. Once triggered it stays triggered.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is set.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless shutdown comes first. Returns `false`
    /// when interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        }
    }

    /// Trigger on the first Ctrl+C.
    pub fn listen_for_ctrl_c(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                shutdown.trigger();
            }
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
