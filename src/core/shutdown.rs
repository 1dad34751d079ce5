//! Cooperative shutdown signal.

use tokio::sync::watch;

/// Flips the shutdown flag
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with no receiver left
        self.tx.send_replace(true);
    }
}

/// Observes the shutdown flag
#[derive(Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    // Keeps `never()` receivers from seeing a closed channel
    _keepalive: Option<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (
            ShutdownTrigger { tx },
            Shutdown {
                rx,
                _keepalive: None,
            },
        )
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(tx),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered; pends forever if the trigger is gone
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
