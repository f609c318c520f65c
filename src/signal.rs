//! One-shot shutdown signaling for the flush timer.
//!
//! A `Broadcaster`/`Watcher` pair over a broadcast channel. The broadcaster
//! signals exactly once, by dropping its sender; the watcher's `recv` future
//! resolves when that happens. Dropping the broadcaster without an explicit
//! `signal` has the same effect, so an abandoned timer still winds down.

use tokio::sync::broadcast;

/// Construct a `Watcher` and `Broadcaster` pair.
pub(crate) fn signal() -> (Watcher, Broadcaster) {
    let (sender, receiver) = broadcast::channel(1);
    (Watcher { receiver }, Broadcaster { sender })
}

#[derive(Debug)]
/// Sends the one-time signal to the paired [`Watcher`].
pub(crate) struct Broadcaster {
    sender: broadcast::Sender<()>,
}

impl Broadcaster {
    /// Send the signal. Consumes the broadcaster; there is nothing more to
    /// say after shutdown.
    pub(crate) fn signal(self) {
        drop(self.sender);
    }
}

#[derive(Debug)]
/// Waits for the paired [`Broadcaster`] to signal.
pub(crate) struct Watcher {
    receiver: broadcast::Receiver<()>,
}

impl Watcher {
    /// Resolve once the broadcaster has signaled or been dropped.
    pub(crate) async fn recv(mut self) {
        // The sender never transmits a value; closure is the signal.
        match self.receiver.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Closed) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }
}
