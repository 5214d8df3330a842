// File: testing-framework/src/orchestrator/cancel.rs
//
// Cooperative cancellation flag shared by build tasks, poll loops and relay
// loops. Holders check it between steps; nothing is aborted mid-step.

use std::sync::Arc;
use tokio::sync::watch;

/// One-shot cancellation flag
///
/// Cloning shares the flag. Once cancelled it stays cancelled.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a signal in the "not cancelled" state
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Trip the flag. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether the flag has been tripped
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the flag is tripped
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as any clone of this signal, including
        // `self`, so `wait_for` cannot observe a closed channel here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Trip `self` whenever `other` is tripped, for as long as the returned
    /// task runs
    pub fn follow(&self, other: &CancelSignal) -> tokio::task::JoinHandle<()> {
        let target = self.clone();
        let source = other.clone();
        if source.is_cancelled() {
            target.cancel();
        }
        tokio::spawn(async move {
            tokio::select! {
                _ = source.cancelled() => target.cancel(),
                _ = target.cancelled() => {}
            }
        })
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
