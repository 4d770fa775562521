//! Dispatch channel from peers to the hub.
//!
//! Each peer holds a [`Dispatcher`] bound to its own name. Changes flow over
//! a bounded tokio channel; the hub owns the receiving end, so peers never
//! hold a reference back to the hub.

use livesync_bridge_core::FileData;
use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};

/// A change observed by one peer, addressed in the global namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEvent {
    /// Name of the peer that observed the change.
    pub source: String,
    /// Global path of the changed file.
    pub path: String,
    /// New content, or `None` for a deletion.
    pub data: Option<FileData>,
}

/// Create the hub's dispatch channel.
pub fn channel(capacity: usize) -> (mpsc::Sender<DispatchEvent>, mpsc::Receiver<DispatchEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Sends one peer's changes to the hub.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    source: String,
    tx: mpsc::Sender<DispatchEvent>,
}

impl Dispatcher {
    /// Create a dispatcher sending on behalf of `source`.
    pub fn new(source: impl Into<String>, tx: mpsc::Sender<DispatchEvent>) -> Self {
        Self {
            source: source.into(),
            tx,
        }
    }

    /// Name of the peer this dispatcher speaks for.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Hand a change to the hub.
    ///
    /// Fails with [`BridgeError::HubClosed`] when the hub has gone away.
    pub async fn dispatch(&self, path: &str, data: Option<FileData>) -> Result<()> {
        let event = DispatchEvent {
            source: self.source.clone(),
            path: path.to_string(),
            data,
        };
        self.tx.send(event).await.map_err(|_| BridgeError::HubClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_reaches_receiver() {
        let (tx, mut rx) = channel(8);
        let dispatcher = Dispatcher::new("a", tx);

        dispatcher.dispatch("notes/x.md", None).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "a");
        assert_eq!(event.path, "notes/x.md");
        assert_eq!(event.data, None);
    }

    #[tokio::test]
    async fn test_dispatch_after_hub_dropped() {
        let (tx, rx) = channel(8);
        let dispatcher = Dispatcher::new("a", tx);
        drop(rx);

        let err = dispatcher.dispatch("x", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::HubClosed));
    }
}
