use tokio::sync::broadcast;

// Enough room to absorb a burst of signals between builds; the cache
// coalesces a backlog into a single refresh, so lagging is harmless.
const REVISION_CHANNEL_CAPACITY: usize = 16;

/// Pub/sub handle for the zero-payload "configuration changed" signal.
///
/// The producer side (whatever tracks configuration revisions) calls
/// [`revision_changed`](RevisionNotifier::revision_changed); the cache
/// subscribes and pulls fresh data itself. The handle is cheap to clone.
#[derive(Debug, Clone)]
pub struct RevisionNotifier {
    tx: broadcast::Sender<()>,
}

impl RevisionNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(REVISION_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn revision_changed(&self) {
        // No subscribers is fine, e.g. before any cache is constructed.
        let _ = self.tx.send(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for RevisionNotifier {
    fn default() -> Self {
        Self::new()
    }
}
