use super::key::ResourceKey;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

/// A zero-payload "refetch now" signal for one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Every pipeline of the entity type
    All,
    /// Only the pipelines for this key
    Key(ResourceKey),
}

impl Invalidation {
    #[must_use]
    pub fn applies_to(&self, key: &ResourceKey) -> bool {
        match self {
            Self::All => true,
            Self::Key(target) => target == key,
        }
    }
}

/// Per entity type event bus feeding invalidation signals to every live
/// pipeline, orphaned ones included.
#[derive(Debug)]
pub struct InvalidationBus {
    tx: broadcast::Sender<Invalidation>,
}

impl InvalidationBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire and forget. Returns how many pipelines were signalled.
    pub fn notify(&self, signal: Invalidation) -> usize {
        let signalled = self.tx.send(signal.clone()).unwrap_or(0);
        debug!("📣 INVALIDATE {:?} -> {} pipelines", signal, signalled);
        signalled
    }

    #[must_use]
    pub fn subscribe(&self) -> InvalidationListener {
        InvalidationListener {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug)]
pub struct InvalidationListener {
    rx: broadcast::Receiver<Invalidation>,
}

impl InvalidationListener {
    /// Next signal, or `None` once the bus is gone.
    ///
    /// Signals lost to lag are unknown, so they surface as `All`.
    pub async fn next(&mut self) -> Option<Invalidation> {
        match self.rx.recv().await {
            Ok(signal) => Some(signal),
            Err(RecvError::Lagged(missed)) => {
                debug!("📣 invalidation listener lagged by {}", missed);
                Some(Invalidation::All)
            }
            Err(RecvError::Closed) => None,
        }
    }
}
