use super::errors::FetchError;
use super::key::ResourceKey;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use uuid::Uuid;

/// What a subscriber observes: a successful value, or a transient
/// fetch failure that leaves the cached value in place.
#[derive(Debug)]
pub enum CacheEvent<V> {
    Value(Arc<V>),
    Error(FetchError),
}

impl<V> Clone for CacheEvent<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(value) => Self::Value(Arc::clone(value)),
            Self::Error(err) => Self::Error(err.clone()),
        }
    }
}

impl<V> CacheEvent<V> {
    #[must_use]
    pub fn value(&self) -> Option<&Arc<V>> {
        match self {
            Self::Value(value) => Some(value),
            Self::Error(_) => None,
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Error(err) => Some(err),
            Self::Value(_) => None,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Receiving end handed out by `observe`. Dropping it detaches the subscriber.
#[derive(Debug)]
pub struct Subscription<V> {
    id: Uuid,
    key: ResourceKey,
    rx: mpsc::UnboundedReceiver<CacheEvent<V>>,
}

impl<V> Subscription<V> {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Waits for the next event. `None` once the pipeline has shut down.
    pub async fn recv(&mut self) -> Option<CacheEvent<V>> {
        self.rx.recv().await
    }

    /// Returns an already delivered event without waiting
    pub fn try_recv(&mut self) -> Option<CacheEvent<V>> {
        self.rx.try_recv().ok()
    }

    /// Waits for the next successful value, skipping error notifications
    pub async fn next_value(&mut self) -> Option<Arc<V>> {
        loop {
            match self.rx.recv().await? {
                CacheEvent::Value(value) => return Some(value),
                CacheEvent::Error(_) => {}
            }
        }
    }
}

impl<V> Stream for Subscription<V> {
    type Item = CacheEvent<V>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

pub(crate) struct Subscriber<V> {
    pub id: Uuid,
    sender: mpsc::UnboundedSender<CacheEvent<V>>,
}

impl<V> Subscriber<V> {
    #[must_use]
    pub fn new(key: ResourceKey) -> (Self, Subscription<V>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        (Self { id, sender: tx }, Subscription { id, key, rx })
    }

    /// Returns false once the subscription has been dropped
    pub fn send(&self, event: CacheEvent<V>) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Current subscribers of one pipeline
pub(crate) struct Subscribers<V> {
    entries: Vec<Subscriber<V>>,
}

impl<V> Default for Subscribers<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> Subscribers<V> {
    pub fn push(&mut self, subscriber: Subscriber<V>) {
        self.entries.push(subscriber);
    }

    /// Sends `event` to every live subscriber and forgets the dropped ones
    pub fn broadcast(&mut self, event: &CacheEvent<V>) -> usize {
        self.entries.retain(|s| s.send(event.clone()));
        self.entries.len()
    }

    pub fn live(&mut self) -> usize {
        self.entries.retain(|s| !s.is_closed());
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let mut subscribers = Subscribers::default();
        let (s1, mut rx1) = Subscriber::new(ResourceKey::collection("proj1"));
        let (s2, mut rx2) = Subscriber::new(ResourceKey::collection("proj1"));
        subscribers.push(s1);
        subscribers.push(s2);

        let delivered = subscribers.broadcast(&CacheEvent::Value(Arc::new(7)));
        assert_eq!(delivered, 2);

        assert_eq!(rx1.next_value().await.as_deref(), Some(&7));
        assert_eq!(rx2.next().await.and_then(|e| e.value().cloned()).as_deref(), Some(&7));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_forgotten() {
        let mut subscribers = Subscribers::default();
        let (s1, rx1) = Subscriber::<u32>::new(ResourceKey::collection("proj1"));
        let (s2, _rx2) = Subscriber::<u32>::new(ResourceKey::collection("proj1"));
        subscribers.push(s1);
        subscribers.push(s2);
        assert_eq!(subscribers.live(), 2);

        drop(rx1);
        assert_eq!(subscribers.live(), 1);
        assert_eq!(subscribers.broadcast(&CacheEvent::Error(FetchError::Timeout)), 1);
    }

    #[tokio::test]
    async fn test_next_value_skips_errors() {
        let (subscriber, mut subscription) = Subscriber::new(ResourceKey::single("proj1", "c1"));
        assert!(subscriber.send(CacheEvent::Error(FetchError::Timeout)));
        assert!(subscriber.send(CacheEvent::Value(Arc::new("v1"))));

        assert_eq!(subscription.next_value().await.as_deref(), Some(&"v1"));
        assert!(subscription.try_recv().is_none());
    }
}
