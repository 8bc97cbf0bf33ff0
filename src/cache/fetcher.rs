use super::errors::FetchError;
use super::key::ResourceKey;
use async_trait::async_trait;
use std::sync::Arc;

/// The read side of a REST backend: one fetch per call, no caching and no
/// retries of its own.
#[async_trait]
pub trait BackendClient: Send + Sync + 'static {
    type Value: Send + Sync + 'static;

    async fn fetch(&self, key: &ResourceKey) -> Result<Self::Value, FetchError>;
}

#[async_trait]
impl<B: BackendClient + ?Sized> BackendClient for Arc<B> {
    type Value = B::Value;

    async fn fetch(&self, key: &ResourceKey) -> Result<Self::Value, FetchError> {
        (**self).fetch(key).await
    }
}
