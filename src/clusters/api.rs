use super::types::{Cluster, ClusterPatch, CreateCluster, ExternalCluster, Finalizer, Snapshot};
use crate::cache::{BackendClient, FetchError, ResourceKey};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// REST operations the dashboard backend exposes for clusters.
#[async_trait]
pub trait ClusterApi: Send + Sync + 'static {
    async fn list_clusters(&self, project: &str) -> Result<Vec<Cluster>, FetchError>;

    async fn get_cluster(&self, project: &str, cluster_id: &str) -> Result<Cluster, FetchError>;

    async fn create_cluster(
        &self,
        project: &str,
        model: &CreateCluster,
    ) -> Result<Cluster, FetchError>;

    async fn patch_cluster(
        &self,
        project: &str,
        cluster_id: &str,
        patch: &ClusterPatch,
    ) -> Result<Cluster, FetchError>;

    async fn delete_cluster(
        &self,
        project: &str,
        cluster_id: &str,
        finalizers: &BTreeMap<Finalizer, bool>,
    ) -> Result<(), FetchError>;

    async fn list_external_clusters(
        &self,
        project: &str,
    ) -> Result<Vec<ExternalCluster>, FetchError>;

    async fn get_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
    ) -> Result<ExternalCluster, FetchError>;

    async fn patch_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
        patch: &ClusterPatch,
    ) -> Result<ExternalCluster, FetchError>;

    /// Replaces the whole external cluster; the id in the path wins
    async fn update_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
        model: &ExternalCluster,
    ) -> Result<ExternalCluster, FetchError>;

    async fn delete_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
    ) -> Result<(), FetchError>;
}

/// Read side of [`ClusterApi`] for platform clusters
pub struct ClusterSource<A>(pub Arc<A>);

#[async_trait]
impl<A: ClusterApi> BackendClient for ClusterSource<A> {
    type Value = Snapshot<Cluster>;

    async fn fetch(&self, key: &ResourceKey) -> Result<Self::Value, FetchError> {
        match key.id() {
            None => self.0.list_clusters(key.scope()).await.map(Snapshot::Collection),
            Some(id) => self.0.get_cluster(key.scope(), id).await.map(Snapshot::Single),
        }
    }
}

/// Read side of [`ClusterApi`] for external clusters
pub struct ExternalClusterSource<A>(pub Arc<A>);

#[async_trait]
impl<A: ClusterApi> BackendClient for ExternalClusterSource<A> {
    type Value = Snapshot<ExternalCluster>;

    async fn fetch(&self, key: &ResourceKey) -> Result<Self::Value, FetchError> {
        match key.id() {
            None => self
                .0
                .list_external_clusters(key.scope())
                .await
                .map(Snapshot::Collection),
            Some(id) => self
                .0
                .get_external_cluster(key.scope(), id)
                .await
                .map(Snapshot::Single),
        }
    }
}
