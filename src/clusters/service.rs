use super::api::{ClusterApi, ClusterSource, ExternalClusterSource};
use super::types::{
    Cluster, ClusterPatch, CreateCluster, EntityType, ExternalCluster, Finalizer, Snapshot,
};
use crate::cache::{CacheStats, FetchError, Invalidation, ResourceCache, ResourceKey, Subscription};
use crate::config::ClusterServiceConfig;
use crate::error::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Cached reads and invalidating writes for platform and external clusters.
///
/// Lists and single clusters of one entity type share that type's cache, so
/// a type-wide refresh drops both.
pub struct ClusterService<A: ClusterApi> {
    api: Arc<A>,
    clusters: ResourceCache<ClusterSource<A>>,
    external_clusters: ResourceCache<ExternalClusterSource<A>>,
}

impl<A: ClusterApi> ClusterService<A> {
    /// Starts both entity caches. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if either cache configuration is unusable.
    pub fn start(config: &ClusterServiceConfig, api: A) -> Result<Self> {
        let api = Arc::new(api);
        let clusters = ResourceCache::start(
            EntityType::Cluster.to_string(),
            &config.cache_config(EntityType::Cluster),
            ClusterSource(Arc::clone(&api)),
        )?;
        let external_clusters = ResourceCache::start(
            EntityType::ExternalCluster.to_string(),
            &config.cache_config(EntityType::ExternalCluster),
            ExternalClusterSource(Arc::clone(&api)),
        )?;

        Ok(Self {
            api,
            clusters,
            external_clusters,
        })
    }

    #[must_use]
    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn clusters(&self, project: &str) -> Subscription<Snapshot<Cluster>> {
        self.clusters.observe(ResourceKey::collection(project))
    }

    pub fn cluster(&self, project: &str, cluster_id: &str) -> Subscription<Snapshot<Cluster>> {
        self.clusters.observe(ResourceKey::single(project, cluster_id))
    }

    pub fn external_clusters(&self, project: &str) -> Subscription<Snapshot<ExternalCluster>> {
        self.external_clusters.observe(ResourceKey::collection(project))
    }

    pub fn external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
    ) -> Subscription<Snapshot<ExternalCluster>> {
        self.external_clusters.observe(ResourceKey::single(project, cluster_id))
    }

    /// Refetches and drops every cached cluster list and cluster
    pub fn refresh_clusters(&self) {
        self.clusters.invalidate_all();
    }

    pub fn refresh_external_clusters(&self) {
        self.external_clusters.invalidate_all();
    }

    pub fn invalidate(&self, entity: EntityType, key: &ResourceKey) {
        match entity {
            EntityType::Cluster => self.clusters.invalidate(key),
            EntityType::ExternalCluster => self.external_clusters.invalidate(key),
        }
    }

    pub fn invalidate_all(&self, entity: EntityType) {
        match entity {
            EntityType::Cluster => self.clusters.invalidate_all(),
            EntityType::ExternalCluster => self.external_clusters.invalidate_all(),
        }
    }

    /// # Errors
    ///
    /// Returns the backend's `FetchError`; the cache is not invalidated.
    pub async fn create(
        &self,
        project: &str,
        model: CreateCluster,
    ) -> core::result::Result<Cluster, FetchError> {
        let created = self
            .clusters
            .write(collection_scope(project), self.api.create_cluster(project, &model))
            .await?;
        info!("➕ Cluster created: {}/{} ({})", project, created.id, created.name);
        Ok(created)
    }

    /// # Errors
    ///
    /// Returns the backend's `FetchError`; the cache is not invalidated.
    pub async fn patch(
        &self,
        project: &str,
        cluster_id: &str,
        patch: ClusterPatch,
    ) -> core::result::Result<Cluster, FetchError> {
        self.clusters
            .write(
                member_scope(project, cluster_id),
                self.api.patch_cluster(project, cluster_id, &patch),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns the backend's `FetchError`; the cache is not invalidated.
    pub async fn delete(
        &self,
        project: &str,
        cluster_id: &str,
        finalizers: BTreeMap<Finalizer, bool>,
    ) -> core::result::Result<(), FetchError> {
        self.clusters
            .write(
                member_scope(project, cluster_id),
                self.api.delete_cluster(project, cluster_id, &finalizers),
            )
            .await?;
        info!("➖ Cluster deleted: {}/{}", project, cluster_id);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the backend's `FetchError`; the cache is not invalidated.
    pub async fn patch_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
        patch: ClusterPatch,
    ) -> core::result::Result<ExternalCluster, FetchError> {
        self.external_clusters
            .write(
                member_scope(project, cluster_id),
                self.api.patch_external_cluster(project, cluster_id, &patch),
            )
            .await
    }

    /// Full replacement of an external cluster
    ///
    /// # Errors
    ///
    /// Returns the backend's `FetchError`; the cache is not invalidated.
    pub async fn update_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
        model: ExternalCluster,
    ) -> core::result::Result<ExternalCluster, FetchError> {
        self.external_clusters
            .write(
                member_scope(project, cluster_id),
                self.api.update_external_cluster(project, cluster_id, &model),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns the backend's `FetchError`; the cache is not invalidated.
    pub async fn disconnect_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
    ) -> core::result::Result<(), FetchError> {
        self.external_clusters
            .write(
                member_scope(project, cluster_id),
                self.api.delete_external_cluster(project, cluster_id),
            )
            .await?;
        info!("🔌 External cluster disconnected: {}/{}", project, cluster_id);
        Ok(())
    }

    #[must_use]
    pub fn stats(&self, entity: EntityType) -> CacheStats {
        match entity {
            EntityType::Cluster => self.clusters.stats(),
            EntityType::ExternalCluster => self.external_clusters.stats(),
        }
    }

    pub fn shutdown(&self) {
        self.clusters.shutdown();
        self.external_clusters.shutdown();
    }
}

fn collection_scope(project: &str) -> Vec<Invalidation> {
    vec![Invalidation::Key(ResourceKey::collection(project))]
}

/// A member change shows up both in the member and in its project's list
fn member_scope(project: &str, cluster_id: &str) -> Vec<Invalidation> {
    vec![
        Invalidation::Key(ResourceKey::single(project, cluster_id)),
        Invalidation::Key(ResourceKey::collection(project)),
    ]
}
