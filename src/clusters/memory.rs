/**
 * Simulated cluster backend
 *
 * Keeps clusters per project in memory, with configurable latency and
 * injectable failures. Used by the demo binary and the tests.
 */
use super::api::ClusterApi;
use super::types::{Cluster, ClusterPatch, CreateCluster, ExternalCluster, Finalizer};
use crate::cache::{FetchError, ResourceKey};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Project {
    clusters: BTreeMap<String, Cluster>,
    external: BTreeMap<String, ExternalCluster>,
}

#[derive(Debug, Default)]
pub struct InMemoryClusterApi {
    projects: Mutex<HashMap<String, Project>>,
    latency: Duration,
    failures_pending: AtomicU32,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryClusterApi {
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Adds a cluster directly, bypassing the write path
    pub fn seed_cluster(&self, project: &str, cluster: Cluster) {
        self.lock()
            .entry(project.to_string())
            .or_default()
            .clusters
            .insert(cluster.id.clone(), cluster);
    }

    pub fn seed_external_cluster(&self, project: &str, cluster: ExternalCluster) {
        self.lock()
            .entry(project.to_string())
            .or_default()
            .external
            .insert(cluster.id.clone(), cluster);
    }

    /// The next `count` calls (reads or writes) fail with a transport error
    pub fn fail_next(&self, count: u32) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn begin_read(&self) -> Result<(), FetchError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.simulate().await
    }

    async fn begin_write(&self) -> Result<(), FetchError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.simulate().await
    }

    async fn simulate(&self) -> Result<(), FetchError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            debug!("💥 injected backend failure");
            return Err(FetchError::Transport("injected failure".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Project>> {
        self.projects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ClusterApi for InMemoryClusterApi {
    async fn list_clusters(&self, project: &str) -> Result<Vec<Cluster>, FetchError> {
        self.begin_read().await?;
        Ok(self
            .lock()
            .get(project)
            .map(|p| p.clusters.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_cluster(&self, project: &str, cluster_id: &str) -> Result<Cluster, FetchError> {
        self.begin_read().await?;
        self.lock()
            .get(project)
            .and_then(|p| p.clusters.get(cluster_id).cloned())
            .ok_or_else(|| FetchError::NotFound(ResourceKey::single(project, cluster_id)))
    }

    async fn create_cluster(
        &self,
        project: &str,
        model: &CreateCluster,
    ) -> Result<Cluster, FetchError> {
        self.begin_write().await?;
        if model.name.is_empty() {
            return Err(FetchError::status(400, "cluster name must not be empty"));
        }
        let cluster = Cluster {
            id: Uuid::new_v4().simple().to_string(),
            name: model.name.clone(),
            version: model.version.clone(),
            labels: model.effective_labels(),
        };
        self.seed_cluster(project, cluster.clone());
        Ok(cluster)
    }

    async fn patch_cluster(
        &self,
        project: &str,
        cluster_id: &str,
        patch: &ClusterPatch,
    ) -> Result<Cluster, FetchError> {
        self.begin_write().await?;
        let mut projects = self.lock();
        let cluster = projects
            .get_mut(project)
            .and_then(|p| p.clusters.get_mut(cluster_id))
            .ok_or_else(|| FetchError::NotFound(ResourceKey::single(project, cluster_id)))?;
        patch.apply_to_cluster(cluster);
        Ok(cluster.clone())
    }

    async fn delete_cluster(
        &self,
        project: &str,
        cluster_id: &str,
        finalizers: &BTreeMap<Finalizer, bool>,
    ) -> Result<(), FetchError> {
        self.begin_write().await?;
        let removed = self
            .lock()
            .get_mut(project)
            .and_then(|p| p.clusters.remove(cluster_id));
        match removed {
            Some(_) => {
                debug!(
                    "🗑️  deleted {}/{} with finalizers {:?}",
                    project, cluster_id, finalizers
                );
                Ok(())
            }
            None => Err(FetchError::NotFound(ResourceKey::single(project, cluster_id))),
        }
    }

    async fn list_external_clusters(
        &self,
        project: &str,
    ) -> Result<Vec<ExternalCluster>, FetchError> {
        self.begin_read().await?;
        Ok(self
            .lock()
            .get(project)
            .map(|p| p.external.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
    ) -> Result<ExternalCluster, FetchError> {
        self.begin_read().await?;
        self.lock()
            .get(project)
            .and_then(|p| p.external.get(cluster_id).cloned())
            .ok_or_else(|| FetchError::NotFound(ResourceKey::single(project, cluster_id)))
    }

    async fn patch_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
        patch: &ClusterPatch,
    ) -> Result<ExternalCluster, FetchError> {
        self.begin_write().await?;
        let mut projects = self.lock();
        let cluster = projects
            .get_mut(project)
            .and_then(|p| p.external.get_mut(cluster_id))
            .ok_or_else(|| FetchError::NotFound(ResourceKey::single(project, cluster_id)))?;
        patch.apply_to_external(cluster);
        Ok(cluster.clone())
    }

    async fn update_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
        model: &ExternalCluster,
    ) -> Result<ExternalCluster, FetchError> {
        self.begin_write().await?;
        let mut projects = self.lock();
        let cluster = projects
            .get_mut(project)
            .and_then(|p| p.external.get_mut(cluster_id))
            .ok_or_else(|| FetchError::NotFound(ResourceKey::single(project, cluster_id)))?;
        *cluster = ExternalCluster {
            id: cluster_id.to_string(),
            ..model.clone()
        };
        Ok(cluster.clone())
    }

    async fn delete_external_cluster(
        &self,
        project: &str,
        cluster_id: &str,
    ) -> Result<(), FetchError> {
        self.begin_write().await?;
        self.lock()
            .get_mut(project)
            .and_then(|p| p.external.remove(cluster_id))
            .map(|_| ())
            .ok_or_else(|| FetchError::NotFound(ResourceKey::single(project, cluster_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(id: &str) -> Cluster {
        Cluster {
            id: id.to_string(),
            name: format!("cluster-{id}"),
            version: "1.29.0".to_string(),
            labels: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let api = InMemoryClusterApi::default();
        api.seed_cluster("proj1", cluster("c1"));
        api.seed_cluster("proj1", cluster("c2"));

        assert_eq!(api.list_clusters("proj1").await.unwrap().len(), 2);
        assert!(api.list_clusters("proj2").await.unwrap().is_empty());
        assert_eq!(api.get_cluster("proj1", "c2").await.unwrap().name, "cluster-c2");
        assert!(matches!(
            api.get_cluster("proj1", "missing").await,
            Err(FetchError::NotFound(_))
        ));
        assert_eq!(api.read_count(), 4);
    }

    #[tokio::test]
    async fn test_injected_failures_run_out() {
        let api = InMemoryClusterApi::default();
        api.fail_next(2);

        assert!(api.list_clusters("proj1").await.is_err());
        assert!(api.list_clusters("proj1").await.is_err());
        assert!(api.list_clusters("proj1").await.is_ok());
    }

    #[tokio::test]
    async fn test_write_round_trip() {
        let api = InMemoryClusterApi::default();
        let created = api
            .create_cluster("proj1", &CreateCluster::new("prod", "1.29.0"))
            .await
            .unwrap();

        let patch = ClusterPatch {
            version: Some("1.30.0".to_string()),
            ..ClusterPatch::default()
        };
        let patched = api.patch_cluster("proj1", &created.id, &patch).await.unwrap();
        assert_eq!(patched.version, "1.30.0");

        api.delete_cluster("proj1", &created.id, &BTreeMap::new()).await.unwrap();
        assert!(api.list_clusters("proj1").await.unwrap().is_empty());
        assert_eq!(api.write_count(), 3);
    }

    #[tokio::test]
    async fn test_update_external_keeps_path_id() {
        let api = InMemoryClusterApi::default();
        let original = ExternalCluster {
            id: "e1".to_string(),
            name: "imported".to_string(),
            provider: "eks".to_string(),
            version: "1.28.0".to_string(),
            labels: BTreeMap::new(),
        };
        api.seed_external_cluster("proj1", original.clone());

        let replacement = ExternalCluster {
            id: "ignored".to_string(),
            name: "renamed".to_string(),
            ..original
        };
        let updated = api
            .update_external_cluster("proj1", "e1", &replacement)
            .await
            .unwrap();
        assert_eq!(updated.id, "e1");
        assert_eq!(updated.name, "renamed");
        assert!(matches!(
            api.update_external_cluster("proj1", "missing", &replacement).await,
            Err(FetchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_name() {
        let api = InMemoryClusterApi::default();
        let result = api.create_cluster("proj1", &CreateCluster::default()).await;
        assert!(matches!(result, Err(FetchError::Status { code: 400, .. })));
    }
}
