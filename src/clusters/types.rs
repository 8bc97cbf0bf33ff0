use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Independent cache domains. Each gets its own clock, registry and bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Cluster,
    ExternalCluster,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => write!(f, "clusters"),
            Self::ExternalCluster => write!(f, "external-clusters"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A cluster imported from outside the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCluster {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub version: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// What a cached read yields: the whole collection for a project, or one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Snapshot<T> {
    Collection(Vec<T>),
    Single(T),
}

impl<T> Snapshot<T> {
    #[must_use]
    pub fn items(&self) -> &[T] {
        match self {
            Self::Collection(items) => items,
            Self::Single(item) => std::slice::from_ref(item),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

/// Request body for creating a cluster. A label mapped to `None` has been
/// removed in the form and is not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCluster {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub labels: BTreeMap<String, Option<String>>,
}

impl CreateCluster {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            labels: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.labels.insert(key.into(), value);
        self
    }

    /// Labels with nullified keys dropped
    #[must_use]
    pub fn effective_labels(&self) -> BTreeMap<String, String> {
        self.labels
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.clone(), v.clone())))
            .collect()
    }
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterPatch {
    pub name: Option<String>,
    pub version: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
}

impl ClusterPatch {
    pub fn apply_to_cluster(&self, cluster: &mut Cluster) {
        self.apply(&mut cluster.name, &mut cluster.version, &mut cluster.labels);
    }

    pub fn apply_to_external(&self, cluster: &mut ExternalCluster) {
        self.apply(&mut cluster.name, &mut cluster.version, &mut cluster.labels);
    }

    fn apply(
        &self,
        name: &mut String,
        version: &mut String,
        labels: &mut BTreeMap<String, String>,
    ) {
        if let Some(new_name) = &self.name {
            name.clone_from(new_name);
        }
        if let Some(new_version) = &self.version {
            version.clone_from(new_version);
        }
        if let Some(new_labels) = &self.labels {
            labels.clone_from(new_labels);
        }
    }
}

/// Cleanup the backend performs while deleting a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Finalizer {
    DeleteVolumes,
    DeleteLoadBalancers,
}

impl fmt::Display for Finalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteVolumes => write!(f, "DeleteVolumes"),
            Self::DeleteLoadBalancers => write!(f, "DeleteLoadBalancers"),
        }
    }
}
