pub mod api;
pub mod memory;
pub mod service;
pub mod types;

pub use api::{ClusterApi, ClusterSource, ExternalClusterSource};
pub use memory::InMemoryClusterApi;
pub use service::ClusterService;
pub use types::{
    Cluster, ClusterPatch, CreateCluster, EntityType, ExternalCluster, Finalizer, Snapshot,
};
