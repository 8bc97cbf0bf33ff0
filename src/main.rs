use clap::Parser;
use clustercache::cache::CacheEvent;
use clustercache::clusters::{
    Cluster, ClusterService, CreateCluster, EntityType, InMemoryClusterApi, Snapshot,
};
use clustercache::config::ClusterServiceConfig;
use clustercache::error::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Watches cluster lists for a few projects against a simulated backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the base tick interval
    #[arg(long)]
    base_interval_secs: Option<u64>,

    /// Overrides the cluster refresh multiplier
    #[arg(long)]
    refresh_multiplier: Option<u32>,

    /// Projects to observe
    #[arg(short, long, value_delimiter = ',', default_value = "proj1,proj2")]
    projects: Vec<String>,

    /// Stop after this many seconds instead of waiting for ctrl-c
    #[arg(short, long)]
    duration_secs: Option<u64>,
}

impl Args {
    fn service_config(&self) -> Result<ClusterServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ClusterServiceConfig::from_json_file(path)?,
            None => ClusterServiceConfig::default(),
        };
        if let Some(base) = self.base_interval_secs {
            config.base_interval_secs = base;
        }
        if let Some(multiplier) = self.refresh_multiplier {
            config.cluster_refresh_multiplier = multiplier;
        }
        config.validate()?;
        Ok(config)
    }
}

fn seeded_api(projects: &[String]) -> InMemoryClusterApi {
    let api = InMemoryClusterApi::new(Duration::from_millis(250));
    for project in projects {
        api.seed_cluster(
            project,
            Cluster {
                id: format!("{project}-default"),
                name: "default".to_string(),
                version: "1.29.0".to_string(),
                labels: std::iter::once(("env".to_string(), "dev".to_string())).collect(),
            },
        );
    }
    api
}

async fn create_next(
    service: &ClusterService<InMemoryClusterApi>,
    project: &str,
    count: usize,
) -> Result<Cluster> {
    let model = CreateCluster::new(format!("cluster-{count}"), "1.30.0");
    Ok(service.create(project, model).await?)
}

fn report(project: &str, event: &CacheEvent<Snapshot<Cluster>>) {
    match event {
        CacheEvent::Value(snapshot) => {
            let names: Vec<&str> = snapshot.items().iter().map(|c| c.name.as_str()).collect();
            info!("📋 {}: {} cluster(s) {:?}", project, snapshot.len(), names);
        }
        CacheEvent::Error(err) => warn!("⚠️  {}: {}", project, err),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clustercache=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = args.service_config()?;
    let service = ClusterService::start(&config, seeded_api(&args.projects))?;

    let mut updates = StreamMap::new();
    for project in &args.projects {
        updates.insert(project.clone(), service.clusters(project));
    }

    let period = config.cache_config(EntityType::Cluster).period();
    let first_write = tokio::time::Instant::now() + period / 2;
    let mut writes = tokio::time::interval_at(first_write, period * 2);
    let deadline = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut created = 0usize;
    loop {
        tokio::select! {
            Some((project, event)) = updates.next() => report(&project, &event),
            _ = writes.tick() => {
                let Some(project) = args.projects.get(created % args.projects.len().max(1)) else {
                    continue;
                };
                created += 1;
                if let Err(err) = create_next(&service, project, created).await {
                    warn!("⚠️  create on {} failed: {}", project, err);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
            () = &mut deadline => break,
        }
    }

    let stats = service.stats(EntityType::Cluster);
    info!(
        "📊 {} pipeline(s), {} fetches, {} coalesced, {:.0}% success",
        stats.pipelines.len(),
        stats.metrics.fetches_started,
        stats.metrics.coalesced_triggers,
        stats.metrics.success_rate() * 100.0
    );
    service.shutdown();
    Ok(())
}
