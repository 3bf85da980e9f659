pub mod activate;
pub mod config;
pub mod context;
pub mod convert;
pub mod deps;
pub mod health;
pub mod hooks;
pub mod init;
pub mod metrics;
pub mod scan;

use anyhow::Context;
use kiro_adapter_core::{
    activation::HandlerCatalog,
    config::AdapterConfig,
    monitor::ActivationMonitor,
    pipeline::ConversionPipeline,
    registry::{AgentRegistry, NullSink},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}

pub fn load_config(root: &Path) -> anyhow::Result<AdapterConfig> {
    AdapterConfig::load_validated(root).context("failed to load .kiro/adapter.yaml")
}

/// Path of the persisted activation metrics, anchored at `root`.
pub fn metrics_path(root: &Path, config: &AdapterConfig) -> PathBuf {
    config.output.anchored(root).metrics_file
}

/// A monitor seeded from the metrics file when persistence is on.
pub fn load_monitor(root: &Path, config: &AdapterConfig) -> anyhow::Result<Arc<ActivationMonitor>> {
    let monitor = Arc::new(ActivationMonitor::new(config.monitor.clone()));
    if config.monitor.persist_metrics {
        let path = metrics_path(root, config);
        monitor
            .load(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    Ok(monitor)
}

pub fn save_monitor(root: &Path, config: &AdapterConfig, monitor: &ActivationMonitor) -> anyhow::Result<()> {
    if config.monitor.persist_metrics {
        let path = metrics_path(root, config);
        monitor
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

/// In-process view of the converted agents: re-run conversion without
/// writing and register the results in memory, so health and activation see
/// the same agents `convert` produced.
pub struct Session {
    pub config: AdapterConfig,
    pub monitor: Arc<ActivationMonitor>,
    pub registry: Arc<AgentRegistry>,
    pub handlers: Arc<HandlerCatalog>,
}

impl Session {
    pub async fn open(root: &Path) -> anyhow::Result<Self> {
        let config = load_config(root)?;
        let monitor = load_monitor(root, &config)?;
        let registry = Arc::new(
            AgentRegistry::new(config.registry.clone(), Arc::new(NullSink))
                .with_observer(monitor.clone()),
        );

        let prepared = ConversionPipeline::new(root, config.clone(), registry.clone())
            .prepare()
            .await
            .context("failed to convert agents")?;
        for failure in &prepared.failures {
            tracing::warn!(agent = %failure.agent_id, error = %failure.message, "agent not available");
        }
        registry.register_batch(prepared.converted).await;

        Ok(Self {
            config,
            monitor,
            registry,
            handlers: Arc::new(HandlerCatalog::with_defaults()),
        })
    }

    pub fn save(&self, root: &Path) -> anyhow::Result<()> {
        save_monitor(root, &self.config, &self.monitor)
    }
}

/// `path` relative to `root` when it lives under it.
pub fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
