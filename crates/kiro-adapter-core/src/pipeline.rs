use crate::config::{AdapterConfig, OutputConfig};
use crate::dependency::DependencyResolver;
use crate::discovery::{AgentDiscovery, AgentMetadata};
use crate::error::{ErrorCategory, Result};
use crate::hooks;
use crate::registry::{AgentRegistry, RegistrationResult};
use crate::steering;
use crate::transform::{AgentTransformer, ConvertedAgent};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A per-agent failure kept in a report instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFailure {
    pub agent_id: String,
    pub category: ErrorCategory,
    pub message: String,
}

impl AgentFailure {
    fn new(agent_id: &str, err: &crate::AdapterError) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            category: err.category(),
            message: err.to_string(),
        }
    }
}

/// Converted agents before anything is written.
#[derive(Debug, Default)]
pub struct Prepared {
    pub discovered: usize,
    pub converted: Vec<ConvertedAgent>,
    pub failures: Vec<AgentFailure>,
    /// Rule failures that did not stop conversion.
    pub warnings: Vec<String>,
    /// `category/name` per agent id.
    pub missing_dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub discovered: usize,
    pub converted: Vec<String>,
    pub failures: Vec<AgentFailure>,
    pub warnings: Vec<String>,
    pub missing_dependencies: BTreeMap<String, Vec<String>>,
    pub steering_files: Vec<PathBuf>,
    pub hook_files: Vec<PathBuf>,
    pub registrations: Vec<RegistrationResult>,
}

impl ConversionReport {
    pub fn registered(&self) -> usize {
        self.registrations.iter().filter(|r| r.success).count()
    }
}

/// Discover, resolve, transform, write steering and hooks, then register.
pub struct ConversionPipeline {
    root: PathBuf,
    config: AdapterConfig,
    output: OutputConfig,
    discovery: AgentDiscovery,
    resolver: DependencyResolver,
    transformer: AgentTransformer,
    registry: Arc<AgentRegistry>,
}

impl ConversionPipeline {
    pub fn new(root: &Path, config: AdapterConfig, registry: Arc<AgentRegistry>) -> Self {
        let output = config.output.anchored(root);
        let resolver = DependencyResolver::from_config(
            root,
            &config.dependencies,
            &config.discovery.expansion_packs_dir,
        );
        Self {
            root: root.to_path_buf(),
            transformer: AgentTransformer::new(output.clone()),
            discovery: AgentDiscovery::new(),
            resolver,
            output,
            config,
            registry,
        }
    }

    pub fn with_discovery(mut self, discovery: AgentDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_transformer(mut self, transformer: AgentTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn output(&self) -> &OutputConfig {
        &self.output
    }

    pub async fn discover(&self) -> Result<Vec<AgentMetadata>> {
        self.discovery
            .scan_all_agents(&self.root, &self.config.discovery)
            .await
    }

    /// Discover, resolve and transform without touching `.kiro/`.
    pub async fn prepare(&self) -> Result<Prepared> {
        let agents = self.discover().await?;
        let resolved = join_all(agents.iter().map(|a| self.resolver.resolve(a))).await;

        let mut prepared = Prepared {
            discovered: agents.len(),
            ..Default::default()
        };
        for (agent, deps) in agents.iter().zip(resolved) {
            if !deps.missing.is_empty() {
                prepared.missing_dependencies.insert(
                    agent.id.clone(),
                    deps.missing
                        .iter()
                        .map(|m| format!("{}/{}", m.category, m.name))
                        .collect(),
                );
                if self.config.pipeline.fail_on_missing_dependencies {
                    if let Err(e) = deps.ensure_complete(&agent.id) {
                        warn!(agent = %agent.id, error = %e, "skipping agent with missing dependencies");
                        prepared.failures.push(AgentFailure::new(&agent.id, &e));
                        continue;
                    }
                }
            }
            match self.transformer.transform(agent, &deps) {
                Ok(outcome) => {
                    prepared
                        .warnings
                        .extend(outcome.rule_errors.iter().map(|e| e.to_string()));
                    prepared.converted.push(outcome.agent);
                }
                Err(e) => prepared.failures.push(AgentFailure::new(&agent.id, &e)),
            }
        }
        Ok(prepared)
    }

    pub async fn run(&self) -> Result<ConversionReport> {
        let prepared = self.prepare().await?;
        let mut report = ConversionReport {
            discovered: prepared.discovered,
            failures: prepared.failures,
            warnings: prepared.warnings,
            missing_dependencies: prepared.missing_dependencies,
            ..Default::default()
        };

        let mut ready = Vec::with_capacity(prepared.converted.len());
        for agent in prepared.converted {
            match self.write_artifacts(&agent) {
                Ok((steering, hooks)) => {
                    report.steering_files.extend(steering);
                    report.hook_files.extend(hooks);
                    ready.push(agent);
                }
                Err(e) => {
                    warn!(agent = %agent.id, error = %e, "failed to write kiro artifacts");
                    report.failures.push(AgentFailure::new(&agent.id, &e));
                }
            }
        }

        report.registrations = self.registry.register_batch(ready).await;
        for r in &report.registrations {
            if r.success {
                report.converted.push(r.agent_id.clone());
            } else {
                report.failures.push(AgentFailure {
                    agent_id: r.agent_id.clone(),
                    category: r
                        .error
                        .as_deref()
                        .map_or(ErrorCategory::Unknown, ErrorCategory::classify),
                    message: r.error.clone().unwrap_or_default(),
                });
            }
        }

        info!(
            discovered = report.discovered,
            converted = report.converted.len(),
            failed = report.failures.len(),
            "conversion finished"
        );
        Ok(report)
    }

    fn write_artifacts(&self, agent: &ConvertedAgent) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let steering = if self.config.pipeline.generate_steering {
            steering::write_steering(agent, &self.output)?
        } else {
            Vec::new()
        };
        let hooks = if self.config.pipeline.generate_hooks {
            let descriptors = hooks::agent_hooks(&agent.metadata);
            if descriptors.is_empty() {
                Vec::new()
            } else {
                hooks::write_hooks(&descriptors, &self.output.hooks_dir)?
            }
        } else {
            Vec::new()
        };
        Ok((steering, hooks))
    }
}
