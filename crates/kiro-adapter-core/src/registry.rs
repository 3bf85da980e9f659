use crate::config::RegistryConfig;
use crate::error::{AdapterError, Result};
use crate::io;
use crate::transform::ConvertedAgent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Where a registered agent is made visible to Kiro.
pub trait RegistrationSink: Send + Sync {
    fn register(&self, agent: &ConvertedAgent) -> anyhow::Result<()>;

    fn unregister(&self, _agent: &ConvertedAgent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes the converted content to the agent's output path.
#[derive(Debug, Default)]
pub struct FileRegistrationSink;

impl RegistrationSink for FileRegistrationSink {
    fn register(&self, agent: &ConvertedAgent) -> anyhow::Result<()> {
        io::atomic_write(&agent.output_path, agent.content.as_bytes())?;
        Ok(())
    }

    fn unregister(&self, agent: &ConvertedAgent) -> anyhow::Result<()> {
        io::remove_if_exists(&agent.output_path)?;
        Ok(())
    }
}

/// Registry-only bookkeeping, nothing touches disk.
#[derive(Debug, Default)]
pub struct NullSink;

impl RegistrationSink for NullSink {
    fn register(&self, _agent: &ConvertedAgent) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entries and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredAgentEntry {
    pub agent: ConvertedAgent,
    pub registered_at: DateTime<Utc>,
    /// Failed attempts before the one that succeeded.
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub agent_id: String,
    pub success: bool,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub trait RegistryObserver: Send + Sync {
    fn on_registered(&self, _entry: &RegisteredAgentEntry) {}
    fn on_registration_failed(&self, _agent_id: &str, _error: &AdapterError) {}
    fn on_unregistered(&self, _agent_id: &str) {}
}

// ---------------------------------------------------------------------------
// AgentRegistry
// ---------------------------------------------------------------------------

pub struct AgentRegistry {
    config: RegistryConfig,
    sink: Arc<dyn RegistrationSink>,
    entries: Mutex<HashMap<String, RegisteredAgentEntry>>,
    observers: Vec<Arc<dyn RegistryObserver>>,
}

impl AgentRegistry {
    pub fn new(config: RegistryConfig, sink: Arc<dyn RegistrationSink>) -> Self {
        Self {
            config,
            sink,
            entries: Mutex::new(HashMap::new()),
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RegistryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, RegisteredAgentEntry>> {
        // A poisoned map is still structurally sound; keep serving it.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate, then hand the agent to the sink, retrying with exponential
    /// backoff. Validation failures are never retried.
    pub async fn register_agent(&self, agent: ConvertedAgent) -> Result<RegistrationResult> {
        if let Err(e) = agent.validate() {
            self.notify_failed(&agent.id, &e);
            return Err(e);
        }

        let attempts = self.config.retry_attempts.max(1);
        let mut failures = 0u32;
        loop {
            match self.sink.register(&agent) {
                Ok(()) => break,
                Err(e) => {
                    failures += 1;
                    if failures >= attempts {
                        let err = AdapterError::Registration {
                            agent_id: agent.id.clone(),
                            retry_count: failures - 1,
                            reason: format!("{e:#}"),
                        };
                        warn!(agent = %agent.id, attempts = failures, error = %e, "registration failed");
                        self.notify_failed(&agent.id, &err);
                        return Err(err);
                    }
                    let delay = self.config.backoff_delay(failures);
                    debug!(
                        agent = %agent.id,
                        retry = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "registration attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let entry = RegisteredAgentEntry {
            agent,
            registered_at: Utc::now(),
            retry_count: failures,
        };
        let replaced = self
            .entries()
            .insert(entry.agent.id.clone(), entry.clone())
            .is_some();
        info!(agent = %entry.agent.id, retries = failures, replaced, "agent registered");
        for o in &self.observers {
            o.on_registered(&entry);
        }
        Ok(RegistrationResult {
            agent_id: entry.agent.id,
            success: true,
            retry_count: failures,
            error: None,
        })
    }

    /// Register each agent in order. Failures are reported per agent.
    pub async fn register_batch(&self, agents: Vec<ConvertedAgent>) -> Vec<RegistrationResult> {
        let mut results = Vec::with_capacity(agents.len());
        for agent in agents {
            let agent_id = agent.id.clone();
            let result = match self.register_agent(agent).await {
                Ok(r) => r,
                Err(e) => RegistrationResult {
                    agent_id,
                    success: false,
                    retry_count: match &e {
                        AdapterError::Registration { retry_count, .. } => *retry_count,
                        _ => 0,
                    },
                    error: Some(e.to_string()),
                },
            };
            results.push(result);
        }
        results
    }

    /// Remove an agent. Returns false when it was not registered.
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let Some(entry) = self.entries().remove(agent_id) else {
            return false;
        };
        if let Err(e) = self.sink.unregister(&entry.agent) {
            warn!(agent = %agent_id, error = %e, "sink failed to unregister agent");
        }
        info!(agent = %agent_id, "agent unregistered");
        for o in &self.observers {
            o.on_unregistered(agent_id);
        }
        true
    }

    /// Snapshot of every registered agent.
    pub fn get_registered_agents(&self) -> HashMap<String, RegisteredAgentEntry> {
        self.entries().clone()
    }

    pub fn get(&self, agent_id: &str) -> Option<RegisteredAgentEntry> {
        self.entries().get(agent_id).cloned()
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.entries().contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn notify_failed(&self, agent_id: &str, err: &AdapterError) {
        for o in &self.observers {
            o.on_registration_failed(agent_id, err);
        }
    }
}
