//! Live agent activations.
//!
//! An activation reserves a slot (status `activating`) under the lock, runs
//! the agent's [`ActivationHandler`] with the lock released, then re-checks
//! the slot before promoting it to `active`. A failed or timed-out attempt
//! removes the slot, so an agent is never left half-active.

use crate::config::ActivationConfig;
use crate::error::{ActivationFailure, AdapterError, Result};
use crate::registry::{AgentRegistry, RegisteredAgentEntry};
use crate::transform::{DEFAULT_HANDLER, EXPANSION_PACK_HANDLER};
use crate::types::{DependencyCategory, InstanceStatus};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Context and instances
// ---------------------------------------------------------------------------

/// Who activated an agent and with what workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub resources: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInstance {
    pub instance_id: Uuid,
    pub agent_id: String,
    pub status: InstanceStatus,
    pub activated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub context: ActivationContext,
    pub capabilities: Vec<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Brings a registered agent up and reports its capabilities.
pub trait ActivationHandler: Send + Sync {
    fn activate<'a>(
        &'a self,
        entry: &'a RegisteredAgentEntry,
        context: &'a ActivationContext,
    ) -> BoxFuture<'a, anyhow::Result<Vec<String>>>;
}

/// Checks that the converted agent file is in place and derives capabilities
/// from the resolved dependencies and integration bundle.
#[derive(Debug, Default)]
pub struct DefaultActivationHandler;

impl ActivationHandler for DefaultActivationHandler {
    fn activate<'a>(
        &'a self,
        entry: &'a RegisteredAgentEntry,
        _context: &'a ActivationContext,
    ) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
        Box::pin(async move {
            let agent = &entry.agent;
            if tokio::fs::metadata(&agent.output_path).await.is_err() {
                anyhow::bail!("agent file not found: {}", agent.output_path.display());
            }
            Ok(capabilities(entry))
        })
    }
}

pub fn capabilities(entry: &RegisteredAgentEntry) -> Vec<String> {
    let agent = &entry.agent;
    let mut caps = vec!["chat".to_string()];
    for &category in DependencyCategory::all() {
        let prefix = match category {
            DependencyCategory::Tasks => "task",
            DependencyCategory::Templates => "template",
            DependencyCategory::Checklists => "checklist",
            DependencyCategory::Data => "data",
        };
        for r in agent.dependencies.get(category) {
            let stem = r.name.rsplit_once('.').map_or(r.name.as_str(), |(s, _)| s);
            caps.push(format!("{prefix}:{stem}"));
        }
    }
    if !agent.integration.steering_rules.is_empty() {
        caps.push("steering".to_string());
    }
    if !agent.integration.hooks.is_empty() {
        caps.push("hooks".to_string());
    }
    caps
}

/// Handlers by name, as referenced from an agent's integration bundle.
#[derive(Default)]
pub struct HandlerCatalog {
    handlers: Mutex<HashMap<String, Arc<dyn ActivationHandler>>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with [`DefaultActivationHandler`] under both built-in names.
    pub fn with_defaults() -> Self {
        let catalog = Self::new();
        let handler: Arc<dyn ActivationHandler> = Arc::new(DefaultActivationHandler);
        catalog.register(DEFAULT_HANDLER, handler.clone());
        catalog.register(EXPANSION_PACK_HANDLER, handler);
        catalog
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn ActivationHandler>>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn ActivationHandler>) {
        self.handlers().insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActivationHandler>> {
        self.handlers().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers().keys().cloned().collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

pub trait ActivationObserver: Send + Sync {
    fn on_activation_started(&self, _agent_id: &str, _context: &ActivationContext) {}
    fn on_activated(&self, _instance: &AgentInstance, _duration: Duration) {}
    fn on_activation_failed(
        &self,
        _agent_id: &str,
        _reason: &ActivationFailure,
        _duration: Duration,
    ) {
    }
    /// `session` is the time between activation and deactivation.
    fn on_deactivated(&self, _instance: &AgentInstance, _session: Duration) {}
}

// ---------------------------------------------------------------------------
// ActivationManager
// ---------------------------------------------------------------------------

pub struct ActivationManager {
    config: ActivationConfig,
    registry: Arc<AgentRegistry>,
    handlers: Arc<HandlerCatalog>,
    instances: Mutex<HashMap<String, AgentInstance>>,
    observers: Vec<Arc<dyn ActivationObserver>>,
}

impl ActivationManager {
    pub fn new(
        config: ActivationConfig,
        registry: Arc<AgentRegistry>,
        handlers: Arc<HandlerCatalog>,
    ) -> Self {
        Self {
            config,
            registry,
            handlers,
            instances: Mutex::new(HashMap::new()),
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ActivationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    fn instances(&self) -> MutexGuard<'_, HashMap<String, AgentInstance>> {
        self.instances.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn activate_agent(
        &self,
        agent_id: &str,
        context: ActivationContext,
    ) -> Result<AgentInstance> {
        let started = Instant::now();
        for o in &self.observers {
            o.on_activation_started(agent_id, &context);
        }

        let Some(entry) = self.registry.get(agent_id) else {
            return Err(self.fail(agent_id, context, ActivationFailure::NotRegistered, started));
        };
        let handler_name = entry.agent.integration.activation_handler.clone();
        let Some(handler) = self.handlers.get(&handler_name) else {
            let reason = ActivationFailure::HandlerMissing {
                handler: handler_name,
            };
            return Err(self.fail(agent_id, context, reason, started));
        };

        let instance_id = match self.reserve(agent_id, &context) {
            Ok(id) => id,
            Err(reason) => return Err(self.fail(agent_id, context, reason, started)),
        };
        let mut reservation = Reservation {
            manager: self,
            agent_id,
            instance_id,
            armed: true,
        };
        debug!(agent = %agent_id, %instance_id, handler = %handler_name, "activation slot reserved");

        let outcome = tokio::time::timeout(
            self.config.timeout(),
            handler.activate(&entry, &context),
        )
        .await;

        let reason = match outcome {
            Ok(Ok(capabilities)) => match self.promote(agent_id, instance_id, capabilities) {
                Some(inst) => {
                    reservation.armed = false;
                    let elapsed = started.elapsed();
                    info!(
                        agent = %agent_id,
                        %instance_id,
                        duration_ms = elapsed.as_millis() as u64,
                        "agent activated"
                    );
                    for o in &self.observers {
                        o.on_activated(&inst, elapsed);
                    }
                    return Ok(inst);
                }
                None => ActivationFailure::HandlerFailed {
                    message: "activation reservation was lost".to_string(),
                },
            },
            Ok(Err(e)) => ActivationFailure::HandlerFailed {
                message: format!("{e:#}"),
            },
            Err(_) => ActivationFailure::Timeout {
                timeout_ms: self.config.activation_timeout_ms,
            },
        };

        drop(reservation);
        Err(self.fail(agent_id, context, reason, started))
    }

    /// Insert an `activating` instance, enforcing one instance per agent and
    /// the concurrency ceiling.
    fn reserve(
        &self,
        agent_id: &str,
        context: &ActivationContext,
    ) -> std::result::Result<Uuid, ActivationFailure> {
        let mut instances = self.instances();
        if instances.contains_key(agent_id) {
            return Err(ActivationFailure::AlreadyActive);
        }
        let max = self.config.max_concurrent_activations;
        if instances.len() >= max {
            return Err(ActivationFailure::ConcurrencyLimit { max });
        }
        let now = Utc::now();
        let instance_id = Uuid::new_v4();
        instances.insert(
            agent_id.to_string(),
            AgentInstance {
                instance_id,
                agent_id: agent_id.to_string(),
                status: InstanceStatus::Activating,
                activated_at: now,
                last_activity: now,
                context: context.clone(),
                capabilities: Vec::new(),
            },
        );
        Ok(instance_id)
    }

    /// Promote our reservation to `active`. None when it was removed while
    /// the handler ran.
    fn promote(
        &self,
        agent_id: &str,
        instance_id: Uuid,
        capabilities: Vec<String>,
    ) -> Option<AgentInstance> {
        let mut instances = self.instances();
        let inst = instances
            .get_mut(agent_id)
            .filter(|i| i.instance_id == instance_id)?;
        inst.status = InstanceStatus::Active;
        inst.capabilities = capabilities;
        inst.last_activity = Utc::now();
        Some(inst.clone())
    }

    fn release(&self, agent_id: &str, instance_id: Uuid) {
        let mut instances = self.instances();
        if instances
            .get(agent_id)
            .is_some_and(|i| i.instance_id == instance_id)
        {
            instances.remove(agent_id);
        }
    }

    fn fail(
        &self,
        agent_id: &str,
        context: ActivationContext,
        reason: ActivationFailure,
        started: Instant,
    ) -> AdapterError {
        let elapsed = started.elapsed();
        warn!(agent = %agent_id, reason = %reason, "activation failed");
        for o in &self.observers {
            o.on_activation_failed(agent_id, &reason, elapsed);
        }
        AdapterError::Activation {
            agent_id: agent_id.to_string(),
            context: Box::new(context),
            reason,
        }
    }

    /// Remove the agent's instance and return it as `inactive`. An
    /// activation still in flight is left to finish; None is returned.
    pub fn deactivate_agent(&self, agent_id: &str) -> Option<AgentInstance> {
        let mut removed = {
            let mut instances = self.instances();
            let status = instances.get(agent_id)?.status;
            if !status.can_transition_to(InstanceStatus::Inactive) {
                debug!(agent = %agent_id, %status, "activation in flight, not deactivating");
                return None;
            }
            instances.remove(agent_id)?
        };
        removed.status = InstanceStatus::Inactive;
        removed.last_activity = Utc::now();
        let session = (removed.last_activity - removed.activated_at)
            .to_std()
            .unwrap_or_default();
        info!(agent = %agent_id, instance_id = %removed.instance_id, "agent deactivated");
        for o in &self.observers {
            o.on_deactivated(&removed, session);
        }
        Some(removed)
    }

    pub fn get_agent_state(&self, agent_id: &str) -> Option<AgentInstance> {
        self.instances().get(agent_id).cloned()
    }

    /// Every live instance, ordered by agent id.
    pub fn active_agents(&self) -> Vec<AgentInstance> {
        let mut all: Vec<_> = self.instances().values().cloned().collect();
        all.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        all
    }

    pub fn mark_busy(&self, agent_id: &str) -> Result<AgentInstance> {
        self.transition(agent_id, InstanceStatus::Busy)
    }

    pub fn mark_idle(&self, agent_id: &str) -> Result<AgentInstance> {
        self.transition(agent_id, InstanceStatus::Idle)
    }

    pub fn mark_error(&self, agent_id: &str) -> Result<AgentInstance> {
        self.transition(agent_id, InstanceStatus::Error)
    }

    /// Refresh `last_activity` without changing status.
    pub fn touch(&self, agent_id: &str) -> Result<AgentInstance> {
        let mut instances = self.instances();
        let inst = instances
            .get_mut(agent_id)
            .ok_or_else(|| not_active(agent_id))?;
        inst.last_activity = Utc::now();
        Ok(inst.clone())
    }

    fn transition(&self, agent_id: &str, to: InstanceStatus) -> Result<AgentInstance> {
        let mut instances = self.instances();
        let inst = instances
            .get_mut(agent_id)
            .ok_or_else(|| not_active(agent_id))?;
        if !inst.status.can_transition_to(to) {
            return Err(AdapterError::Validation(format!(
                "agent '{agent_id}' cannot move from {} to {to}",
                inst.status
            )));
        }
        inst.status = to;
        inst.last_activity = Utc::now();
        Ok(inst.clone())
    }
}

/// An `activating` slot owned by one `activate_agent` call. Dropping it
/// while armed, including when the caller drops the activation future,
/// releases the slot.
struct Reservation<'a> {
    manager: &'a ActivationManager,
    agent_id: &'a str,
    instance_id: Uuid,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(agent = %self.agent_id, instance_id = %self.instance_id, "releasing activation slot");
            self.manager.release(self.agent_id, self.instance_id);
        }
    }
}

fn not_active(agent_id: &str) -> AdapterError {
    AdapterError::Validation(format!("agent '{agent_id}' is not active"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputConfig, RegistryConfig};
    use crate::error::ErrorCategory;
    use crate::registry::{FileRegistrationSink, NullSink};
    use crate::test_support::{converted, metadata};
    use crate::types::AgentSource;
    use tempfile::TempDir;

    struct Sleepy(Duration);

    impl ActivationHandler for Sleepy {
        fn activate<'a>(
            &'a self,
            _entry: &'a RegisteredAgentEntry,
            _context: &'a ActivationContext,
        ) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
            Box::pin(async move {
                tokio::time::sleep(self.0).await;
                Ok(vec!["chat".to_string()])
            })
        }
    }

    struct Broken;

    impl ActivationHandler for Broken {
        fn activate<'a>(
            &'a self,
            _entry: &'a RegisteredAgentEntry,
            _context: &'a ActivationContext,
        ) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
            Box::pin(async { anyhow::bail!("permission denied reading persona") })
        }
    }

    async fn setup(ids: &[&str], handler: &str, max: usize) -> ActivationManager {
        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default(), Arc::new(NullSink)));
        for id in ids {
            let mut a = converted(metadata(id, AgentSource::Core), &OutputConfig::default());
            a.integration.activation_handler = handler.to_string();
            registry.register_agent(a).await.unwrap();
        }
        let catalog = Arc::new(HandlerCatalog::new());
        catalog.register("sleepy", Arc::new(Sleepy(Duration::from_millis(50))));
        catalog.register("slow", Arc::new(Sleepy(Duration::from_secs(60))));
        catalog.register("broken", Arc::new(Broken));
        let config = ActivationConfig {
            max_concurrent_activations: max,
            activation_timeout_ms: 1000,
        };
        ActivationManager::new(config, registry, catalog)
    }

    fn failure(err: AdapterError) -> ActivationFailure {
        match err {
            AdapterError::Activation { reason, .. } => reason,
            other => panic!("not an activation error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn activate_then_reject_second_activation() {
        let mgr = setup(&["dev"], "sleepy", 10).await;
        let ctx = ActivationContext {
            user_id: Some("u1".into()),
            ..Default::default()
        };
        let inst = mgr.activate_agent("dev", ctx).await.unwrap();
        assert_eq!(inst.status, InstanceStatus::Active);
        assert_eq!(inst.capabilities, vec!["chat"]);
        assert_eq!(inst.context.user_id.as_deref(), Some("u1"));

        let err = mgr.activate_agent("dev", ActivationContext::default()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Conflict);
        assert_eq!(failure(err), ActivationFailure::AlreadyActive);
        assert_eq!(mgr.get_agent_state("dev").unwrap().instance_id, inst.instance_id);
    }

    #[tokio::test]
    async fn unknown_agent_and_handler() {
        let mgr = setup(&["dev"], "nope", 10).await;
        let err = mgr.activate_agent("ghost", ActivationContext::default()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(failure(err), ActivationFailure::NotRegistered);

        let err = mgr.activate_agent("dev", ActivationContext::default()).await.unwrap_err();
        assert_eq!(
            failure(err),
            ActivationFailure::HandlerMissing {
                handler: "nope".into()
            }
        );
        assert!(mgr.active_agents().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_ceiling_counts_in_flight_activations() {
        let mgr = setup(&["dev", "qa", "pm"], "sleepy", 2).await;
        let (a, b, c) = tokio::join!(
            mgr.activate_agent("dev", ActivationContext::default()),
            mgr.activate_agent("qa", ActivationContext::default()),
            mgr.activate_agent("pm", ActivationContext::default()),
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(
            failure(c.unwrap_err()),
            ActivationFailure::ConcurrencyLimit { max: 2 }
        );
        assert_eq!(mgr.active_agents().len(), 2);

        mgr.deactivate_agent("dev");
        assert!(mgr.activate_agent("pm", ActivationContext::default()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_the_reservation() {
        let mgr = setup(&["dev"], "slow", 10).await;
        let err = mgr.activate_agent("dev", ActivationContext::default()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Performance);
        assert_eq!(failure(err), ActivationFailure::Timeout { timeout_ms: 1000 });
        assert!(mgr.get_agent_state("dev").is_none());
    }

    #[tokio::test]
    async fn handler_failure_is_classified_from_message() {
        let mgr = setup(&["dev"], "broken", 10).await;
        let err = mgr.activate_agent("dev", ActivationContext::default()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permission);
        assert!(mgr.get_agent_state("dev").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn status_transitions_and_idempotent_deactivate() {
        let mgr = setup(&["dev"], "sleepy", 10).await;
        mgr.activate_agent("dev", ActivationContext::default()).await.unwrap();

        assert_eq!(mgr.mark_busy("dev").unwrap().status, InstanceStatus::Busy);
        assert_eq!(mgr.mark_idle("dev").unwrap().status, InstanceStatus::Idle);
        assert!(mgr.touch("dev").is_ok());
        assert_eq!(mgr.mark_error("dev").unwrap().status, InstanceStatus::Error);
        assert!(mgr.mark_busy("dev").is_err());

        let gone = mgr.deactivate_agent("dev").unwrap();
        assert_eq!(gone.status, InstanceStatus::Inactive);
        assert!(mgr.deactivate_agent("dev").is_none());
        assert!(mgr.mark_busy("dev").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_activation_releases_its_slot() {
        let mgr = setup(&["dev"], "sleepy", 1).await;
        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            mgr.activate_agent("dev", ActivationContext::default()),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(mgr.get_agent_state("dev").is_none());

        let inst = mgr.activate_agent("dev", ActivationContext::default()).await.unwrap();
        assert_eq!(inst.status, InstanceStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_leaves_in_flight_activation_alone() {
        let mgr = setup(&["dev"], "sleepy", 10).await;
        let (activated, deactivated) = tokio::join!(
            mgr.activate_agent("dev", ActivationContext::default()),
            async { mgr.deactivate_agent("dev") },
        );
        assert!(deactivated.is_none());
        assert_eq!(activated.unwrap().status, InstanceStatus::Active);
        assert_eq!(
            mgr.deactivate_agent("dev").unwrap().status,
            InstanceStatus::Inactive
        );
    }

    #[tokio::test]
    async fn default_handler_checks_agent_file() {
        let dir = TempDir::new().unwrap();
        let output = OutputConfig::default().anchored(dir.path());
        let registry = Arc::new(AgentRegistry::new(
            RegistryConfig::default(),
            Arc::new(FileRegistrationSink),
        ));
        let agent = converted(metadata("dev", AgentSource::Core), &output);
        let path = agent.output_path.clone();
        registry.register_agent(agent).await.unwrap();

        let mgr = ActivationManager::new(
            ActivationConfig::default(),
            registry,
            Arc::new(HandlerCatalog::with_defaults()),
        );
        let inst = mgr.activate_agent("dev", ActivationContext::default()).await.unwrap();
        assert!(inst.capabilities.contains(&"steering".to_string()));
        assert!(inst.capabilities.contains(&"hooks".to_string()));
        mgr.deactivate_agent("dev");

        std::fs::remove_file(&path).unwrap();
        let err = mgr.activate_agent("dev", ActivationContext::default()).await.unwrap_err();
        match failure(err) {
            ActivationFailure::HandlerFailed { message } => {
                assert!(message.contains("agent file not found"))
            }
            other => panic!("unexpected failure: {other}"),
        }
    }
}
