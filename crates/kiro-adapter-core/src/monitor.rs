//! Activation telemetry, usage analytics and periodic health checks.
//!
//! [`ActivationMonitor`] is attached to the registry and the activation
//! manager as an observer. Derived figures (effectiveness, popularity,
//! ratings) are computed when read, never stored.

use crate::activation::{ActivationContext, ActivationObserver, AgentInstance, HandlerCatalog};
use crate::config::MonitorConfig;
use crate::error::{ActivationFailure, AdapterError, Result};
use crate::io;
use crate::registry::{AgentRegistry, RegisteredAgentEntry, RegistryObserver};
use crate::types::{HealthState, PerformanceRating};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u32 = 1;
const MAX_HEALTH_HISTORY: usize = 100;

// ---------------------------------------------------------------------------
// Per-agent records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationMetrics {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    /// Duration of successful activations only.
    pub total_duration_ms: u64,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub slow_activations: u64,
    /// Failure count keyed by `ErrorCategory::as_str`.
    #[serde(default)]
    pub failure_categories: BTreeMap<String, u64>,
    #[serde(default)]
    pub registration_failures: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activation: Option<DateTime<Utc>>,
}

impl ActivationMetrics {
    pub fn average_duration_ms(&self) -> Option<f64> {
        (self.successes > 0).then(|| self.total_duration_ms as f64 / self.successes as f64)
    }

    /// `successes / (successes + failures) * 100`, None before any attempt.
    pub fn effectiveness(&self) -> Option<f64> {
        let attempts = self.successes + self.failures;
        (attempts > 0).then(|| self.successes as f64 / attempts as f64 * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSample {
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageAnalytics {
    /// Timestamps of successful activations.
    pub activations: Vec<DateTime<Utc>>,
    pub session_count: u64,
    pub total_session_ms: u64,
    pub sessions: Vec<SessionSample>,
}

impl UsageAnalytics {
    pub fn average_session_ms(&self) -> Option<f64> {
        (self.session_count > 0).then(|| self.total_session_ms as f64 / self.session_count as f64)
    }

    /// Recent activations weighted by age: last day x3, last week x2, last
    /// 30 days x1.
    pub fn popularity(&self, now: DateTime<Utc>) -> u64 {
        self.activations
            .iter()
            .map(|&t| {
                let age = now - t;
                if age <= ChronoDuration::days(1) {
                    3
                } else if age <= ChronoDuration::days(7) {
                    2
                } else if age <= ChronoDuration::days(30) {
                    1
                } else {
                    0
                }
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthChecks {
    pub file_exists: bool,
    pub metadata_valid: bool,
    pub handler_present: bool,
}

impl HealthChecks {
    pub fn state(&self) -> HealthState {
        if self.file_exists && self.metadata_valid && self.handler_present {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        }
    }

    pub fn issues(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.file_exists {
            out.push("agent file missing");
        }
        if !self.metadata_valid {
            out.push("metadata invalid");
        }
        if !self.handler_present {
            out.push("activation handler not registered");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub checked_at: DateTime<Utc>,
    pub status: HealthState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub last_check: DateTime<Utc>,
    pub checks: HealthChecks,
    #[serde(default)]
    pub history: Vec<HealthSample>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_id: String,
    pub status: HealthState,
    pub checks: HealthChecks,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub agents: Vec<AgentHealth>,
}

impl HealthReport {
    pub fn healthy(&self) -> usize {
        self.agents
            .iter()
            .filter(|a| a.status == HealthState::Healthy)
            .count()
    }

    pub fn unhealthy(&self) -> usize {
        self.agents.len() - self.healthy()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationStatistics {
    pub agents_tracked: usize,
    pub total_activations: u64,
    pub successes: u64,
    pub failures: u64,
    /// Percentage; 0 before any attempt.
    pub success_rate: f64,
    pub average_duration_ms: Option<f64>,
    pub failure_categories: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub agent_id: String,
    pub activation_count: usize,
    pub session_count: u64,
    pub total_session_ms: u64,
    pub average_session_ms: Option<f64>,
    pub effectiveness: Option<f64>,
    pub popularity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentScore {
    pub agent_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub activations_removed: usize,
    pub sessions_removed: usize,
    pub health_samples_removed: usize,
}

// ---------------------------------------------------------------------------
// ActivationMonitor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MonitorState {
    #[serde(default)]
    metrics: BTreeMap<String, ActivationMetrics>,
    #[serde(default)]
    usage: BTreeMap<String, UsageAnalytics>,
    #[serde(default)]
    health: BTreeMap<String, HealthStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    state: MonitorState,
}

pub struct ActivationMonitor {
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

impl ActivationMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MonitorState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_activation_statistics(&self) -> ActivationStatistics {
        let state = self.state();
        let mut stats = ActivationStatistics {
            agents_tracked: state.metrics.len(),
            ..Default::default()
        };
        let mut duration_ms = 0u64;
        for m in state.metrics.values() {
            stats.total_activations += m.total;
            stats.successes += m.successes;
            stats.failures += m.failures;
            duration_ms += m.total_duration_ms;
            for (category, n) in &m.failure_categories {
                *stats.failure_categories.entry(category.clone()).or_default() += n;
            }
        }
        if stats.total_activations > 0 {
            stats.success_rate = stats.successes as f64 / stats.total_activations as f64 * 100.0;
        }
        if stats.successes > 0 {
            stats.average_duration_ms = Some(duration_ms as f64 / stats.successes as f64);
        }
        stats
    }

    /// Agent ids with any recorded metrics or usage, sorted.
    pub fn tracked_agents(&self) -> Vec<String> {
        let state = self.state();
        let mut ids: Vec<String> = state.metrics.keys().chain(state.usage.keys()).cloned().collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn agent_metrics(&self, agent_id: &str) -> Option<ActivationMetrics> {
        self.state().metrics.get(agent_id).cloned()
    }

    pub fn usage_analytics(&self, agent_id: &str) -> Option<UsageSummary> {
        let state = self.state();
        let metrics = state.metrics.get(agent_id);
        let usage = state.usage.get(agent_id);
        if metrics.is_none() && usage.is_none() {
            return None;
        }
        let usage = usage.cloned().unwrap_or_default();
        Some(UsageSummary {
            agent_id: agent_id.to_string(),
            activation_count: usage.activations.len(),
            session_count: usage.session_count,
            total_session_ms: usage.total_session_ms,
            average_session_ms: usage.average_session_ms(),
            effectiveness: metrics.and_then(|m| m.effectiveness()),
            popularity: usage.popularity(Utc::now()),
        })
    }

    pub fn performance_rating(&self, agent_id: &str) -> PerformanceRating {
        let avg = self
            .state()
            .metrics
            .get(agent_id)
            .and_then(|m| m.average_duration_ms());
        PerformanceRating::from_average(avg, self.config.slow_activation_threshold_ms)
    }

    pub fn health_status(&self, agent_id: &str) -> Option<HealthStatus> {
        self.state().health.get(agent_id).cloned()
    }

    /// Highest weighted recent activation counts first; ties by id.
    pub fn most_popular_agents(&self, limit: usize) -> Vec<AgentScore> {
        let now = Utc::now();
        let mut scores: Vec<AgentScore> = self
            .state()
            .usage
            .iter()
            .map(|(id, u)| AgentScore {
                agent_id: id.clone(),
                score: u.popularity(now) as f64,
            })
            .filter(|s| s.score > 0.0)
            .collect();
        scores.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        scores.truncate(limit);
        scores
    }

    /// Agents with at least one attempt whose effectiveness is below
    /// `threshold` percent, worst first.
    pub fn low_effectiveness_agents(&self, threshold: f64) -> Vec<AgentScore> {
        let mut low: Vec<AgentScore> = self
            .state()
            .metrics
            .iter()
            .filter_map(|(id, m)| {
                let eff = m.effectiveness()?;
                (eff < threshold).then(|| AgentScore {
                    agent_id: id.clone(),
                    score: eff,
                })
            })
            .collect();
        low.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        low
    }

    // -----------------------------------------------------------------------
    // Health checks
    // -----------------------------------------------------------------------

    /// Check every registered agent concurrently and record the round.
    pub async fn run_health_checks(
        &self,
        registry: &AgentRegistry,
        handlers: &HandlerCatalog,
    ) -> HealthReport {
        let entries = registry.get_registered_agents();
        let rounds = entries.values().map(|entry| check_agent(entry, handlers));
        let mut agents = join_all(rounds).await;
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        let checked_at = Utc::now();
        {
            let mut state = self.state();
            for a in &agents {
                let status = state
                    .health
                    .entry(a.agent_id.clone())
                    .or_insert_with(|| HealthStatus {
                        status: a.status,
                        last_check: checked_at,
                        checks: a.checks,
                        history: Vec::new(),
                    });
                status.status = a.status;
                status.last_check = checked_at;
                status.checks = a.checks;
                status.history.push(HealthSample {
                    checked_at,
                    status: a.status,
                });
                if status.history.len() > MAX_HEALTH_HISTORY {
                    let excess = status.history.len() - MAX_HEALTH_HISTORY;
                    status.history.drain(..excess);
                }
            }
        }

        let report = HealthReport { checked_at, agents };
        if report.unhealthy() > 0 {
            warn!(
                healthy = report.healthy(),
                unhealthy = report.unhealthy(),
                "health check found unhealthy agents"
            );
        } else {
            debug!(agents = report.agents.len(), "health check passed");
        }
        report
    }

    /// Run [`Self::run_health_checks`] every `monitor.health_check_interval`
    /// until the returned handle is aborted.
    pub fn start_health_checks(
        self: Arc<Self>,
        registry: Arc<AgentRegistry>,
        handlers: Arc<HandlerCatalog>,
    ) -> JoinHandle<()> {
        let period = self.config.health_check_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                self.run_health_checks(&registry, &handlers).await;
            }
        })
    }

    // -----------------------------------------------------------------------
    // Persistence and retention
    // -----------------------------------------------------------------------

    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            state: self.state().clone(),
        };
        io::write_json(path, &snapshot)?;
        debug!(path = %path.display(), "activation metrics saved");
        Ok(())
    }

    /// Replace in-memory state with the snapshot at `path`. Returns false
    /// (state untouched) when there is no snapshot.
    pub fn load(&self, path: &Path) -> Result<bool> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_str(&data)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(AdapterError::Validation(format!(
                "unsupported metrics snapshot version {} in {}",
                snapshot.version,
                path.display()
            )));
        }
        *self.state() = snapshot.state;
        Ok(true)
    }

    /// Drop timestamps, sessions and health samples older than `retention`.
    /// Counters are kept.
    pub fn cleanup(&self, retention: ChronoDuration) -> CleanupStats {
        let horizon = Utc::now() - retention;
        let mut stats = CleanupStats::default();
        let mut state = self.state();
        for usage in state.usage.values_mut() {
            let before = usage.activations.len();
            usage.activations.retain(|t| *t >= horizon);
            stats.activations_removed += before - usage.activations.len();

            let before = usage.sessions.len();
            usage.sessions.retain(|s| s.ended_at >= horizon);
            stats.sessions_removed += before - usage.sessions.len();
        }
        for health in state.health.values_mut() {
            let before = health.history.len();
            health.history.retain(|h| h.checked_at >= horizon);
            stats.health_samples_removed += before - health.history.len();
        }
        info!(
            activations = stats.activations_removed,
            sessions = stats.sessions_removed,
            health_samples = stats.health_samples_removed,
            "metrics cleanup"
        );
        stats
    }

    pub fn reset(&self) {
        *self.state() = MonitorState::default();
    }
}

async fn check_agent(entry: &RegisteredAgentEntry, handlers: &HandlerCatalog) -> AgentHealth {
    let agent = &entry.agent;
    let checks = HealthChecks {
        file_exists: tokio::fs::metadata(&agent.output_path).await.is_ok(),
        metadata_valid: agent.validate().is_ok(),
        handler_present: handlers.contains(&agent.integration.activation_handler),
    };
    AgentHealth {
        agent_id: agent.id.clone(),
        status: checks.state(),
        checks,
        issues: checks.issues().into_iter().map(String::from).collect(),
    }
}

// ---------------------------------------------------------------------------
// Observer wiring
// ---------------------------------------------------------------------------

impl RegistryObserver for ActivationMonitor {
    fn on_registered(&self, entry: &RegisteredAgentEntry) {
        self.state()
            .metrics
            .entry(entry.agent.id.clone())
            .or_default();
    }

    fn on_registration_failed(&self, agent_id: &str, error: &AdapterError) {
        debug!(agent = %agent_id, error = %error, "registration failure recorded");
        self.state()
            .metrics
            .entry(agent_id.to_string())
            .or_default()
            .registration_failures += 1;
    }

    fn on_unregistered(&self, agent_id: &str) {
        self.state().health.remove(agent_id);
    }
}

impl ActivationObserver for ActivationMonitor {
    fn on_activation_started(&self, agent_id: &str, _context: &ActivationContext) {
        debug!(agent = %agent_id, "activation attempt");
    }

    fn on_activated(&self, instance: &AgentInstance, duration: Duration) {
        let ms = duration.as_millis() as u64;
        let slow = ms > self.config.slow_activation_threshold_ms;
        if slow {
            warn!(agent = %instance.agent_id, duration_ms = ms, "slow activation");
        }
        let mut state = self.state();
        let m = state.metrics.entry(instance.agent_id.clone()).or_default();
        m.total += 1;
        m.successes += 1;
        m.total_duration_ms += ms;
        m.min_duration_ms = Some(m.min_duration_ms.map_or(ms, |v| v.min(ms)));
        m.max_duration_ms = Some(m.max_duration_ms.map_or(ms, |v| v.max(ms)));
        if slow {
            m.slow_activations += 1;
        }
        m.last_activation = Some(instance.activated_at);
        state
            .usage
            .entry(instance.agent_id.clone())
            .or_default()
            .activations
            .push(instance.activated_at);
    }

    fn on_activation_failed(
        &self,
        agent_id: &str,
        reason: &ActivationFailure,
        _duration: Duration,
    ) {
        let mut state = self.state();
        let m = state.metrics.entry(agent_id.to_string()).or_default();
        m.total += 1;
        m.failures += 1;
        *m.failure_categories
            .entry(reason.category().as_str().to_string())
            .or_default() += 1;
    }

    fn on_deactivated(&self, instance: &AgentInstance, session: Duration) {
        let ms = session.as_millis() as u64;
        let mut state = self.state();
        let u = state.usage.entry(instance.agent_id.clone()).or_default();
        u.session_count += 1;
        u.total_session_ms += ms;
        u.sessions.push(SessionSample {
            ended_at: Utc::now(),
            duration_ms: ms,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationManager;
    use crate::config::{ActivationConfig, OutputConfig, RegistryConfig};
    use crate::registry::{FileRegistrationSink, NullSink};
    use crate::test_support::{converted, metadata};
    use crate::types::{AgentSource, InstanceStatus};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn instance(agent_id: &str, at: DateTime<Utc>) -> AgentInstance {
        AgentInstance {
            instance_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            status: InstanceStatus::Active,
            activated_at: at,
            last_activity: at,
            context: ActivationContext::default(),
            capabilities: vec![],
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn effectiveness_and_statistics() {
        let monitor = ActivationMonitor::new(MonitorConfig::default());
        let now = Utc::now();
        monitor.on_activated(&instance("dev", now), ms(100));
        monitor.on_activated(&instance("dev", now), ms(300));
        monitor.on_activation_failed("dev", &ActivationFailure::Timeout { timeout_ms: 10 }, ms(10));

        let usage = monitor.usage_analytics("dev").unwrap();
        assert!((usage.effectiveness.unwrap() - 66.67).abs() < 0.01);
        assert_eq!(usage.activation_count, 2);

        let m = monitor.agent_metrics("dev").unwrap();
        assert_eq!((m.total, m.successes, m.failures), (3, 2, 1));
        assert_eq!(m.min_duration_ms, Some(100));
        assert_eq!(m.max_duration_ms, Some(300));
        assert_eq!(m.failure_categories.get("performance"), Some(&1));

        let stats = monitor.get_activation_statistics();
        assert_eq!(stats.total_activations, 3);
        assert_eq!(stats.average_duration_ms, Some(200.0));
        assert!(monitor.usage_analytics("ghost").is_none());
    }

    #[test]
    fn performance_rating_bands() {
        let monitor = ActivationMonitor::new(MonitorConfig::default());
        assert_eq!(monitor.performance_rating("dev"), PerformanceRating::Unknown);
        monitor.on_activated(&instance("dev", Utc::now()), ms(1000));
        assert_eq!(monitor.performance_rating("dev"), PerformanceRating::Excellent);
        monitor.on_activated(&instance("qa", Utc::now()), ms(6000));
        assert_eq!(monitor.performance_rating("qa"), PerformanceRating::Poor);
        assert_eq!(monitor.agent_metrics("qa").unwrap().slow_activations, 1);
    }

    #[test]
    fn popularity_weights_recent_activations() {
        let monitor = ActivationMonitor::new(MonitorConfig::default());
        let now = Utc::now();
        // dev: one today (3). qa: three from ten days ago plus one from three
        // days ago (3 + 2).
        monitor.on_activated(&instance("dev", now), ms(1));
        for _ in 0..3 {
            monitor.on_activated(&instance("qa", now - ChronoDuration::days(10)), ms(1));
        }
        monitor.on_activated(&instance("qa", now - ChronoDuration::days(3)), ms(1));
        monitor.on_activated(&instance("pm", now - ChronoDuration::days(40)), ms(1));

        let top = monitor.most_popular_agents(5);
        let ids: Vec<_> = top.iter().map(|s| (s.agent_id.as_str(), s.score)).collect();
        assert_eq!(ids, vec![("qa", 5.0), ("dev", 3.0)]);
        assert_eq!(monitor.most_popular_agents(1).len(), 1);
    }

    #[test]
    fn low_effectiveness_lists_worst_first() {
        let monitor = ActivationMonitor::new(MonitorConfig::default());
        let now = Utc::now();
        monitor.on_activated(&instance("dev", now), ms(1));
        monitor.on_activation_failed("qa", &ActivationFailure::NotRegistered, ms(1));
        monitor.on_activated(&instance("pm", now), ms(1));
        monitor.on_activation_failed("pm", &ActivationFailure::AlreadyActive, ms(1));

        let low = monitor.low_effectiveness_agents(75.0);
        let ids: Vec<_> = low.iter().map(|s| s.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["qa", "pm"]);
    }

    #[test]
    fn cleanup_prunes_history_but_keeps_counters() {
        let monitor = ActivationMonitor::new(MonitorConfig::default());
        let now = Utc::now();
        monitor.on_activated(&instance("dev", now - ChronoDuration::days(45)), ms(1));
        monitor.on_activated(&instance("dev", now), ms(1));

        let stats = monitor.cleanup(ChronoDuration::days(30));
        assert_eq!(stats.activations_removed, 1);
        assert_eq!(monitor.usage_analytics("dev").unwrap().activation_count, 1);
        assert_eq!(monitor.agent_metrics("dev").unwrap().successes, 2);

        monitor.reset();
        assert!(monitor.agent_metrics("dev").is_none());
    }

    #[test]
    fn snapshot_survives_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/metrics.json");
        let monitor = ActivationMonitor::new(MonitorConfig::default());
        assert!(!monitor.load(&path).unwrap());

        monitor.on_activated(&instance("dev", Utc::now()), ms(42));
        monitor.on_deactivated(&instance("dev", Utc::now()), ms(5000));
        monitor.save(&path).unwrap();

        let restored = ActivationMonitor::new(MonitorConfig::default());
        assert!(restored.load(&path).unwrap());
        assert_eq!(restored.agent_metrics("dev"), monitor.agent_metrics("dev"));
        let usage = restored.usage_analytics("dev").unwrap();
        assert_eq!(usage.session_count, 1);
        assert_eq!(usage.average_session_ms, Some(5000.0));
    }

    #[tokio::test]
    async fn health_checks_flag_missing_files_and_handlers() {
        let dir = TempDir::new().unwrap();
        let output = OutputConfig::default().anchored(dir.path());
        let monitor = Arc::new(ActivationMonitor::new(MonitorConfig::default()));
        let registry = AgentRegistry::new(RegistryConfig::default(), Arc::new(FileRegistrationSink))
            .with_observer(monitor.clone());

        registry
            .register_agent(converted(metadata("dev", AgentSource::Core), &output))
            .await
            .unwrap();
        let qa = converted(metadata("qa", AgentSource::Core), &output);
        let qa_path = qa.output_path.clone();
        registry.register_agent(qa).await.unwrap();
        let mut pm = converted(metadata("pm", AgentSource::Core), &output);
        pm.integration.activation_handler = "custom".into();
        registry.register_agent(pm).await.unwrap();

        std::fs::remove_file(&qa_path).unwrap();
        let report = monitor
            .run_health_checks(&registry, &HandlerCatalog::with_defaults())
            .await;

        assert_eq!(report.healthy(), 1);
        assert_eq!(report.unhealthy(), 2);
        let qa = report.agents.iter().find(|a| a.agent_id == "qa").unwrap();
        assert_eq!(qa.issues, vec!["agent file missing"]);
        let pm = report.agents.iter().find(|a| a.agent_id == "pm").unwrap();
        assert!(!pm.checks.handler_present);
        assert_eq!(monitor.health_status("dev").unwrap().status, HealthState::Healthy);
        assert_eq!(monitor.health_status("qa").unwrap().history.len(), 1);
        assert_eq!(monitor.get_activation_statistics().agents_tracked, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_health_checks_record_history() {
        let monitor = Arc::new(ActivationMonitor::new(MonitorConfig::default()));
        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default(), Arc::new(NullSink)));
        registry
            .register_agent(converted(metadata("dev", AgentSource::Core), &OutputConfig::default()))
            .await
            .unwrap();

        let handle = monitor
            .clone()
            .start_health_checks(registry, Arc::new(HandlerCatalog::with_defaults()));
        tokio::time::sleep(Duration::from_secs(125)).await;
        handle.abort();

        let status = monitor.health_status("dev").unwrap();
        assert!(!status.history.is_empty());
        assert_eq!(status.status, HealthState::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_health_checks_still_run() {
        let config = MonitorConfig {
            health_check_interval_secs: 0,
            ..Default::default()
        };
        let monitor = Arc::new(ActivationMonitor::new(config));
        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default(), Arc::new(NullSink)));
        registry
            .register_agent(converted(metadata("qa", AgentSource::Core), &OutputConfig::default()))
            .await
            .unwrap();

        let handle = monitor
            .clone()
            .start_health_checks(registry, Arc::new(HandlerCatalog::with_defaults()));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!handle.is_finished());
        handle.abort();

        assert!(monitor.health_status("qa").is_some());
    }

    #[tokio::test]
    async fn monitor_observes_the_activation_manager() {
        let monitor = Arc::new(ActivationMonitor::new(MonitorConfig::default()));
        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default(), Arc::new(NullSink)));
        let mut dev = converted(metadata("dev", AgentSource::Core), &OutputConfig::default());
        dev.integration.activation_handler = "missing".into();
        registry.register_agent(dev).await.unwrap();

        let mgr = ActivationManager::new(
            ActivationConfig::default(),
            registry,
            Arc::new(HandlerCatalog::new()),
        )
        .with_observer(monitor.clone());
        assert!(mgr.activate_agent("dev", ActivationContext::default()).await.is_err());
        assert!(mgr.activate_agent("ghost", ActivationContext::default()).await.is_err());

        let stats = monitor.get_activation_statistics();
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.failure_categories.get("not_found"), Some(&2));
    }
}
