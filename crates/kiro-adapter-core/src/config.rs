use crate::error::{AdapterError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// DiscoveryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_core_agents_dir")]
    pub core_agents_dir: PathBuf,
    #[serde(default = "default_expansion_packs_dir")]
    pub expansion_packs_dir: PathBuf,
    #[serde(default = "default_true")]
    pub include_expansion_packs: bool,
}

fn default_core_agents_dir() -> PathBuf {
    PathBuf::from(paths::CORE_AGENTS_DIR)
}

fn default_expansion_packs_dir() -> PathBuf {
    PathBuf::from(paths::EXPANSION_PACKS_DIR)
}

fn default_true() -> bool {
    true
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            core_agents_dir: default_core_agents_dir(),
            expansion_packs_dir: default_expansion_packs_dir(),
            include_expansion_packs: true,
        }
    }
}

// ---------------------------------------------------------------------------
// DependencyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    /// Searched in order after the agent's own expansion-pack directory.
    #[serde(default = "default_base_paths")]
    pub base_paths: Vec<PathBuf>,
    /// Share file contents across agents within one resolver.
    #[serde(default)]
    pub cache: bool,
}

fn default_base_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(paths::CORE_DIR), PathBuf::from(paths::COMMON_DIR)]
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            base_paths: default_base_paths(),
            cache: false,
        }
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_agents_dir")]
    pub agents_dir: PathBuf,
    #[serde(default = "default_steering_dir")]
    pub steering_dir: PathBuf,
    #[serde(default = "default_hooks_dir")]
    pub hooks_dir: PathBuf,
    #[serde(default = "default_metrics_file")]
    pub metrics_file: PathBuf,
}

fn default_agents_dir() -> PathBuf {
    PathBuf::from(paths::AGENTS_OUTPUT_DIR)
}

fn default_steering_dir() -> PathBuf {
    PathBuf::from(paths::STEERING_DIR)
}

fn default_hooks_dir() -> PathBuf {
    PathBuf::from(paths::HOOKS_DIR)
}

fn default_metrics_file() -> PathBuf {
    PathBuf::from(paths::METRICS_FILE)
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            agents_dir: default_agents_dir(),
            steering_dir: default_steering_dir(),
            hooks_dir: default_hooks_dir(),
            metrics_file: default_metrics_file(),
        }
    }
}

impl OutputConfig {
    /// Copy with every directory anchored at `root`.
    pub fn anchored(&self, root: &Path) -> OutputConfig {
        OutputConfig {
            agents_dir: paths::resolve(root, &self.agents_dir),
            steering_dir: paths::resolve(root, &self.steering_dir),
            hooks_dir: paths::resolve(root, &self.hooks_dir),
            metrics_file: paths::resolve(root, &self.metrics_file),
        }
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl RegistryConfig {
    /// Delay before retry number `retry` (1-based):
    /// `retry_delay_ms * 2^(retry-1)`, capped at `max_retry_delay_ms`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let ms = self
            .retry_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_retry_delay_ms);
        Duration::from_millis(ms)
    }
}

// ---------------------------------------------------------------------------
// ActivationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_activations: usize,
    #[serde(default = "default_activation_timeout_ms")]
    pub activation_timeout_ms: u64,
}

fn default_max_concurrent() -> usize {
    10
}

fn default_activation_timeout_ms() -> u64 {
    30_000
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_activations: default_max_concurrent(),
            activation_timeout_ms: default_activation_timeout_ms(),
        }
    }
}

impl ActivationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.activation_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_slow_threshold")]
    pub slow_activation_threshold_ms: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_true")]
    pub persist_metrics: bool,
}

fn default_health_interval() -> u64 {
    60
}

fn default_slow_threshold() -> u64 {
    5000
}

fn default_retention_days() -> u32 {
    30
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: default_health_interval(),
            slow_activation_threshold_ms: default_slow_threshold(),
            retention_days: default_retention_days(),
            persist_metrics: true,
        }
    }
}

impl MonitorConfig {
    /// Never shorter than one second.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Treat a missing dependency as a per-agent conversion failure.
    #[serde(default)]
    pub fail_on_missing_dependencies: bool,
    #[serde(default = "default_true")]
    pub generate_steering: bool,
    #[serde(default = "default_true")]
    pub generate_hooks: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fail_on_missing_dependencies: false,
            generate_steering: true,
            generate_hooks: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AdapterConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub dependencies: DependencyConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub activation: ActivationConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            discovery: DiscoveryConfig::default(),
            dependencies: DependencyConfig::default(),
            output: OutputConfig::default(),
            registry: RegistryConfig::default(),
            activation: ActivationConfig::default(),
            monitor: MonitorConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Load `.kiro/adapter.yaml`, falling back to defaults when it is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: AdapterConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// [`load`](Self::load), then reject configs with error-level warnings.
    pub fn load_validated(root: &Path) -> Result<Self> {
        let cfg = Self::load(root)?;
        let errors: Vec<String> = cfg
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if !errors.is_empty() {
            return Err(AdapterError::Config(errors.join("; ")));
        }
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.registry.retry_attempts == 0 {
            error("registry.retry_attempts must be at least 1".to_string());
        }
        if self.activation.max_concurrent_activations == 0 {
            error("activation.max_concurrent_activations must be at least 1".to_string());
        }
        if self.activation.activation_timeout_ms == 0 {
            error("activation.activation_timeout_ms must be greater than 0".to_string());
        }
        if self.monitor.health_check_interval_secs == 0 {
            error("monitor.health_check_interval_secs must be greater than 0".to_string());
        }
        if self.discovery.core_agents_dir.as_os_str().is_empty() {
            error("discovery.core_agents_dir cannot be empty".to_string());
        }

        if self.registry.retry_attempts > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "registry.retry_attempts={} (>10 is unusual)",
                    self.registry.retry_attempts
                ),
            });
        }
        if self.registry.retry_delay_ms > self.registry.max_retry_delay_ms {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "registry.retry_delay_ms ({}) exceeds max_retry_delay_ms ({}); every retry waits the maximum",
                    self.registry.retry_delay_ms, self.registry.max_retry_delay_ms
                ),
            });
        }
        if self.dependencies.base_paths.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "dependencies.base_paths is empty; only expansion-pack dependencies will resolve"
                    .to_string(),
            });
        }
        if self.monitor.retention_days == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "monitor.retention_days=0 discards all history on cleanup".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = AdapterConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: AdapterConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.registry.retry_attempts, 3);
        assert_eq!(parsed.activation.max_concurrent_activations, 10);
        assert_eq!(parsed.monitor.retention_days, 30);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "registry:\n  retry_attempts: 5\n";
        let cfg: AdapterConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.registry.retry_attempts, 5);
        assert_eq!(cfg.registry.retry_delay_ms, 1000);
        assert_eq!(
            cfg.discovery.core_agents_dir,
            PathBuf::from(".bmad-core/agents")
        );
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AdapterConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.output.agents_dir, PathBuf::from(".kiro/agents"));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = AdapterConfig::default();
        cfg.activation.max_concurrent_activations = 2;
        cfg.save(dir.path()).unwrap();
        let loaded = AdapterConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.activation.max_concurrent_activations, 2);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = RegistryConfig {
            retry_attempts: 5,
            retry_delay_ms: 100,
            max_retry_delay_ms: 350,
        };
        assert_eq!(cfg.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(cfg.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(cfg.backoff_delay(3), Duration::from_millis(350));
        assert_eq!(cfg.backoff_delay(40), Duration::from_millis(350));
    }

    #[test]
    fn validate_flags_zero_limits() {
        let mut cfg = AdapterConfig::default();
        assert!(cfg.validate().is_empty());

        cfg.registry.retry_attempts = 0;
        cfg.activation.max_concurrent_activations = 0;
        let warnings = cfg.validate();
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .collect();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn load_validated_rejects_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".kiro")).unwrap();
        std::fs::write(
            dir.path().join(".kiro/adapter.yaml"),
            "activation:\n  activation_timeout_ms: 0\n",
        )
        .unwrap();
        let err = AdapterConfig::load_validated(dir.path()).unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }

    #[test]
    fn zero_health_interval_is_clamped() {
        let monitor = MonitorConfig {
            health_check_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(monitor.health_check_interval(), Duration::from_secs(1));
    }

    #[test]
    fn anchored_output_paths() {
        let out = OutputConfig::default().anchored(Path::new("/proj"));
        assert_eq!(out.hooks_dir, PathBuf::from("/proj/.kiro/hooks"));
        assert_eq!(
            out.metrics_file,
            PathBuf::from("/proj/.kiro/state/activation-metrics.json")
        );
    }
}
