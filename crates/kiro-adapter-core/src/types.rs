use crate::error::AdapterError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// AgentSource
// ---------------------------------------------------------------------------

/// Where an agent definition came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentSource {
    Core,
    ExpansionPack { pack: String },
}

impl AgentSource {
    pub fn pack(&self) -> Option<&str> {
        match self {
            AgentSource::Core => None,
            AgentSource::ExpansionPack { pack } => Some(pack),
        }
    }

    pub fn is_expansion_pack(&self) -> bool {
        matches!(self, AgentSource::ExpansionPack { .. })
    }
}

impl fmt::Display for AgentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentSource::Core => f.write_str("core"),
            AgentSource::ExpansionPack { pack } => write!(f, "expansion-pack:{pack}"),
        }
    }
}

// ---------------------------------------------------------------------------
// DependencyCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCategory {
    Tasks,
    Templates,
    Checklists,
    Data,
}

impl DependencyCategory {
    pub fn all() -> &'static [DependencyCategory] {
        &[
            DependencyCategory::Tasks,
            DependencyCategory::Templates,
            DependencyCategory::Checklists,
            DependencyCategory::Data,
        ]
    }

    /// Key in the agent's `dependencies:` block and directory name under a
    /// dependency base path; the two are the same by convention.
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyCategory::Tasks => "tasks",
            DependencyCategory::Templates => "templates",
            DependencyCategory::Checklists => "checklists",
            DependencyCategory::Data => "data",
        }
    }
}

impl fmt::Display for DependencyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DependencyCategory {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tasks" => Ok(DependencyCategory::Tasks),
            "templates" => Ok(DependencyCategory::Templates),
            "checklists" => Ok(DependencyCategory::Checklists),
            "data" => Ok(DependencyCategory::Data),
            _ => Err(AdapterError::Validation(format!(
                "unknown dependency category: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// InstanceStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Inactive,
    Activating,
    Active,
    Busy,
    Idle,
    Error,
}

impl InstanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Inactive => "inactive",
            InstanceStatus::Activating => "activating",
            InstanceStatus::Active => "active",
            InstanceStatus::Busy => "busy",
            InstanceStatus::Idle => "idle",
            InstanceStatus::Error => "error",
        }
    }

    /// Whether `self → to` is an edge of the instance state machine.
    pub fn can_transition_to(self, to: InstanceStatus) -> bool {
        use InstanceStatus::*;
        match (self, to) {
            (_, Error) => self != Inactive,
            (Inactive, Activating) => true,
            (Activating, Active) => true,
            (Active | Busy | Idle, Busy | Idle | Active) => self != to,
            (Active | Busy | Idle | Error, Inactive) => true,
            _ => false,
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HealthState / PerformanceRating
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceRating {
    Excellent,
    Good,
    Fair,
    Poor,
    Unknown,
}

impl PerformanceRating {
    /// Rate an average duration against the slow-activation threshold.
    pub fn from_average(avg_ms: Option<f64>, slow_threshold_ms: u64) -> PerformanceRating {
        let Some(avg) = avg_ms else {
            return PerformanceRating::Unknown;
        };
        let threshold = slow_threshold_ms.max(1) as f64;
        if avg <= threshold * 0.25 {
            PerformanceRating::Excellent
        } else if avg <= threshold * 0.5 {
            PerformanceRating::Good
        } else if avg <= threshold {
            PerformanceRating::Fair
        } else {
            PerformanceRating::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceRating::Excellent => "excellent",
            PerformanceRating::Good => "good",
            PerformanceRating::Fair => "fair",
            PerformanceRating::Poor => "poor",
            PerformanceRating::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PerformanceRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
