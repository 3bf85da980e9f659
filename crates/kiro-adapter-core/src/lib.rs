//! Agent conversion and activation pipeline.
//!
//! Discovers BMAD agent definitions on disk, resolves their task/template/
//! checklist/data dependencies, converts them into Kiro agents with steering
//! rules and hooks, registers them and manages live activations while an
//! [`monitor::ActivationMonitor`] keeps telemetry on every attempt.
//!
//! ```text
//! AgentDiscovery ─▶ DependencyResolver ─▶ AgentTransformer ─▶ AgentRegistry
//!                                            │    ▲                 │
//!                              ContextInjector┘    └HookGenerator    ▼
//!                                                         ActivationManager
//!                                                                   │
//!                                         ActivationMonitor ◀───────┘ (observers)
//! ```

pub mod activation;
pub mod config;
pub mod context;
pub mod dependency;
pub mod discovery;
pub mod error;
pub mod frontmatter;
pub mod hooks;
pub mod io;
pub mod monitor;
pub mod paths;
pub mod pipeline;
pub mod registry;
pub mod steering;
pub mod transform;
pub mod types;

pub use error::{AdapterError, Result};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::OutputConfig;
    use crate::dependency::ResolvedDependencies;
    use crate::discovery::{AgentDependencies, AgentMetadata};
    use crate::transform::{AgentTransformer, ConvertedAgent};
    use crate::types::AgentSource;
    use std::path::PathBuf;

    pub fn metadata(id: &str, source: AgentSource) -> AgentMetadata {
        let name = match id {
            "dev" => "James",
            "qa" => "Quinn",
            "pm" => "John",
            other => other,
        };
        AgentMetadata {
            id: id.to_string(),
            name: name.to_string(),
            title: None,
            icon: None,
            description: format!("Use for {id} work"),
            source,
            path: PathBuf::from(format!(".bmad-core/agents/{id}.md")),
            last_modified: chrono::Utc::now(),
            dependencies: AgentDependencies::default(),
            context_needs: Vec::new(),
            front_matter: serde_yaml::Mapping::new(),
            content: format!("# {name}\n\nYou are the {id} agent.\n"),
        }
    }

    pub fn converted(agent: AgentMetadata, output: &OutputConfig) -> ConvertedAgent {
        AgentTransformer::new(output.clone())
            .transform(&agent, &ResolvedDependencies::default())
            .expect("test agent converts")
            .agent
    }
}
