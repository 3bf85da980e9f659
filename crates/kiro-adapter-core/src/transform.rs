//! Conversion of discovered agents into Kiro agents.
//!
//! An [`AgentTransformer`] runs every applicable [`TransformationRule`] in
//! descending priority. Each rule returns a partial agent; the first rule to
//! set a field owns it, so a high-priority rule overrides the defaults laid
//! down by [`KiroAgentRule`] at priority 0.
//!
//! A failing (or panicking) rule is recorded and skipped. Only structural
//! validation of the assembled result fails the conversion.

use crate::config::OutputConfig;
use crate::context::{ContextInjector, ContextToken};
use crate::dependency::ResolvedDependencies;
use crate::discovery::AgentMetadata;
use crate::error::{AdapterError, Result};
use crate::hooks;
use crate::paths;
use crate::steering;
use crate::types::{AgentSource, DependencyCategory};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_HANDLER: &str = "kiro-default";
pub const EXPANSION_PACK_HANDLER: &str = "expansion-pack";

// ---------------------------------------------------------------------------
// ConvertedAgent
// ---------------------------------------------------------------------------

/// Kiro-side artifacts an agent is wired to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationBundle {
    pub steering_rules: Vec<PathBuf>,
    pub hooks: Vec<PathBuf>,
    pub context_prompts: Vec<String>,
    pub spec_templates: Vec<String>,
    pub activation_handler: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedAgent {
    pub id: String,
    pub name: String,
    pub description: String,
    pub source: AgentSource,
    pub original_path: PathBuf,
    pub output_path: PathBuf,
    pub content: String,
    pub integration: IntegrationBundle,
    pub dependencies: ResolvedDependencies,
    pub metadata: AgentMetadata,
}

impl ConvertedAgent {
    /// Structural checks every registered agent must pass.
    pub fn validate(&self) -> Result<()> {
        paths::validate_agent_id(&self.id)?;
        if self.name.trim().is_empty() {
            return Err(AdapterError::Validation(format!("agent '{}' has no name", self.id)));
        }
        if self.content.trim().is_empty() {
            return Err(AdapterError::Validation(format!(
                "agent '{}' has empty content",
                self.id
            )));
        }
        if self.output_path.file_name().is_none() {
            return Err(AdapterError::Validation(format!(
                "agent '{}' has no output file name: {}",
                self.id,
                self.output_path.display()
            )));
        }
        Ok(())
    }
}

/// Fields a rule chooses to set. `None` leaves the field to lower-priority
/// rules.
#[derive(Debug, Clone, Default)]
pub struct PartialConvertedAgent {
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub output_path: Option<PathBuf>,
    pub steering_rules: Option<Vec<PathBuf>>,
    pub hooks: Option<Vec<PathBuf>>,
    pub context_prompts: Option<Vec<String>>,
    pub spec_templates: Option<Vec<String>>,
    pub activation_handler: Option<String>,
}

impl PartialConvertedAgent {
    fn fill_from(&mut self, lower: PartialConvertedAgent) {
        fn keep<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        keep(&mut self.name, lower.name);
        keep(&mut self.description, lower.description);
        keep(&mut self.content, lower.content);
        keep(&mut self.output_path, lower.output_path);
        keep(&mut self.steering_rules, lower.steering_rules);
        keep(&mut self.hooks, lower.hooks);
        keep(&mut self.context_prompts, lower.context_prompts);
        keep(&mut self.spec_templates, lower.spec_templates);
        keep(&mut self.activation_handler, lower.activation_handler);
    }

    fn finish(
        self,
        agent: &AgentMetadata,
        dependencies: ResolvedDependencies,
        output: &OutputConfig,
    ) -> ConvertedAgent {
        ConvertedAgent {
            id: agent.id.clone(),
            name: self.name.unwrap_or_else(|| agent.name.clone()),
            description: self.description.unwrap_or_else(|| agent.description.clone()),
            source: agent.source.clone(),
            original_path: agent.path.clone(),
            output_path: self
                .output_path
                .unwrap_or_else(|| output.agents_dir.join(format!("{}.md", agent.id))),
            content: self.content.unwrap_or_else(|| agent.content.clone()),
            integration: IntegrationBundle {
                steering_rules: self.steering_rules.unwrap_or_default(),
                hooks: self.hooks.unwrap_or_default(),
                context_prompts: self.context_prompts.unwrap_or_default(),
                spec_templates: self.spec_templates.unwrap_or_default(),
                activation_handler: self.activation_handler.unwrap_or_default(),
            },
            dependencies,
            metadata: agent.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

pub struct TransformContext<'a> {
    pub dependencies: &'a ResolvedDependencies,
    pub injector: &'a ContextInjector,
    pub output: &'a OutputConfig,
}

pub trait TransformationRule: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first and wins conflicting fields.
    fn priority(&self) -> i32 {
        0
    }

    fn applies_to(&self, agent: &AgentMetadata) -> bool;

    fn transform(
        &self,
        agent: &AgentMetadata,
        ctx: &TransformContext<'_>,
    ) -> anyhow::Result<PartialConvertedAgent>;
}

#[derive(Serialize)]
struct KiroFrontMatter<'a> {
    name: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    source: String,
}

fn render_kiro_content(
    agent: &AgentMetadata,
    tokens: &[ContextToken],
    injector: &ContextInjector,
) -> anyhow::Result<String> {
    let fm = serde_yaml::to_string(&KiroFrontMatter {
        name: &agent.name,
        description: &agent.description,
        title: agent.title.as_deref(),
        icon: agent.icon.as_deref(),
        source: agent.source.to_string(),
    })?;
    let body = injector.inject(&agent.content, tokens);
    Ok(format!("---\n{fm}---\n\n{}", body.trim_start()))
}

/// Baseline conversion applied to every agent.
pub struct KiroAgentRule;

impl TransformationRule for KiroAgentRule {
    fn name(&self) -> &str {
        "kiro-agent"
    }

    fn applies_to(&self, _agent: &AgentMetadata) -> bool {
        true
    }

    fn transform(
        &self,
        agent: &AgentMetadata,
        ctx: &TransformContext<'_>,
    ) -> anyhow::Result<PartialConvertedAgent> {
        let mapping = ctx.injector.tokens_for(agent);
        if !mapping.unmapped.is_empty() {
            debug!(agent = %agent.id, unmapped = ?mapping.unmapped, "context needs without a provider");
        }
        Ok(PartialConvertedAgent {
            name: Some(agent.name.clone()),
            description: Some(agent.description.clone()),
            content: Some(render_kiro_content(agent, &mapping.mapped, ctx.injector)?),
            output_path: Some(ctx.output.agents_dir.join(format!("{}.md", agent.id))),
            steering_rules: Some(steering::default_steering_rules(agent, ctx.output)),
            hooks: None,
            context_prompts: Some(ctx.injector.context_prompts(&mapping.mapped)),
            spec_templates: Some(
                ctx.dependencies
                    .get(DependencyCategory::Templates)
                    .iter()
                    .map(|r| r.name.clone())
                    .collect(),
            ),
            activation_handler: Some(DEFAULT_HANDLER.to_string()),
        })
    }
}

/// Wires role hooks (dev, qa, sm) and front-matter `hooks:` into the bundle.
pub struct WorkflowHookRule;

impl TransformationRule for WorkflowHookRule {
    fn name(&self) -> &str {
        "workflow-hooks"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn applies_to(&self, agent: &AgentMetadata) -> bool {
        !hooks::agent_hooks(agent).is_empty()
    }

    fn transform(
        &self,
        agent: &AgentMetadata,
        ctx: &TransformContext<'_>,
    ) -> anyhow::Result<PartialConvertedAgent> {
        let paths = hooks::agent_hooks(agent)
            .iter()
            .map(|h| ctx.output.hooks_dir.join(h.file_name()))
            .collect();
        Ok(PartialConvertedAgent {
            hooks: Some(paths),
            ..Default::default()
        })
    }
}

/// Namespaces expansion-pack agents under their pack.
pub struct ExpansionPackRule;

impl TransformationRule for ExpansionPackRule {
    fn name(&self) -> &str {
        "expansion-pack"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn applies_to(&self, agent: &AgentMetadata) -> bool {
        agent.source.is_expansion_pack()
    }

    fn transform(
        &self,
        agent: &AgentMetadata,
        ctx: &TransformContext<'_>,
    ) -> anyhow::Result<PartialConvertedAgent> {
        let pack = agent
            .source
            .pack()
            .ok_or_else(|| anyhow::anyhow!("agent has no expansion pack"))?;
        let mut steering_rules = steering::default_steering_rules(agent, ctx.output);
        steering_rules.push(steering::pack_steering_path(&ctx.output.steering_dir, pack));
        Ok(PartialConvertedAgent {
            output_path: Some(
                ctx.output
                    .agents_dir
                    .join(pack)
                    .join(format!("{}.md", agent.id)),
            ),
            steering_rules: Some(steering_rules),
            activation_handler: Some(EXPANSION_PACK_HANDLER.to_string()),
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------------------
// AgentTransformer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TransformOutcome {
    pub agent: ConvertedAgent,
    /// Rules that failed; their fields fell through to lower priorities.
    pub rule_errors: Vec<AdapterError>,
}

#[derive(Debug, Default)]
pub struct BatchTransformResult {
    pub converted: Vec<ConvertedAgent>,
    /// Agents that could not be converted at all.
    pub errors: Vec<AdapterError>,
    pub rule_errors: Vec<AdapterError>,
}

pub struct AgentTransformer {
    rules: Vec<Arc<dyn TransformationRule>>,
    injector: ContextInjector,
    output: OutputConfig,
}

impl AgentTransformer {
    /// Transformer with the built-in rules. `output` should already be
    /// anchored at the project root.
    pub fn new(output: OutputConfig) -> Self {
        Self::empty(output)
            .with_rule(Arc::new(KiroAgentRule))
            .with_rule(Arc::new(WorkflowHookRule))
            .with_rule(Arc::new(ExpansionPackRule))
    }

    pub fn empty(output: OutputConfig) -> Self {
        Self {
            rules: Vec::new(),
            injector: ContextInjector::new(),
            output,
        }
    }

    pub fn with_rule(mut self, rule: Arc<dyn TransformationRule>) -> Self {
        self.add_rule(rule);
        self
    }

    /// Insert keeping descending priority; equal priorities keep insertion
    /// order.
    pub fn add_rule(&mut self, rule: Arc<dyn TransformationRule>) {
        let at = self
            .rules
            .iter()
            .position(|r| r.priority() < rule.priority())
            .unwrap_or(self.rules.len());
        self.rules.insert(at, rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn output(&self) -> &OutputConfig {
        &self.output
    }

    pub fn transform(
        &self,
        agent: &AgentMetadata,
        dependencies: &ResolvedDependencies,
    ) -> Result<TransformOutcome> {
        let ctx = TransformContext {
            dependencies,
            injector: &self.injector,
            output: &self.output,
        };
        let mut merged = PartialConvertedAgent::default();
        let mut rule_errors = Vec::new();

        for rule in &self.rules {
            let fail = |phase: &str, reason: String| AdapterError::Transformation {
                agent_id: agent.id.clone(),
                rule: rule.name().to_string(),
                phase: phase.to_string(),
                reason,
            };
            match guarded(|| Ok(rule.applies_to(agent))) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(reason) => {
                    rule_errors.push(fail("applies_to", reason));
                    continue;
                }
            }
            match guarded(|| rule.transform(agent, &ctx)) {
                Ok(partial) => merged.fill_from(partial),
                Err(reason) => rule_errors.push(fail("transform", reason)),
            }
        }

        for e in &rule_errors {
            warn!(agent = %agent.id, error = %e, "transformation rule failed");
        }

        let converted = merged.finish(agent, dependencies.clone(), &self.output);
        converted.validate()?;
        Ok(TransformOutcome {
            agent: converted,
            rule_errors,
        })
    }

    /// Transform each agent independently, keeping input order.
    pub fn batch_transform(
        &self,
        items: &[(AgentMetadata, ResolvedDependencies)],
    ) -> BatchTransformResult {
        let mut result = BatchTransformResult::default();
        for (agent, deps) in items {
            match self.transform(agent, deps) {
                Ok(outcome) => {
                    result.converted.push(outcome.agent);
                    result.rule_errors.extend(outcome.rule_errors);
                }
                Err(e) => {
                    warn!(agent = %agent.id, error = %e, "agent conversion failed");
                    result.errors.push(e);
                }
            }
        }
        result
    }
}

/// Run a rule callback, turning both errors and panics into a reason string.
fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> std::result::Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "rule panicked".to_string())),
    }
}
