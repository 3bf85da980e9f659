use crate::discovery::AgentMetadata;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Workflow (input)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub phases: Vec<WorkflowPhase>,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<WorkflowTransition>,
    #[serde(default)]
    pub automations: Vec<Automation>,
}

impl Workflow {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn phase(&self, name: &str) -> Option<&WorkflowPhase> {
        self.phases.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowPhase {
    pub name: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Files whose edits belong to this phase.
    #[serde(default)]
    pub file_patterns: Vec<String>,
    /// Artifacts this phase produces.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl WorkflowPhase {
    fn watch_patterns(&self) -> &[String] {
        if self.file_patterns.is_empty() {
            &self.outputs
        } else {
            &self.file_patterns
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTransition {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationTrigger {
    FileSaved,
    FileCreated,
    FileDeleted,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationAction {
    Notify,
    AskAgent,
    RunCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub name: String,
    pub trigger: AutomationTrigger,
    #[serde(default)]
    pub patterns: Vec<String>,
    pub action: AutomationAction,
    #[serde(default)]
    pub agent: Option<String>,
    /// Prompt, notification text or shell command, depending on `action`.
    pub message: String,
}

// ---------------------------------------------------------------------------
// HookDescriptor (Kiro `.kiro.hook` schema)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    FileEdited,
    FileCreated,
    FileDeleted,
    UserTriggered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookTrigger {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    AskAgent,
    RunCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl HookAction {
    pub fn ask(prompt: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::AskAgent,
            prompt: Some(prompt.into()),
            command: None,
        }
    }

    pub fn run(command: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::RunCommand,
            prompt: None,
            command: Some(command.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookDescriptor {
    pub enabled: bool,
    pub name: String,
    pub description: String,
    pub version: String,
    pub when: HookTrigger,
    pub then: HookAction,
}

impl HookDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        when: HookTrigger,
        then: HookAction,
    ) -> Self {
        Self {
            enabled: true,
            name: name.into(),
            description: description.into(),
            version: "1".to_string(),
            when,
            then,
        }
    }

    pub fn file_name(&self) -> String {
        paths::hook_file_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedHook {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookSet {
    pub hooks: Vec<HookDescriptor>,
    pub skipped: Vec<SkippedHook>,
}

// ---------------------------------------------------------------------------
// HookGenerator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct HookGenerator;

impl HookGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Build every hook the workflow's shape supports. Phases, transitions
    /// and automations that cannot become a hook are listed in `skipped`.
    pub fn generate(&self, workflow: &Workflow) -> HookSet {
        let mut set = HookSet::default();
        let wf = workflow.display_name();

        for phase in &workflow.phases {
            let source = format!("phase:{}", phase.name);
            let Some(agent) = phase.agent.as_deref().filter(|a| !a.is_empty()) else {
                set.skip(source, "phase has no agent");
                continue;
            };
            let patterns = phase.watch_patterns();
            if patterns.is_empty() {
                set.skip(source, "phase has no file patterns or outputs");
                continue;
            }
            if !workflow.agents.is_empty() && !workflow.agents.iter().any(|a| a == agent) {
                warn!(workflow = %workflow.id, phase = %phase.name, agent, "phase agent not listed in workflow agents");
            }

            let mut prompt = format!(
                "As the {agent} agent in the '{}' phase of {wf}, review the saved file and keep it consistent with the phase goals.",
                phase.name
            );
            if !phase.description.is_empty() {
                prompt.push_str(&format!(" Phase goal: {}", phase.description));
            }
            set.hooks.push(HookDescriptor::new(
                format!("{} {} on save", workflow.id, phase.name),
                format!("Run the {agent} agent when {} phase files are saved", phase.name),
                HookTrigger {
                    kind: TriggerKind::FileEdited,
                    patterns: patterns.to_vec(),
                },
                HookAction::ask(prompt),
            ));
        }

        for t in &workflow.transitions {
            let source = format!("transition:{}->{}", t.from, t.to);
            let (Some(from), Some(to)) = (workflow.phase(&t.from), workflow.phase(&t.to)) else {
                set.skip(source, "transition references an unknown phase");
                continue;
            };

            let next = to.agent.as_deref().unwrap_or("next");
            let mut prompt = format!(
                "The '{}' phase of {wf} has produced its output. Hand off to the {next} agent to begin the '{}' phase.",
                from.name, to.name
            );
            if let Some(cond) = t.condition.as_deref().filter(|c| !c.is_empty()) {
                prompt.push_str(&format!(" Only proceed if: {cond}"));
            }
            // No outputs to watch: the user advances the phase by hand.
            let when = if from.outputs.is_empty() {
                HookTrigger {
                    kind: TriggerKind::UserTriggered,
                    patterns: Vec::new(),
                }
            } else {
                HookTrigger {
                    kind: TriggerKind::FileCreated,
                    patterns: from.outputs.clone(),
                }
            };
            set.hooks.push(HookDescriptor::new(
                format!("{} {} to {}", workflow.id, from.name, to.name),
                format!("Advance {wf} from {} to {}", from.name, to.name),
                when,
                HookAction::ask(prompt),
            ));
        }

        for a in &workflow.automations {
            let source = format!("automation:{}", a.name);
            let kind = match a.trigger {
                AutomationTrigger::FileSaved => TriggerKind::FileEdited,
                AutomationTrigger::FileCreated => TriggerKind::FileCreated,
                AutomationTrigger::FileDeleted => TriggerKind::FileDeleted,
                AutomationTrigger::Manual => TriggerKind::UserTriggered,
            };
            if kind != TriggerKind::UserTriggered && a.patterns.is_empty() {
                set.skip(source, "file trigger without patterns");
                continue;
            }
            if a.message.trim().is_empty() {
                set.skip(source, "automation has no message");
                continue;
            }
            let then = match a.action {
                AutomationAction::Notify => {
                    HookAction::ask(format!("Notify the user: {}", a.message))
                }
                AutomationAction::AskAgent => match a.agent.as_deref() {
                    Some(agent) => HookAction::ask(format!("As the {agent} agent: {}", a.message)),
                    None => HookAction::ask(a.message.clone()),
                },
                AutomationAction::RunCommand => HookAction::run(a.message.clone()),
            };
            set.hooks.push(HookDescriptor::new(
                format!("{} {}", workflow.id, a.name),
                format!("{wf} automation: {}", a.name),
                HookTrigger {
                    kind,
                    patterns: a.patterns.clone(),
                },
                then,
            ));
        }

        set
    }

    /// Generate and write one `.kiro.hook` file per hook into `output_dir`.
    /// Returns false when anything could not be written; never panics on an
    /// odd workflow shape.
    pub fn generate_hooks_from_workflow(&self, workflow: &Workflow, output_dir: &Path) -> bool {
        let set = self.generate(workflow);
        for s in &set.skipped {
            info!(workflow = %workflow.id, source = %s.source, reason = %s.reason, "hook skipped");
        }
        match write_hooks(&set.hooks, output_dir) {
            Ok(paths) => {
                info!(workflow = %workflow.id, count = paths.len(), "hooks written");
                true
            }
            Err(e) => {
                warn!(workflow = %workflow.id, error = %e, "failed to write hooks");
                false
            }
        }
    }
}

impl HookSet {
    fn skip(&mut self, source: String, reason: &str) {
        self.skipped.push(SkippedHook {
            source,
            reason: reason.to_string(),
        });
    }
}

/// Write hooks as pretty JSON. Colliding file names get a numeric suffix.
pub fn write_hooks(hooks: &[HookDescriptor], output_dir: &Path) -> crate::Result<Vec<PathBuf>> {
    crate::io::ensure_dir(output_dir)?;
    let mut used = HashSet::new();
    let mut written = Vec::with_capacity(hooks.len());
    for hook in hooks {
        let base = paths::slugify(&hook.name);
        let mut stem = base.clone();
        let mut n = 2;
        while !used.insert(stem.clone()) {
            stem = format!("{base}-{n}");
            n += 1;
        }
        let path = output_dir.join(format!("{stem}.{}", paths::HOOK_EXTENSION));
        crate::io::write_json(&path, hook)?;
        written.push(path);
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Per-agent hooks
// ---------------------------------------------------------------------------

/// Hooks attached to a single agent: role defaults for `dev`, `qa` and `sm`
/// (matching a `<pack>-<role>` suffix too), or a review-on-save hook over the
/// patterns listed under `hooks:` in the front-matter.
pub fn agent_hooks(agent: &AgentMetadata) -> Vec<HookDescriptor> {
    let declared = crate::frontmatter::string_list(&agent.front_matter, "hooks").unwrap_or_default();
    if !declared.is_empty() {
        return vec![HookDescriptor::new(
            format!("{} on save", agent.id),
            format!("Ask {} to review matching files on save", agent.name),
            HookTrigger {
                kind: TriggerKind::FileEdited,
                patterns: declared,
            },
            HookAction::ask(format!(
                "As {} ({}), review the saved file and report anything that needs attention.",
                agent.name, agent.id
            )),
        )];
    }

    let role = agent.id.rsplit('-').next().unwrap_or(&agent.id);
    let (suffix, patterns, prompt): (&str, &[&str], String) = match role {
        "dev" => (
            "code review on save",
            &["src/**/*", "lib/**/*"],
            format!(
                "As {} (dev), review the saved changes against the current story's acceptance criteria and flag regressions.",
                agent.name
            ),
        ),
        "qa" => (
            "test review on save",
            &["**/*.test.*", "**/*_test.*", "tests/**/*"],
            format!(
                "As {} (qa), check that the saved tests cover the story's acceptance criteria and suggest missing cases.",
                agent.name
            ),
        ),
        "sm" => (
            "story progression",
            &["docs/stories/**/*.md"],
            format!(
                "As {} (sm), check the saved story's status. When it is Done, draft the next story.",
                agent.name
            ),
        ),
        _ => return Vec::new(),
    };

    vec![HookDescriptor::new(
        format!("{} {suffix}", agent.id),
        format!("{} {suffix}", agent.name),
        HookTrigger {
            kind: TriggerKind::FileEdited,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        },
        HookAction::ask(prompt),
    )]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
