//! Mapping of abstract context needs onto Kiro context providers.

use crate::discovery::AgentMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ContextToken
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextToken {
    #[serde(rename = "#File")]
    File,
    #[serde(rename = "#Folder")]
    Folder,
    #[serde(rename = "#Codebase")]
    Codebase,
    #[serde(rename = "#Problems")]
    Problems,
    #[serde(rename = "#Terminal")]
    Terminal,
    #[serde(rename = "#Git Diff")]
    GitDiff,
    #[serde(rename = "#Spec")]
    Spec,
}

impl ContextToken {
    pub fn all() -> &'static [ContextToken] {
        &[
            ContextToken::File,
            ContextToken::Folder,
            ContextToken::Codebase,
            ContextToken::Problems,
            ContextToken::Terminal,
            ContextToken::GitDiff,
            ContextToken::Spec,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContextToken::File => "#File",
            ContextToken::Folder => "#Folder",
            ContextToken::Codebase => "#Codebase",
            ContextToken::Problems => "#Problems",
            ContextToken::Terminal => "#Terminal",
            ContextToken::GitDiff => "#Git Diff",
            ContextToken::Spec => "#Spec",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ContextToken::File => "the file currently open in the editor",
            ContextToken::Folder => "the contents of the selected folder",
            ContextToken::Codebase => "the indexed project structure and source",
            ContextToken::Problems => "current diagnostics, lint and build errors",
            ContextToken::Terminal => "recent terminal output, including test runs",
            ContextToken::GitDiff => "uncommitted changes in the working tree",
            ContextToken::Spec => "the active spec's requirements, design and tasks",
        }
    }

    fn fallback(self) -> (&'static str, FallbackPriority) {
        match self {
            ContextToken::File => (
                "Ask the user to paste the contents of the file they are working on.",
                FallbackPriority::High,
            ),
            ContextToken::Codebase => (
                "Ask for a directory listing and the key entry points before making structural recommendations.",
                FallbackPriority::High,
            ),
            ContextToken::Problems => (
                "Ask the user to run the build or linter and share the reported errors.",
                FallbackPriority::Medium,
            ),
            ContextToken::Terminal => (
                "Ask the user to run the test suite and paste the output.",
                FallbackPriority::Medium,
            ),
            ContextToken::GitDiff => (
                "Ask the user for the output of `git diff` or a summary of recent changes.",
                FallbackPriority::Medium,
            ),
            ContextToken::Folder => (
                "Ask which folder is relevant and request a listing of its files.",
                FallbackPriority::Low,
            ),
            ContextToken::Spec => (
                "Ask the user to share the requirements and acceptance criteria directly.",
                FallbackPriority::Low,
            ),
        }
    }
}

impl fmt::Display for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMapping {
    pub mapped: Vec<ContextToken>,
    pub unmapped: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackInstruction {
    pub missing: ContextToken,
    pub instruction: String,
    pub priority: FallbackPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackContext {
    pub can_proceed_without_context: bool,
    pub fallback_instructions: Vec<FallbackInstruction>,
}

// ---------------------------------------------------------------------------
// ContextInjector
// ---------------------------------------------------------------------------

const NEED_TABLE: &[(&str, ContextToken)] = &[
    ("current file", ContextToken::File),
    ("active file", ContextToken::File),
    ("open file", ContextToken::File),
    ("file", ContextToken::File),
    ("folder", ContextToken::Folder),
    ("directory", ContextToken::Folder),
    ("project structure", ContextToken::Codebase),
    ("codebase", ContextToken::Codebase),
    ("architecture", ContextToken::Codebase),
    ("build issues", ContextToken::Problems),
    ("errors", ContextToken::Problems),
    ("problems", ContextToken::Problems),
    ("diagnostics", ContextToken::Problems),
    ("recent changes", ContextToken::GitDiff),
    ("git changes", ContextToken::GitDiff),
    ("git diff", ContextToken::GitDiff),
    ("test results", ContextToken::Terminal),
    ("terminal output", ContextToken::Terminal),
    ("terminal", ContextToken::Terminal),
    ("requirements", ContextToken::Spec),
    ("spec", ContextToken::Spec),
    ("specs", ContextToken::Spec),
];

const ROLE_NEEDS: &[(&str, &[&str])] = &[
    (
        "dev",
        &["current file", "build issues", "test results", "recent changes"],
    ),
    (
        "qa",
        &["test results", "build issues", "current file", "recent changes"],
    ),
    ("architect", &["project structure", "folder", "requirements"]),
    ("pm", &["requirements", "project structure"]),
    ("po", &["requirements", "project structure"]),
    ("sm", &["requirements", "recent changes"]),
    ("analyst", &["project structure", "requirements"]),
    ("ux-expert", &["current file", "requirements"]),
];

const DEFAULT_NEEDS: &[&str] = &["current file", "project structure"];

pub const CONTEXT_SECTION_HEADING: &str = "## Context Awareness";

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextInjector;

impl ContextInjector {
    pub fn new() -> Self {
        Self
    }

    /// Map need phrases onto tokens. Lookup is case-insensitive, tokens are
    /// de-duplicated in first-seen order, and unknown phrases are returned
    /// unchanged in `unmapped`.
    pub fn map_context_needs<S: AsRef<str>>(&self, needs: &[S]) -> ContextMapping {
        let mut mapping = ContextMapping::default();
        for need in needs {
            let raw = need.as_ref();
            let key = raw.trim().to_lowercase();
            match lookup(&key) {
                Some(token) => {
                    if !mapping.mapped.contains(&token) {
                        mapping.mapped.push(token);
                    }
                }
                None => mapping.unmapped.push(raw.to_string()),
            }
        }
        mapping
    }

    /// Declared needs, else the role defaults for the agent id, else the
    /// generic defaults.
    pub fn context_needs_for(&self, agent: &AgentMetadata) -> Vec<String> {
        if !agent.context_needs.is_empty() {
            return agent.context_needs.clone();
        }
        let role = agent_role(&agent.id);
        ROLE_NEEDS
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, needs)| *needs)
            .unwrap_or(DEFAULT_NEEDS)
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn tokens_for(&self, agent: &AgentMetadata) -> ContextMapping {
        self.map_context_needs(&self.context_needs_for(agent))
    }

    /// One prompt line per token, in token order.
    pub fn context_prompts(&self, tokens: &[ContextToken]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| format!("Use {} for {}.", t.as_str(), t.describe()))
            .collect()
    }

    /// Append a context-awareness section to `content`. Content that already
    /// carries one is returned unchanged.
    pub fn inject(&self, content: &str, tokens: &[ContextToken]) -> String {
        if tokens.is_empty() || content.contains(CONTEXT_SECTION_HEADING) {
            return content.to_string();
        }
        let mut out = String::with_capacity(content.len() + 256);
        out.push_str(content.trim_end());
        out.push_str("\n\n");
        out.push_str(CONTEXT_SECTION_HEADING);
        out.push_str("\n\nBefore acting, pull in the relevant Kiro context:\n\n");
        for prompt in self.context_prompts(tokens) {
            out.push_str("- ");
            out.push_str(&prompt);
            out.push('\n');
        }
        out.push_str(
            "\nIf a provider is unavailable, say so and ask the user for the equivalent information.\n",
        );
        out
    }

    /// Substitute instructions for providers that are offline. The agent can
    /// proceed unless a high-priority provider is among them.
    pub fn provide_fallback_context(&self, missing: &[ContextToken]) -> FallbackContext {
        let fallback_instructions: Vec<FallbackInstruction> = missing
            .iter()
            .map(|&token| {
                let (instruction, priority) = token.fallback();
                FallbackInstruction {
                    missing: token,
                    instruction: instruction.to_string(),
                    priority,
                }
            })
            .collect();
        let can_proceed_without_context = fallback_instructions
            .iter()
            .all(|f| f.priority != FallbackPriority::High);
        FallbackContext {
            can_proceed_without_context,
            fallback_instructions,
        }
    }
}

fn lookup(key: &str) -> Option<ContextToken> {
    if let Some(token) = ContextToken::all().iter().find(|t| t.as_str().eq_ignore_ascii_case(key)) {
        return Some(*token);
    }
    NEED_TABLE
        .iter()
        .find(|(phrase, _)| *phrase == key)
        .map(|(_, token)| *token)
}

/// Role part of an agent id: expansion-pack agents are often prefixed
/// (`game-dev`), so the last segment is tried when the full id is unknown.
fn agent_role(id: &str) -> &str {
    if ROLE_NEEDS.iter().any(|(r, _)| *r == id) {
        return id;
    }
    id.rsplit('-').next().unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::AgentDependencies;
    use crate::types::AgentSource;
    use std::path::PathBuf;

    fn agent(id: &str, needs: &[&str]) -> AgentMetadata {
        AgentMetadata {
            id: id.into(),
            name: id.into(),
            title: None,
            icon: None,
            description: String::new(),
            source: AgentSource::Core,
            path: PathBuf::from("x.md"),
            last_modified: chrono::Utc::now(),
            dependencies: AgentDependencies::default(),
            context_needs: needs.iter().map(|s| s.to_string()).collect(),
            front_matter: Default::default(),
            content: String::new(),
        }
    }

    #[test]
    fn maps_known_needs_and_keeps_unknown() {
        let injector = ContextInjector::new();
        let m = injector.map_context_needs(&[
            "Current File",
            "project structure",
            "build issues",
            "recent changes",
            "test results",
            "mood of the team",
        ]);
        assert_eq!(
            m.mapped,
            vec![
                ContextToken::File,
                ContextToken::Codebase,
                ContextToken::Problems,
                ContextToken::GitDiff,
                ContextToken::Terminal
            ]
        );
        assert_eq!(m.unmapped, vec!["mood of the team"]);
    }

    #[test]
    fn tokens_deduplicated_and_literal_tokens_accepted() {
        let m = ContextInjector::new().map_context_needs(&["#File", "current file", "#git diff"]);
        assert_eq!(m.mapped, vec![ContextToken::File, ContextToken::GitDiff]);
        assert!(m.unmapped.is_empty());
    }

    #[test]
    fn role_defaults_and_declared_needs() {
        let injector = ContextInjector::new();
        let dev = injector.tokens_for(&agent("dev", &[]));
        assert!(dev.mapped.contains(&ContextToken::Terminal));

        let game_dev = injector.tokens_for(&agent("game-dev", &[]));
        assert_eq!(game_dev.mapped, dev.mapped);

        let custom = injector.tokens_for(&agent("dev", &["spec"]));
        assert_eq!(custom.mapped, vec![ContextToken::Spec]);

        let unknown = injector.tokens_for(&agent("oracle", &[]));
        assert_eq!(
            unknown.mapped,
            vec![ContextToken::File, ContextToken::Codebase]
        );
    }

    #[test]
    fn inject_appends_section_once() {
        let injector = ContextInjector::new();
        let once = injector.inject("# Dev\n", &[ContextToken::File]);
        assert!(once.contains(CONTEXT_SECTION_HEADING));
        assert!(once.contains("#File"));
        let twice = injector.inject(&once, &[ContextToken::File]);
        assert_eq!(once, twice);
        assert_eq!(injector.inject("# Dev", &[]), "# Dev");
    }

    #[test]
    fn fallback_blocks_on_high_priority_only() {
        let injector = ContextInjector::new();
        let soft = injector.provide_fallback_context(&[ContextToken::Terminal, ContextToken::Spec]);
        assert!(soft.can_proceed_without_context);
        assert_eq!(soft.fallback_instructions.len(), 2);
        assert_eq!(soft.fallback_instructions[0].priority, FallbackPriority::Medium);

        let hard = injector.provide_fallback_context(&[ContextToken::File]);
        assert!(!hard.can_proceed_without_context);
        assert!(hard.fallback_instructions[0].instruction.contains("paste"));

        assert!(injector.provide_fallback_context(&[]).can_proceed_without_context);
    }

    #[test]
    fn token_serializes_as_kiro_reference() {
        assert_eq!(
            serde_json::to_string(&ContextToken::GitDiff).unwrap(),
            "\"#Git Diff\""
        );
    }
}
