//! Kiro steering files: project-wide defaults plus one file per converted
//! agent (and per expansion pack).

use crate::config::OutputConfig;
use crate::discovery::AgentMetadata;
use crate::error::Result;
use crate::io;
use crate::transform::ConvertedAgent;
use crate::types::DependencyCategory;
use std::path::{Path, PathBuf};
use tracing::debug;

const PRODUCT: &str = "\
---
inclusion: always
---

# Product

Describe what this project builds, who it is for and the problems it solves.
Agents read this before planning or writing stories.
";

const TECH: &str = "\
---
inclusion: always
---

# Technology

List the languages, frameworks, build tools and test commands in use.
Agents follow these choices instead of introducing new ones.
";

const STRUCTURE: &str = "\
---
inclusion: always
---

# Structure

Outline the repository layout: where source, tests, docs and stories live.
";

/// Global steering files created once per project and never overwritten.
pub const DEFAULT_STEERING: &[(&str, &str)] = &[
    ("product.md", PRODUCT),
    ("tech.md", TECH),
    ("structure.md", STRUCTURE),
];

/// Per-agent and per-pack files carry a prefix so they can never land on a
/// default file or on each other.
pub fn agent_steering_path(steering_dir: &Path, agent_id: &str) -> PathBuf {
    steering_dir.join(format!("agent-{agent_id}.md"))
}

pub fn pack_steering_path(steering_dir: &Path, pack: &str) -> PathBuf {
    steering_dir.join(format!("pack-{pack}.md"))
}

/// Defaults followed by the agent's own steering file.
pub fn default_steering_rules(agent: &AgentMetadata, output: &OutputConfig) -> Vec<PathBuf> {
    let mut rules: Vec<PathBuf> = DEFAULT_STEERING
        .iter()
        .map(|(name, _)| output.steering_dir.join(name))
        .collect();
    rules.push(agent_steering_path(&output.steering_dir, &agent.id));
    rules
}

pub fn render_agent_steering(agent: &ConvertedAgent) -> String {
    let mut out = format!(
        "---\ninclusion: manual\n---\n\n# {} ({})\n\n{}\n",
        agent.name, agent.id, agent.description
    );

    if !agent.integration.context_prompts.is_empty() {
        out.push_str("\n## Context\n\n");
        for prompt in &agent.integration.context_prompts {
            out.push_str(&format!("- {prompt}\n"));
        }
    }

    let mut any = false;
    for &category in DependencyCategory::all() {
        let resources = agent.dependencies.get(category);
        if resources.is_empty() {
            continue;
        }
        if !any {
            out.push_str("\n## Resources\n");
            any = true;
        }
        out.push_str(&format!("\n### {category}\n\n"));
        for r in resources {
            out.push_str(&format!("- `{}`\n", r.path.display()));
        }
    }

    if !agent.dependencies.missing.is_empty() {
        out.push_str("\n## Unavailable\n\n");
        for m in &agent.dependencies.missing {
            out.push_str(&format!("- {} `{}`\n", m.category, m.name));
        }
    }
    out
}

fn render_pack_steering(pack: &str) -> String {
    format!(
        "---\ninclusion: manual\n---\n\n# {pack} expansion pack\n\n\
         Agents from the `{pack}` expansion pack share these conventions. \
         Add pack-specific terminology and workflow notes here.\n"
    )
}

/// Write every steering file a converted agent references. Defaults and
/// pack files are only created when missing; the agent file is rewritten.
pub fn write_steering(agent: &ConvertedAgent, output: &OutputConfig) -> Result<Vec<PathBuf>> {
    io::ensure_dir(&output.steering_dir)?;
    let mut written = Vec::new();
    let agent_path = agent_steering_path(&output.steering_dir, &agent.id);
    let pack_path = agent
        .source
        .pack()
        .map(|p| (p, pack_steering_path(&output.steering_dir, p)));

    for rule in &agent.integration.steering_rules {
        if *rule == agent_path {
            io::atomic_write(rule, render_agent_steering(agent).as_bytes())?;
            written.push(rule.clone());
            continue;
        }
        if let Some((pack, path)) = &pack_path {
            if rule == path {
                if io::write_if_missing(rule, render_pack_steering(pack).as_bytes())? {
                    written.push(rule.clone());
                }
                continue;
            }
        }
        let default = rule
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| DEFAULT_STEERING.iter().find(|(f, _)| *f == n));
        match default {
            Some((_, content)) => {
                if io::write_if_missing(rule, content.as_bytes())? {
                    written.push(rule.clone());
                }
            }
            None => debug!(agent = %agent.id, rule = %rule.display(), "steering rule has no generator"),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{MissingDependency, ResolvedDependencies, ResolvedResource};
    use crate::test_support::{converted, metadata};
    use crate::types::AgentSource;
    use tempfile::TempDir;

    #[test]
    fn writes_defaults_once_and_agent_file_every_time() {
        let dir = TempDir::new().unwrap();
        let output = OutputConfig::default().anchored(dir.path());
        let agent = converted(metadata("dev", AgentSource::Core), &output);

        let first = write_steering(&agent, &output).unwrap();
        assert_eq!(first.len(), 4);

        std::fs::write(output.steering_dir.join("tech.md"), "customised").unwrap();
        let second = write_steering(&agent, &output).unwrap();
        assert_eq!(second, vec![agent_steering_path(&output.steering_dir, "dev")]);
        assert_eq!(
            std::fs::read_to_string(output.steering_dir.join("tech.md")).unwrap(),
            "customised"
        );
    }

    #[test]
    fn agent_steering_lists_resources_and_gaps() {
        let dir = TempDir::new().unwrap();
        let output = OutputConfig::default().anchored(dir.path());
        let mut agent = converted(metadata("dev", AgentSource::Core), &output);
        agent.dependencies = ResolvedDependencies {
            tasks: vec![ResolvedResource {
                name: "develop-story.md".into(),
                path: PathBuf::from(".bmad-core/tasks/develop-story.md"),
                content: String::new(),
                last_modified: chrono::Utc::now(),
            }],
            missing: vec![MissingDependency {
                category: DependencyCategory::Checklists,
                name: "story-dod.md".into(),
            }],
            ..Default::default()
        };

        let text = render_agent_steering(&agent);
        assert!(text.starts_with("---\ninclusion: manual\n---"));
        assert!(text.contains("### tasks\n\n- `.bmad-core/tasks/develop-story.md`"));
        assert!(text.contains("## Unavailable\n\n- checklists `story-dod.md`"));
    }

    #[test]
    fn pack_agents_get_a_pack_file() {
        let dir = TempDir::new().unwrap();
        let output = OutputConfig::default().anchored(dir.path());
        let agent = converted(
            metadata(
                "game-dev",
                AgentSource::ExpansionPack {
                    pack: "bmad-2d-phaser".into(),
                },
            ),
            &output,
        );

        write_steering(&agent, &output).unwrap();
        let pack = std::fs::read_to_string(output.steering_dir.join("pack-bmad-2d-phaser.md")).unwrap();
        assert!(pack.contains("# bmad-2d-phaser expansion pack"));
    }

    #[test]
    fn agent_named_like_a_default_keeps_the_default() {
        let dir = TempDir::new().unwrap();
        let output = OutputConfig::default().anchored(dir.path());
        let product = converted(metadata("product", AgentSource::Core), &output);
        let same_name_pack = converted(
            metadata(
                "designer",
                AgentSource::ExpansionPack {
                    pack: "product".into(),
                },
            ),
            &output,
        );

        write_steering(&product, &output).unwrap();
        write_steering(&same_name_pack, &output).unwrap();

        let default = std::fs::read_to_string(output.steering_dir.join("product.md")).unwrap();
        assert!(default.starts_with("---\ninclusion: always"));
        let agent = std::fs::read_to_string(output.steering_dir.join("agent-product.md")).unwrap();
        assert!(agent.contains("# product (product)"));
        let pack = std::fs::read_to_string(output.steering_dir.join("pack-product.md")).unwrap();
        assert!(pack.contains("# product expansion pack"));
    }
}
