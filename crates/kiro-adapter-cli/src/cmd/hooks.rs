use super::{display_path, load_config};
use crate::output::print_json;
use anyhow::Context;
use kiro_adapter_core::hooks::{write_hooks, HookGenerator, Workflow};
use std::path::Path;

pub fn run(root: &Path, workflow: &Path, out: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(workflow)
        .with_context(|| format!("failed to read {}", workflow.display()))?;
    let workflow: Workflow = serde_yaml::from_str(&data)
        .with_context(|| format!("invalid workflow {}", workflow.display()))?;

    let out_dir = match out {
        Some(dir) => dir.to_path_buf(),
        None => load_config(root)?.output.anchored(root).hooks_dir,
    };

    let set = HookGenerator::new().generate(&workflow);
    let written = write_hooks(&set.hooks, &out_dir)
        .with_context(|| format!("failed to write hooks to {}", out_dir.display()))?;

    if json {
        return print_json(&serde_json::json!({
            "workflow": workflow.id,
            "written": written,
            "skipped": set.skipped,
        }));
    }

    println!("Workflow: {}", workflow.display_name());
    for p in &written {
        println!("  created: {}", display_path(root, p));
    }
    for s in &set.skipped {
        println!("  skipped: {} ({})", s.source, s.reason);
    }
    Ok(())
}
