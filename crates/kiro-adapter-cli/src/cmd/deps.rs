use super::{display_path, load_config, runtime};
use crate::output::print_json;
use anyhow::Context;
use kiro_adapter_core::{
    dependency::DependencyResolver, discovery::AgentDiscovery, types::DependencyCategory,
};
use std::path::Path;

pub fn run(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let rt = runtime()?;
    let agents = rt.block_on(AgentDiscovery::new().scan_all_agents(root, &config.discovery))?;
    let agent = agents
        .iter()
        .find(|a| a.id == id)
        .with_context(|| format!("agent '{id}' not found"))?;

    let resolver = DependencyResolver::from_config(
        root,
        &config.dependencies,
        &config.discovery.expansion_packs_dir,
    );
    let resolved = rt.block_on(resolver.resolve(agent));

    if json {
        return print_json(&resolved);
    }

    println!("{} ({})", agent.id, agent.source);
    for &category in DependencyCategory::all() {
        let found = resolved.get(category);
        if found.is_empty() {
            continue;
        }
        println!("  {category}:");
        for r in found {
            println!("    {}  {}", r.name, display_path(root, &r.path));
        }
    }
    if !resolved.missing.is_empty() {
        println!("  missing:");
        for m in &resolved.missing {
            println!("    {}/{}", m.category, m.name);
        }
    }
    for e in &resolved.errors {
        println!("  [error] {}/{}: {}", e.category, e.name, e.reason);
    }
    println!(
        "\n{} resolved, {} missing",
        resolved.resolved_count(),
        resolved.missing.len()
    );
    Ok(())
}
