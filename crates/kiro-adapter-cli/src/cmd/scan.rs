use super::{display_path, load_config, runtime};
use crate::output::{print_json, print_table};
use kiro_adapter_core::discovery::{AgentDiscovery, DiscoveryStats};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct AgentRow {
    id: String,
    name: String,
    source: String,
    dependencies: usize,
    path: String,
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let agents = runtime()?.block_on(AgentDiscovery::new().scan_all_agents(root, &config.discovery))?;
    let stats = DiscoveryStats::from_agents(&agents);

    let rows: Vec<AgentRow> = agents
        .iter()
        .map(|a| AgentRow {
            id: a.id.clone(),
            name: a.name.clone(),
            source: a.source.to_string(),
            dependencies: a.dependencies.total(),
            path: display_path(root, &a.path),
        })
        .collect();

    if json {
        return print_json(&serde_json::json!({ "agents": rows, "stats": stats }));
    }
    if rows.is_empty() {
        println!("No agents found.");
        return Ok(());
    }
    print_table(
        &["ID", "NAME", "SOURCE", "DEPS", "PATH"],
        rows.into_iter()
            .map(|r| vec![r.id, r.name, r.source, r.dependencies.to_string(), r.path])
            .collect(),
    );
    println!(
        "\n{} agents ({} core, {} from expansion packs)",
        stats.total,
        stats.core,
        stats.expansion_packs.values().sum::<usize>()
    );
    Ok(())
}
