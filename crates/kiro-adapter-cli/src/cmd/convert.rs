use super::{display_path, load_config, load_monitor, runtime, save_monitor};
use crate::output::print_json;
use kiro_adapter_core::{
    pipeline::ConversionPipeline,
    registry::{AgentRegistry, FileRegistrationSink},
};
use std::path::Path;
use std::sync::Arc;

pub fn run(root: &Path, strict: bool, json: bool) -> anyhow::Result<()> {
    let mut config = load_config(root)?;
    if strict {
        config.pipeline.fail_on_missing_dependencies = true;
    }
    let monitor = load_monitor(root, &config)?;
    let registry = Arc::new(
        AgentRegistry::new(config.registry.clone(), Arc::new(FileRegistrationSink))
            .with_observer(monitor.clone()),
    );

    let pipeline = ConversionPipeline::new(root, config.clone(), registry);
    let report = runtime()?.block_on(pipeline.run())?;
    save_monitor(root, &config, &monitor)?;

    if json {
        print_json(&report)?;
    } else {
        for id in &report.converted {
            println!("  converted: {id}");
        }
        for (id, missing) in &report.missing_dependencies {
            println!("  [warning] {id}: missing {}", missing.join(", "));
        }
        for w in &report.warnings {
            println!("  [warning] {w}");
        }
        for f in &report.failures {
            println!("  [error] {} ({}): {}", f.agent_id, f.category, f.message);
        }
        println!(
            "\n{} discovered, {} converted, {} failed",
            report.discovered,
            report.converted.len(),
            report.failures.len()
        );
        if !report.hook_files.is_empty() {
            println!("Hooks:");
            for p in &report.hook_files {
                println!("  {}", display_path(root, p));
            }
        }
    }

    if !report.failures.is_empty() {
        anyhow::bail!("{} agent(s) failed to convert", report.failures.len());
    }
    Ok(())
}
