use anyhow::Context;
use kiro_adapter_core::{config::AdapterConfig, io, paths, steering::DEFAULT_STEERING};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing Kiro adapter in: {}", root.display());

    for dir in [
        paths::KIRO_DIR,
        paths::AGENTS_OUTPUT_DIR,
        paths::STEERING_DIR,
        paths::HOOKS_DIR,
        paths::STATE_DIR,
    ] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        AdapterConfig::default()
            .save(root)
            .context("failed to write adapter.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    for (name, content) in DEFAULT_STEERING {
        let rel = format!("{}/{name}", paths::STEERING_DIR);
        let created = io::write_if_missing(&root.join(&rel), content.as_bytes())
            .with_context(|| format!("failed to write {rel}"))?;
        println!("  {} {rel}", if created { "created:" } else { "exists: " });
    }

    if !root.join(paths::CORE_AGENTS_DIR).is_dir() {
        println!(
            "\nNo {} found. Install BMAD before running `kiro-adapter convert`.",
            paths::CORE_AGENTS_DIR
        );
    }
    Ok(())
}
