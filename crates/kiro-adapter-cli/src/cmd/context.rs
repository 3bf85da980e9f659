use crate::output::print_json;
use kiro_adapter_core::context::{ContextInjector, ContextToken};

pub fn run(needs: &[String], unavailable: &[String], json: bool) -> anyhow::Result<()> {
    let injector = ContextInjector::new();
    let mapping = injector.map_context_needs(needs);
    let offline = injector.map_context_needs(unavailable).mapped;
    let missing: Vec<ContextToken> = mapping
        .mapped
        .iter()
        .copied()
        .filter(|t| offline.contains(t))
        .collect();
    let fallback = injector.provide_fallback_context(&missing);

    if json {
        return print_json(&serde_json::json!({
            "mapped": mapping.mapped,
            "unmapped": mapping.unmapped,
            "prompts": injector.context_prompts(&mapping.mapped),
            "fallback": fallback,
        }));
    }

    for prompt in injector.context_prompts(&mapping.mapped) {
        println!("{prompt}");
    }
    for need in &mapping.unmapped {
        println!("[warning] no provider for '{need}'");
    }
    if !fallback.fallback_instructions.is_empty() {
        println!("\nFallbacks:");
        for f in &fallback.fallback_instructions {
            println!("  {} ({:?}): {}", f.missing, f.priority, f.instruction);
        }
        if !fallback.can_proceed_without_context {
            println!("Cannot proceed without the missing high-priority context.");
        }
    }
    Ok(())
}
