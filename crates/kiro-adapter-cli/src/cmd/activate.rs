use super::{runtime, Session};
use crate::output::print_json;
use kiro_adapter_core::activation::{ActivationContext, ActivationManager};
use std::path::Path;

pub fn run(
    root: &Path,
    id: &str,
    user: Option<String>,
    project: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = ActivationContext {
        user_id: user,
        project_id: project,
        workspace_path: Some(root.to_path_buf()),
        ..Default::default()
    };

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let session = Session::open(root).await?;
        let manager = ActivationManager::new(
            session.config.activation.clone(),
            session.registry.clone(),
            session.handlers.clone(),
        )
        .with_observer(session.monitor.clone());

        let outcome = manager.activate_agent(id, ctx).await;
        if outcome.is_ok() {
            manager.deactivate_agent(id);
        }
        // Failed attempts are recorded too.
        session.save(root)?;
        anyhow::Ok(outcome)
    })?;
    let instance = outcome?;

    if json {
        return print_json(&instance);
    }
    println!("Activated {} ({})", instance.agent_id, instance.instance_id);
    println!("Capabilities:");
    for c in &instance.capabilities {
        println!("  {c}");
    }
    Ok(())
}
