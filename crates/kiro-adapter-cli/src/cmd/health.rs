use super::{runtime, Session};
use crate::output::{print_json, print_table};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let rt = runtime()?;
    let report = rt.block_on(async {
        let session = Session::open(root).await?;
        let report = session
            .monitor
            .run_health_checks(&session.registry, &session.handlers)
            .await;
        session.save(root)?;
        anyhow::Ok(report)
    })?;

    if json {
        print_json(&report)?;
    } else if report.agents.is_empty() {
        println!("No registered agents.");
    } else {
        print_table(
            &["AGENT", "STATUS", "ISSUES"],
            report
                .agents
                .iter()
                .map(|a| {
                    vec![
                        a.agent_id.clone(),
                        a.status.to_string(),
                        if a.issues.is_empty() {
                            "-".to_string()
                        } else {
                            a.issues.join("; ")
                        },
                    ]
                })
                .collect(),
        );
        println!("\n{} healthy, {} unhealthy", report.healthy(), report.unhealthy());
    }

    if report.unhealthy() > 0 {
        anyhow::bail!("{} agent(s) unhealthy", report.unhealthy());
    }
    Ok(())
}
