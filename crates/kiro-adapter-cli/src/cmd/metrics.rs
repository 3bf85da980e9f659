use super::{load_config, load_monitor, metrics_path};
use crate::output::{fmt_ms, fmt_pct, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use kiro_adapter_core::monitor::ActivationMonitor;
use std::path::Path;

#[derive(Subcommand)]
pub enum MetricsSubcommand {
    /// Show activation statistics
    Show {
        /// Detail for one agent
        #[arg(long)]
        agent: Option<String>,

        /// Number of most popular agents to list
        #[arg(long, default_value_t = 5)]
        top: usize,
    },

    /// Drop activation history older than the retention window
    Cleanup {
        /// Retention in days (default: monitor.retention_days)
        #[arg(long)]
        days: Option<u32>,
    },
}

pub fn run(root: &Path, subcmd: MetricsSubcommand, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let monitor = load_monitor(root, &config)?;
    match subcmd {
        MetricsSubcommand::Show { agent: Some(id), .. } => show_agent(&monitor, &id, json),
        MetricsSubcommand::Show { agent: None, top } => show_all(&monitor, top, json),
        MetricsSubcommand::Cleanup { days } => {
            let retention = days.map_or_else(
                || config.monitor.retention(),
                |d| chrono::Duration::days(i64::from(d)),
            );
            let stats = monitor.cleanup(retention);
            let path = metrics_path(root, &config);
            monitor
                .save(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if json {
                print_json(&stats)
            } else {
                println!(
                    "Removed {} activations, {} sessions, {} health samples",
                    stats.activations_removed, stats.sessions_removed, stats.health_samples_removed
                );
                Ok(())
            }
        }
    }
}

fn show_all(monitor: &ActivationMonitor, top: usize, json: bool) -> anyhow::Result<()> {
    let stats = monitor.get_activation_statistics();
    let popular = monitor.most_popular_agents(top);

    if json {
        return print_json(&serde_json::json!({
            "statistics": stats,
            "most_popular": popular,
        }));
    }

    println!(
        "{} activations across {} agents ({} ok, {} failed, {:.1}% success)",
        stats.total_activations,
        stats.agents_tracked,
        stats.successes,
        stats.failures,
        stats.success_rate
    );
    println!("Average duration: {}", fmt_ms(stats.average_duration_ms));
    for (category, count) in &stats.failure_categories {
        println!("  {category}: {count}");
    }

    let rows: Vec<Vec<String>> = monitor
        .tracked_agents()
        .into_iter()
        .filter_map(|id| {
            let m = monitor.agent_metrics(&id)?;
            Some(vec![
                id.clone(),
                m.total.to_string(),
                fmt_pct(m.effectiveness()),
                fmt_ms(m.average_duration_ms()),
                monitor.performance_rating(&id).to_string(),
            ])
        })
        .collect();
    if !rows.is_empty() {
        println!();
        print_table(&["AGENT", "TOTAL", "EFFECTIVE", "AVG", "RATING"], rows);
    }
    if !popular.is_empty() {
        println!("\nMost popular:");
        for p in &popular {
            println!("  {}  {:.0}", p.agent_id, p.score);
        }
    }
    Ok(())
}

fn show_agent(monitor: &ActivationMonitor, id: &str, json: bool) -> anyhow::Result<()> {
    let metrics = monitor
        .agent_metrics(id)
        .with_context(|| format!("no metrics recorded for agent '{id}'"))?;
    let usage = monitor.usage_analytics(id);
    let rating = monitor.performance_rating(id);
    let health = monitor.health_status(id);

    if json {
        return print_json(&serde_json::json!({
            "agent_id": id,
            "metrics": metrics,
            "usage": usage,
            "rating": rating,
            "health": health,
        }));
    }

    println!("{id}");
    println!(
        "  activations: {} ({} ok, {} failed)",
        metrics.total, metrics.successes, metrics.failures
    );
    println!("  effectiveness: {}", fmt_pct(metrics.effectiveness()));
    println!("  average: {}  rating: {rating}", fmt_ms(metrics.average_duration_ms()));
    if let Some(u) = usage {
        println!(
            "  sessions: {}  average session: {}",
            u.session_count,
            fmt_ms(u.average_session_ms)
        );
    }
    if let Some(h) = health {
        println!("  health: {} (checked {})", h.status, h.last_check.to_rfc3339());
    }
    Ok(())
}
