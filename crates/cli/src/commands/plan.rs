use anyhow::{Context, Result};
use colored::*;
use kiln_core::orchestrator::Orchestrator;
use kiln_core::results::TargetStatus;

pub fn execute(orchestrator: &Orchestrator, targets: &[String], json: bool) -> Result<()> {
    let plan = orchestrator
        .plan(targets)
        .map_err(|e| anyhow::anyhow!("Failed to resolve targets: {}", e))?;

    if json {
        let rendered = serde_json::to_string_pretty(&plan).context("Failed to render plan")?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("{}:", "Execution order".bold());
    for (i, target) in plan.targets.iter().enumerate() {
        let status = match target.status {
            TargetStatus::Pending => "run".yellow(),
            TargetStatus::Done => "skip (done)".bright_black(),
            TargetStatus::Aggregate => "group".blue(),
        };
        println!("  {}. {} {}", i + 1, target.name, status);
    }

    Ok(())
}
