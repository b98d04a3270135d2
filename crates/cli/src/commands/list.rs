use anyhow::Result;
use colored::*;
use kiln_core::orchestrator::{Orchestrator, TargetSource};
use kiln_core::results::TargetStatus;

pub fn execute(orchestrator: &Orchestrator) -> Result<()> {
    let result = orchestrator.list()?;

    let heading = match &orchestrator.source {
        TargetSource::Manifest(path) => format!("Targets ({})", path.display()),
        TargetSource::BuiltIn => "Targets (built-in recipe)".to_string(),
    };
    println!("{}", heading.bold().underline());

    if result.targets.is_empty() {
        println!("  {}", "No targets defined".dimmed());
        return Ok(());
    }

    for target in &result.targets {
        let marker = match target.status {
            TargetStatus::Done => "[done]".green(),
            TargetStatus::Pending => "[pending]".yellow(),
            TargetStatus::Aggregate => "[group]".blue(),
        };
        println!("{} {}", target.name.blue().bold(), marker);

        if let Some(description) = &target.description {
            println!("  {}", description.dimmed());
        }
        if !target.dependencies.is_empty() {
            println!(
                "  {} {}",
                "depends on:".dimmed(),
                target.dependencies.join(", ")
            );
        }
    }

    println!();
    println!(
        "{} {}",
        "Default:".bright_black(),
        result.default_targets.join(", ")
    );

    Ok(())
}
