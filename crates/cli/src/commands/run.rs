use anyhow::Result;
use colored::*;
use kiln_core::orchestrator::Orchestrator;
use kiln_core::results::RunEvent;

pub fn execute(orchestrator: &Orchestrator, targets: &[String]) -> Result<()> {
    let label = if targets.is_empty() {
        "default targets".to_string()
    } else {
        targets.join(", ")
    };
    println!("{} {}", "Provisioning".bold(), label.cyan());
    println!(
        "└─ {} {}",
        "Workspace:".bright_black(),
        orchestrator.settings.workspace_path.display()
    );
    println!();

    let report = orchestrator
        .run_with(targets, &mut print_event)
        .map_err(|e| anyhow::anyhow!("Provisioning failed: {}", e))?;

    println!();
    if report.is_noop() {
        println!("{}", "Nothing to do, everything is already done.".green().bold());
    } else {
        println!(
            "{} {}",
            "✓".green().bold(),
            format!("{} target(s) completed successfully!", report.executed.len())
                .green()
                .bold()
        );
    }

    Ok(())
}

fn print_event(event: RunEvent<'_>) {
    match event {
        RunEvent::Skipped(name) => {
            println!("{} {}", "-".bright_black(), format!("{} (already done)", name).dimmed())
        }
        RunEvent::Started(name) => println!("{} {}", "▶".cyan(), name.bold()),
        RunEvent::Finished(name) => println!("{} {}", "✓".green().bold(), name),
        RunEvent::Failed(name) => println!("{} {}", "✗".red().bold(), name.red()),
        RunEvent::Aggregate(_) => {}
    }
}
