use anyhow::Result;
use colored::*;
use kiln_core::orchestrator::Orchestrator;

pub fn execute(orchestrator: &Orchestrator) -> Result<()> {
    println!("{}", "Target Dependency Graph:".bold().underline());

    let result = orchestrator.dependency_graph();
    let graph = &result.graph;

    if !result.cycles.is_empty() {
        let cycles_description = result
            .cycles
            .iter()
            .map(|cycle| {
                let mut path = cycle.clone();
                if let Some(first) = path.first().cloned() {
                    path.push(first);
                }
                path.join(" -> ")
            })
            .collect::<Vec<_>>()
            .join("; ");

        println!(
            "{} {}",
            "Warning:".yellow().bold(),
            format!("Circular dependencies detected: {}", cycles_description).yellow()
        );
    }

    for node_index in graph.node_indices() {
        println!("{}", graph[node_index].blue().bold());

        // petgraph yields neighbors newest edge first
        let mut deps: Vec<&str> = graph
            .neighbors(node_index)
            .map(|neighbor| graph[neighbor].as_str())
            .collect();
        deps.reverse();

        if !deps.is_empty() {
            println!("  {} {}", "depends on:".dimmed(), deps.join(", "));
        } else {
            println!("  {}", "no dependencies".dimmed());
        }
        println!();
    }

    Ok(())
}
