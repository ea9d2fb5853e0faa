use anyhow::Result;
use colored::*;
use kiln_core::target_manager::TargetManager;

pub fn execute(manager: &TargetManager) -> Result<()> {
    let heading = match &manager.config().name {
        Some(name) => format!("Targets ({})", name),
        None => "Targets".to_string(),
    };
    println!("{}", heading.bold().underline());

    let targets = manager.list_targets();
    if targets.is_empty() {
        println!("  {}", "No targets found".dimmed());
        return Ok(());
    }

    for target in targets {
        match &target.description {
            Some(description) => println!("{} {}", target.name.blue().bold(), description.dimmed()),
            None => println!("{}", target.name.blue().bold()),
        }

        if !target.deps.is_empty() {
            let mode = if target.parallel { "parallel" } else { "serial" };
            println!(
                "  {} {}",
                format!("depends on ({}):", mode).dimmed(),
                target.deps.join(", ")
            );
        }
    }

    Ok(())
}
