use anyhow::Result;
use colored::*;
use kiln_core::context::RunContext;
use kiln_core::target_manager::TargetManager;

pub async fn execute(manager: &TargetManager, target: &str, args: Vec<String>) -> Result<()> {
    println!("{} {}", "Running target".bold(), target.cyan());

    // Ctrl-C kills the running command and skips targets not yet started
    let ctx = RunContext::new();
    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_ctx.cancel();
        }
    });

    manager
        .run_target_with(&ctx, target, args)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run target:\n{}", e))?;

    println!();
    println!(
        "{} {}",
        "✓".green().bold(),
        "All targets completed successfully!".green().bold()
    );

    Ok(())
}
