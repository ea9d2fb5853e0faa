//! High-level target management interface
//!
//! This module provides the [`TargetManager`], the primary interface the CLI
//! uses. It loads a `kiln.yml`, turns every configured target into a
//! dependency whose body first runs the target's own dependencies and then its
//! command or script, and registers each one in a [`TargetRegistry`].
//!
//! Every target of one manager shares a single [`DependencyRun`], so a target
//! reached through several dependency paths runs once per invocation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kiln_core::target_manager::{TargetManager, TargetManagerConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> kiln_core::types::KilnResult<()> {
//! let manager = TargetManager::new(TargetManagerConfig {
//!     config_path: PathBuf::from("kiln.yml"),
//! })?;
//!
//! for target in manager.list_targets() {
//!     println!("{}", target.name);
//! }
//!
//! manager.run_target("test:unit", Vec::new()).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use colored::*;

use crate::colors::get_target_color;
use crate::configs::targets::{parse_kiln_config, Command, KilnConfig, TargetConfig};
use crate::context::RunContext;
use crate::execution::action::{Dep, FnAction};
use crate::execution::command::CommandRunner;
use crate::execution::runner::DependencyRun;
use crate::registry::TargetRegistry;
use crate::types::{KilnError, KilnResult};

/// Configuration for initializing a target manager
pub struct TargetManagerConfig {
    pub config_path: PathBuf,
}

/// Summary of one configured target
#[derive(Debug, Clone, PartialEq)]
pub struct TargetInfo {
    pub name: String,
    pub description: Option<String>,
    pub deps: Vec<String>,
    pub parallel: bool,
}

/// Everything a target body needs, shared between all target dependencies
struct TargetTable {
    root: PathBuf,
    config: KilnConfig,
    by_name: HashMap<String, usize>,
    run: DependencyRun,
}

impl TargetTable {
    fn get(&self, name: &str) -> KilnResult<&TargetConfig> {
        self.by_name
            .get(name.trim())
            .map(|&index| &self.config.targets[index])
            .ok_or_else(|| KilnError::Target(format!("Target '{}' not found", name)))
    }
}

/// High-level manager owning the loaded configuration and target registry
pub struct TargetManager {
    table: Arc<TargetTable>,
    registry: TargetRegistry,
}

impl TargetManager {
    /// Load and validate the configuration file and register every target
    pub fn new(config: TargetManagerConfig) -> KilnResult<Self> {
        let content = fs::read_to_string(&config.config_path).map_err(|e| {
            KilnError::Config(format!(
                "Failed to read {}: {}",
                config.config_path.display(),
                e
            ))
        })?;
        let kiln_config = parse_kiln_config(&content)?;

        let root = config
            .config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_config(kiln_config, root)
    }

    /// Build a manager from an already parsed configuration. Relative working
    /// directories are resolved against `root`.
    pub fn from_config(config: KilnConfig, root: PathBuf) -> KilnResult<Self> {
        let by_name = config
            .targets
            .iter()
            .enumerate()
            .map(|(index, target)| (target.name.trim().to_string(), index))
            .collect();

        let table = Arc::new(TargetTable {
            root,
            config,
            by_name,
            run: DependencyRun::new(),
        });

        let mut registry = TargetRegistry::new();
        for target in &table.config.targets {
            let id = target.name.trim();
            let name = id.to_string();
            let table = table.clone();
            registry.register(id, move |ctx, args| {
                let table = table.clone();
                let name = name.clone();
                async move {
                    let dep = target_dep(&table, &name, args)?;
                    table.run.serial(&ctx, vec![dep]).await
                }
            })?;
        }

        Ok(Self { table, registry })
    }

    /// List configured targets sorted by name
    pub fn list_targets(&self) -> Vec<TargetInfo> {
        let mut targets: Vec<TargetInfo> = self
            .table
            .config
            .targets
            .iter()
            .map(|target| TargetInfo {
                name: target.name.trim().to_string(),
                description: target.description.clone(),
                deps: target.deps.clone().unwrap_or_default(),
                parallel: target.parallel.unwrap_or(false),
            })
            .collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        targets
    }

    /// Run a target with positional arguments
    pub async fn run_target(&self, name: &str, args: Vec<String>) -> KilnResult<()> {
        self.run_target_with(&RunContext::new(), name, args).await
    }

    /// Run a target with a caller-supplied context, e.g. one wired to Ctrl-C
    pub async fn run_target_with(
        &self,
        ctx: &RunContext,
        name: &str,
        args: Vec<String>,
    ) -> KilnResult<()> {
        self.registry.call(ctx, name, args).await
    }

    pub fn config(&self) -> &KilnConfig {
        &self.table.config
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }
}

/// Dependency for one target. Arguments become part of the identity, so the
/// same target invoked with different arguments runs once per argument list.
fn target_dep(table: &Arc<TargetTable>, name: &str, args: Vec<String>) -> KilnResult<Dep> {
    let target = table.get(name)?;
    let id = if args.is_empty() {
        format!("target:{}", target.name.trim())
    } else {
        let rendered = args
            .iter()
            .map(|arg| format!("{:?}", arg))
            .collect::<Vec<_>>()
            .join(", ");
        format!("target:{}({})", target.name.trim(), rendered)
    };

    // The memoization store inside the table keeps this dependency alive, so
    // only hold a weak reference back to the table.
    let table = Arc::downgrade(table);
    let name = target.name.trim().to_string();
    Ok(FnAction::new(id, move |ctx: RunContext| {
        let table = table.upgrade();
        let name = name.clone();
        let args = args.clone();
        async move {
            let table = table.ok_or_else(|| {
                KilnError::Target(format!("Target '{}' outlived its manager", name))
            })?;
            run_target_body(&table, &ctx, &name, args).await
        }
    })
    .into_dep())
}

async fn run_target_body(
    table: &Arc<TargetTable>,
    ctx: &RunContext,
    name: &str,
    args: Vec<String>,
) -> KilnResult<()> {
    if ctx.is_cancelled() {
        return Err(KilnError::Cancelled);
    }
    let target = table.get(name)?;

    let deps = target
        .deps
        .iter()
        .flatten()
        .map(|dep| target_dep(table, dep, Vec::new()))
        .collect::<KilnResult<Vec<_>>>()?;
    if target.parallel.unwrap_or(false) {
        table.run.parallel(ctx, deps).await?;
    } else {
        table.run.serial(ctx, deps).await?;
    }

    if target.command.is_none() && target.script.is_none() {
        return Ok(());
    }
    if ctx.is_cancelled() {
        return Err(KilnError::Cancelled);
    }

    let color = get_target_color(name);
    println!();
    println!(
        "┌─ {}",
        format!("Running target '{}'", name).color(color).bold()
    );
    if let Some(description) = &target.description {
        println!("└─ {}", description.bright_black());
    }

    let runner = command_runner(ctx, &table.root, &table.config, target, &args);
    match (&target.command, &target.script) {
        (Some(Command::Single(cmd)), _) => runner.run("sh", ["-c", cmd.as_str()]).await?,
        (Some(Command::Multiple(cmds)), _) => {
            if let Some((program, rest)) = cmds.split_first() {
                runner.run(program, rest).await?;
            }
        }
        (None, Some(script)) => runner.bash(script).await?,
        (None, None) => {}
    }

    println!(
        "{} {}",
        "✓".green().bold(),
        format!("Completed {}", name).color(color)
    );
    Ok(())
}

fn command_runner(
    ctx: &RunContext,
    root: &Path,
    config: &KilnConfig,
    target: &TargetConfig,
    args: &[String],
) -> CommandRunner {
    let workdir = match &target.workdir {
        Some(dir) => root.join(dir),
        None => root.to_path_buf(),
    };

    let mut runner = CommandRunner::new()
        .cancel_with(ctx)
        .workdir(workdir)
        .envs(config.env.clone().unwrap_or_default())
        .envs(target.env.clone().unwrap_or_default());

    // Set environment variables for positional arguments
    for (i, arg) in args.iter().enumerate() {
        runner = runner.env(format!("KILN_ARG_{}", i), arg.as_str());
    }
    runner
}
