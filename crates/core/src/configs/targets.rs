use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::kosaraju_scc;
use petgraph::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{KilnError, KilnResult};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum Command {
    /// Run through `sh -c`
    Single(String),
    /// Program followed by its arguments, run without a shell
    Multiple(Vec<String>),
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetConfig {
    /// Identifier used on the command line, e.g. `test:unit`
    pub name: String,
    pub description: Option<String>,
    /// Targets that must have run before this one
    pub deps: Option<Vec<String>>,
    /// Run `deps` concurrently instead of one after the other
    pub parallel: Option<bool>,
    pub command: Option<Command>,
    /// Lines fed to `bash` on stdin
    pub script: Option<Vec<String>>,
    pub env: Option<BTreeMap<String, String>>,
    pub workdir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KilnConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Environment applied to every command
    pub env: Option<BTreeMap<String, String>>,
    pub targets: Vec<TargetConfig>,
}

pub fn parse_kiln_config(yaml_str: &str) -> KilnResult<KilnConfig> {
    let config: KilnConfig = serde_yaml::from_str(yaml_str)?;
    validate_kiln_config(&config)?;
    Ok(config)
}

/// JSON schema describing the configuration file
pub fn config_schema_json() -> KilnResult<String> {
    let schema = schemars::schema_for!(KilnConfig);
    serde_json::to_string_pretty(&schema)
        .map_err(|e| KilnError::Config(format!("Failed to render schema: {}", e)))
}

/// Check names, dependency references and cycles.
///
/// A target that (transitively) depends on itself would wait on its own
/// run-once guard forever, so cycles are rejected up front.
pub fn validate_kiln_config(config: &KilnConfig) -> KilnResult<()> {
    let mut graph = DiGraph::<String, ()>::new();
    let mut node_indices = HashMap::new();

    for target in &config.targets {
        let name = target.name.trim();
        if name.is_empty() {
            return Err(KilnError::Config("Target name must not be empty".to_string()));
        }
        if node_indices.contains_key(name) {
            return Err(KilnError::Config(format!(
                "Target '{}' is defined more than once",
                name
            )));
        }
        if target.command.is_some() && target.script.is_some() {
            return Err(KilnError::Config(format!(
                "Target '{}' has both a command and a script",
                name
            )));
        }
        let empty_command = match &target.command {
            Some(Command::Single(cmd)) => cmd.trim().is_empty(),
            Some(Command::Multiple(argv)) => argv
                .first()
                .map_or(true, |program| program.trim().is_empty()),
            None => false,
        };
        if empty_command {
            return Err(KilnError::Config(format!(
                "Target '{}' has an empty command",
                name
            )));
        }
        node_indices.insert(name.to_string(), graph.add_node(name.to_string()));
    }

    for target in &config.targets {
        let from_node = node_indices[target.name.trim()];
        let mut seen = HashSet::new();
        for dep in target.deps.iter().flatten() {
            let Some(&to_node) = node_indices.get(dep.trim()) else {
                return Err(KilnError::Config(format!(
                    "Target '{}' depends on '{}' which was not found",
                    target.name, dep
                )));
            };
            if seen.insert(to_node) {
                graph.add_edge(from_node, to_node, ());
            }
        }
    }

    let mut cycles: Vec<Vec<String>> = kosaraju_scc(&graph)
        .into_iter()
        .filter_map(|component| {
            if component.len() > 1 {
                let mut cycle = component
                    .iter()
                    .map(|node| graph[*node].clone())
                    .collect::<Vec<_>>();
                cycle.sort();
                Some(cycle)
            } else {
                let node = component[0];
                graph
                    .contains_edge(node, node)
                    .then(|| vec![graph[node].clone()])
            }
        })
        .collect();

    if cycles.is_empty() {
        return Ok(());
    }

    cycles.sort();
    let message = cycles
        .into_iter()
        .map(|mut cycle| {
            if let Some(first) = cycle.first().cloned() {
                cycle.push(first);
            }
            cycle.join(" -> ")
        })
        .collect::<Vec<_>>()
        .join("; ");
    Err(KilnError::Config(format!(
        "Circular dependency detected: {}",
        message
    )))
}
