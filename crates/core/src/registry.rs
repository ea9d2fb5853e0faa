//! Explicit target registry
//!
//! Maps `group:name` identifiers to handlers that receive the run context and
//! the positional arguments given on the command line. Identifiers are
//! case-insensitive and stored lower-cased.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::RunContext;
use crate::execution::action::Outcome;
use crate::types::{KilnError, KilnResult};

type TargetHandler = dyn Fn(RunContext, Vec<String>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Registry of invocable targets
#[derive(Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Arc<TargetHandler>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `id`. Registering the same id twice is an error.
    pub fn register<F, Fut>(&mut self, id: &str, handler: F) -> KilnResult<()>
    where
        F: Fn(RunContext, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Outcome,
    {
        let id = normalize(id);
        if id.is_empty() {
            return Err(KilnError::Target("Target name must not be empty".to_string()));
        }
        if self.targets.contains_key(&id) {
            return Err(KilnError::Target(format!(
                "Target '{}' is already registered",
                id
            )));
        }
        let handler: Arc<TargetHandler> = Arc::new(move |ctx: RunContext, args: Vec<String>| {
            handler(ctx, args).map(Outcome::into_outcome).boxed()
        });
        self.targets.insert(id, handler);
        Ok(())
    }

    /// Register a handler as `group:name`
    pub fn register_in<F, Fut>(&mut self, group: &str, name: &str, handler: F) -> KilnResult<()>
    where
        F: Fn(RunContext, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Outcome,
    {
        self.register(&format!("{}:{}", group, name), handler)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.targets.contains_key(&normalize(id))
    }

    /// All registered identifiers, sorted
    pub fn ids(&self) -> Vec<&str> {
        self.targets.keys().map(String::as_str).collect()
    }

    /// Invoke the handler registered under `id`
    pub async fn call(&self, ctx: &RunContext, id: &str, args: Vec<String>) -> KilnResult<()> {
        let handler = self
            .targets
            .get(&normalize(id))
            .cloned()
            .ok_or_else(|| KilnError::Target(format!("Target '{}' not found", id)))?;
        handler(ctx.clone(), args).await?;
        Ok(())
    }
}

fn normalize(id: &str) -> String {
    id.trim().to_lowercase()
}
