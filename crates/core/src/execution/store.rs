//! Memoization of dependency outcomes
//!
//! The [`DependencyStore`] maps every identity it has seen to exactly one
//! [`OnceAction`]. The wrapper runs the underlying action the first time it is
//! requested; everybody else, including callers arriving while that first run
//! is still in flight, waits for it and receives the cached outcome.
//!
//! Per identity the lifecycle is `unseen -> running -> succeeded | failed`.
//! Only [`DependencyStore::reset`] brings an identity back to `unseen`.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::debug;

use crate::context::RunContext;
use crate::execution::action::{Action, Dep};
use crate::types::ActionFailure;

type SharedRun = Shared<BoxFuture<'static, Result<(), ActionFailure>>>;

/// Run-once guard around a single dependency
pub struct OnceAction {
    dep: Dep,
    run: OnceLock<SharedRun>,
}

impl OnceAction {
    pub fn new(dep: Dep) -> Self {
        Self {
            dep,
            run: OnceLock::new(),
        }
    }

    /// Run the wrapped action on first call, then hand out the cached outcome.
    ///
    /// The body runs on its own task. Dropping a caller, even the one that
    /// started it, neither cancels the body nor lets a later caller start it
    /// again.
    pub async fn run_once(&self, ctx: &RunContext) -> Result<(), ActionFailure> {
        let run = self.run.get_or_init(|| self.start(ctx)).clone();
        run.await
    }

    fn start(&self, ctx: &RunContext) -> SharedRun {
        let dep = self.dep.clone();
        let ctx = ctx.clone();
        debug!(dependency = dep.id(), "running dependency");
        let task = tokio::spawn(async move {
            let outcome = dep.run(&ctx).await.map_err(ActionFailure::new);
            debug!(
                dependency = dep.id(),
                success = outcome.is_ok(),
                "dependency finished"
            );
            outcome
        });

        task.map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(join_error) if join_error.is_panic() => Err(ActionFailure::new(anyhow::anyhow!(
                "panicked: {}",
                panic_message(join_error.into_panic().as_ref())
            ))),
            Err(join_error) => Err(ActionFailure::new(anyhow::anyhow!(
                "dependency task did not complete: {}",
                join_error
            ))),
        })
        .boxed()
        .shared()
    }

    /// Whether the wrapped action has finished running
    pub fn is_done(&self) -> bool {
        self.run
            .get()
            .is_some_and(|run| run.peek().is_some())
    }
}

#[async_trait]
impl Action for OnceAction {
    fn id(&self) -> &str {
        self.dep.id()
    }

    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()> {
        self.run_once(ctx).await.map_err(anyhow::Error::new)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Concurrency-safe table from identity to its run-once guard
#[derive(Default)]
pub struct DependencyStore {
    ran: DashMap<String, Arc<OnceAction>>,
}

impl DependencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical guard for `dep`'s identity, creating it on first sight.
    ///
    /// Lookup and insertion happen under the same shard lock, so two concurrent
    /// first requests for one identity always end up sharing a single guard.
    pub fn resolve(&self, dep: Dep) -> Arc<OnceAction> {
        self.ran
            .entry(dep.id().to_string())
            .or_insert_with(|| {
                debug!(dependency = dep.id(), "registering dependency");
                Arc::new(OnceAction::new(dep.clone()))
            })
            .value()
            .clone()
    }

    /// Forget every identity. Intended for isolating independent runs in tests,
    /// not for use while dependencies are executing.
    pub fn reset(&self) {
        self.ran.clear();
    }

    pub fn len(&self) -> usize {
        self.ran.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ran.is_empty()
    }
}
