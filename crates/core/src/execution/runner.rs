//! Serial and parallel dependency execution
//!
//! A [`DependencyRun`] resolves every requested dependency through its
//! [`DependencyStore`] before running it, so a dependency requested from many
//! places (serially, in parallel, or both at once) runs its body exactly once
//! and every requester observes the same outcome.
//!
//! [`serial_deps`] and [`parallel_deps`] share one process-wide run, so code
//! that calls them from anywhere in a program deduplicates against all of it.

use std::sync::Arc;

use futures::future::join_all;
use lazy_static::lazy_static;
use tracing::debug;

use crate::context::RunContext;
use crate::execution::action::{Action, Dep};
use crate::execution::store::{DependencyStore, OnceAction};
use crate::types::{ActionFailure, KilnError, KilnResult};

lazy_static! {
    static ref DEFAULT_RUN: DependencyRun = DependencyRun::new();
}

/// Executes dependencies one after the other using the process-wide run
pub async fn serial_deps(
    ctx: &RunContext,
    deps: impl IntoIterator<Item = Dep>,
) -> KilnResult<()> {
    DEFAULT_RUN.serial(ctx, deps).await
}

/// Executes dependencies concurrently using the process-wide run
pub async fn parallel_deps(
    ctx: &RunContext,
    deps: impl IntoIterator<Item = Dep>,
) -> KilnResult<()> {
    DEFAULT_RUN.parallel(ctx, deps).await
}

/// Forget every dependency the process-wide run has executed
pub fn reset_deps() {
    DEFAULT_RUN.reset();
}

/// Executor for dependency lists, backed by its own memoization store
#[derive(Default)]
pub struct DependencyRun {
    store: DependencyStore,
}

impl DependencyRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical run-once guard for the dependency's identity
    pub fn resolve(&self, dep: Dep) -> Arc<OnceAction> {
        self.store.resolve(dep)
    }

    /// Clear all memoized outcomes. Only meant for isolating independent runs.
    pub fn reset(&self) {
        self.store.reset();
    }

    pub fn store(&self) -> &DependencyStore {
        &self.store
    }

    /// Run dependencies in the listed order, stopping at the first failure.
    ///
    /// Dependencies after the failing one are not started.
    pub async fn serial(
        &self,
        ctx: &RunContext,
        deps: impl IntoIterator<Item = Dep>,
    ) -> KilnResult<()> {
        for dep in deps {
            let dep = self.resolve(dep);
            if let Err(source) = dep.run_once(ctx).await {
                return Err(dependency_failed(&dep, source));
            }
        }
        Ok(())
    }

    /// Run all dependencies concurrently and wait for every one of them.
    ///
    /// A failing dependency does not stop its siblings. All failures are
    /// returned together as [`KilnError::Aggregate`], in listed order.
    pub async fn parallel(
        &self,
        ctx: &RunContext,
        deps: impl IntoIterator<Item = Dep>,
    ) -> KilnResult<()> {
        let deps: Vec<_> = deps.into_iter().map(|dep| self.resolve(dep)).collect();
        if deps.is_empty() {
            return Ok(());
        }
        debug!(count = deps.len(), "waiting for parallel dependencies");

        // Every body runs on its own task, so awaiting the guards together is
        // enough to have them all in flight at once.
        let outcomes = join_all(deps.iter().map(|dep| dep.run_once(ctx))).await;
        let errors: Vec<_> = deps
            .iter()
            .zip(outcomes)
            .filter_map(|(dep, outcome)| {
                outcome
                    .err()
                    .map(|source| dependency_failed(dep, source))
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(KilnError::Aggregate(errors))
        }
    }
}

fn dependency_failed(dep: &OnceAction, source: ActionFailure) -> KilnError {
    KilnError::Dependency {
        id: dep.id().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::execution::action::FnAction;
    use crate::execution::adapter::func;

    fn counting(id: &str, counter: Arc<AtomicUsize>) -> Dep {
        FnAction::new(id, move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .into_dep()
    }

    fn failing(id: &str, counter: Arc<AtomicUsize>) -> Dep {
        FnAction::new(id, move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!("{} broke", "step"))
            }
        })
        .into_dep()
    }

    fn slow(id: &str, counter: Arc<AtomicUsize>, fail: bool) -> Dep {
        FnAction::new(id, move |_ctx| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    anyhow::bail!("slow failure");
                }
                Ok(())
            }
        })
        .into_dep()
    }

    fn sleeping(id: &str, counter: Arc<AtomicUsize>, millis: u64) -> Dep {
        FnAction::new(id, move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(millis)).await;
            }
        })
        .into_dep()
    }

    #[tokio::test]
    async fn test_serial_runs_duplicates_once() {
        let run = DependencyRun::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new();

        let deps: Vec<Dep> = (0..5).map(|_| counting("setup", counter.clone())).collect();
        run.serial(&ctx, deps).await.unwrap();
        run.serial(&ctx, vec![counting("setup", counter.clone())])
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_serial_runs_in_listed_order() {
        let run = DependencyRun::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let ctx = RunContext::new();

        let deps: Vec<Dep> = ["first", "second", "third"]
            .into_iter()
            .map(|name| {
                let order = order.clone();
                FnAction::new(name, move |_ctx| {
                    let order = order.clone();
                    async move {
                        order.lock().unwrap().push(name);
                    }
                })
                .into_dep()
            })
            .collect();

        run.serial(&ctx, deps).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_serial_stops_at_first_failure() {
        let run = DependencyRun::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let c = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new();

        let err = run
            .serial(
                &ctx,
                vec![
                    counting("a", a.clone()),
                    failing("b", b.clone()),
                    counting("c", c.clone()),
                ],
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "running b: step broke");
        assert_eq!(err.failed_ids(), vec!["b"]);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(c.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_runs_every_dependency() {
        let run = DependencyRun::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let c = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new();

        let err = run
            .parallel(
                &ctx,
                vec![
                    failing("a", a.clone()),
                    counting("b", b.clone()),
                    failing("c", c.clone()),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, KilnError::Aggregate(ref errors) if errors.len() == 2));
        assert_eq!(err.failed_ids(), vec!["a", "c"]);
        assert_eq!(err.to_string(), "running a: step broke\nrunning c: step broke");
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(c.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_success_returns_ok() {
        let run = DependencyRun::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new();

        run.parallel(
            &ctx,
            vec![
                counting("a", counter.clone()),
                counting("b", counter.clone()),
                counting("a", counter.clone()),
            ],
        )
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batches_share_one_execution() {
        let run = Arc::new(DependencyRun::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new();

        let batches: Vec<_> = (0..5)
            .map(|_| {
                let run = run.clone();
                let ctx = ctx.clone();
                let dep = slow("shared", counter.clone(), true);
                tokio::spawn(async move { run.parallel(&ctx, vec![dep]).await })
            })
            .collect();

        let mut errors = Vec::new();
        for batch in batches {
            errors.push(batch.await.unwrap().unwrap_err());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let first = errors[0].failures()[0].1.clone();
        for err in &errors {
            let failures = err.failures();
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, "shared");
            assert!(failures[0].1.same_as(&first));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_serial_and_parallel_share_outcomes() {
        let run = DependencyRun::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new();

        let (serial, parallel) = tokio::join!(
            run.serial(&ctx, vec![slow("shared", counter.clone(), false)]),
            run.parallel(&ctx, vec![slow("shared", counter.clone(), false)]),
        );
        serial.unwrap();
        parallel.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_failure_is_returned_to_later_requests() {
        let run = DependencyRun::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new();

        let first = run
            .serial(&ctx, vec![failing("b", counter.clone())])
            .await
            .unwrap_err();
        let second = run
            .parallel(&ctx, vec![failing("b", counter.clone())])
            .await
            .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(first.failures()[0].1.same_as(second.failures()[0].1));
    }

    #[tokio::test]
    async fn test_reset_runs_dependencies_again() {
        let run = DependencyRun::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new();

        run.serial(&ctx, vec![counting("setup", counter.clone())])
            .await
            .unwrap();
        run.reset();
        run.serial(&ctx, vec![counting("setup", counter.clone())])
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_input_returns_ok() {
        let run = DependencyRun::new();
        let ctx = RunContext::new();
        run.serial(&ctx, Vec::new()).await.unwrap();
        run.parallel(&ctx, Vec::new()).await.unwrap();
        assert!(run.store().is_empty());
    }

    #[tokio::test]
    async fn test_adapted_functions_are_deduplicated() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        async fn install(tool: &'static str) {
            let _ = tool;
            CALLS.fetch_add(1, Ordering::SeqCst);
        }

        let run = DependencyRun::new();
        let ctx = RunContext::new();
        run.serial(
            &ctx,
            vec![
                func(install, ("golangci-lint",)).into_dep(),
                func(install, ("golangci-lint",)).into_dep(),
                func(install, ("goimports",)).into_dep(),
            ],
        )
        .await
        .unwrap();

        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_context_reaches_every_dependency() {
        let run = DependencyRun::new();
        let ctx = RunContext::new();
        ctx.cancel();

        let dep = FnAction::new("respects-cancel", |ctx: RunContext| async move {
            if ctx.is_cancelled() {
                anyhow::bail!("cancelled");
            }
            Ok(())
        })
        .into_dep();

        let err = run.parallel(&ctx, vec![dep]).await.unwrap_err();
        assert_eq!(err.to_string(), "running respects-cancel: cancelled");
    }

    #[tokio::test]
    async fn test_default_run_free_functions() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new();
        let id = "runner::tests::default-run";

        serial_deps(&ctx, vec![counting(id, counter.clone())])
            .await
            .unwrap();
        parallel_deps(&ctx, vec![counting(id, counter.clone())])
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        reset_deps();
        serial_deps(&ctx, vec![counting(id, counter.clone())])
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_abandoned_serial_caller_does_not_rerun_body() {
        let run = Arc::new(DependencyRun::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new();

        let batch = {
            let run = run.clone();
            let ctx = ctx.clone();
            let dep = sleeping("long", counter.clone(), 200);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                run.parallel(&ctx, vec![dep]).await
            })
        };

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            run.serial(&ctx, vec![sleeping("long", counter.clone(), 200)]),
        )
        .await;
        assert!(abandoned.is_err());

        batch.await.unwrap().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
