//! Dependency actions
//!
//! An [`Action`] is a uniquely identified unit of work that may fail. The
//! identity is the deduplication key: two actions with the same identity are
//! the same logical dependency and run at most once per [`DependencyStore`].
//!
//! [`DependencyStore`]: crate::execution::store::DependencyStore

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::RunContext;

/// A uniquely identified, possibly failing unit of work
#[async_trait]
pub trait Action: Send + Sync {
    /// Stable identifier used to make sure this dependency only runs once
    fn id(&self) -> &str;

    /// Execute the dependency
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()>;
}

/// Shared handle to an action, as accepted by the executor entry points
pub type Dep = Arc<dyn Action>;

/// Normalizes the return value of an action body into a result.
///
/// Bodies may return nothing, or any `Result<(), E>` whose error converts
/// into [`anyhow::Error`].
pub trait Outcome: Send {
    fn into_outcome(self) -> anyhow::Result<()>;
}

impl Outcome for () {
    fn into_outcome(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> Outcome for Result<(), E>
where
    E: Into<anyhow::Error> + Send,
{
    fn into_outcome(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

type Body = dyn Fn(RunContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Closure-backed action.
///
/// Construct one directly with [`FnAction::new`] when you already have an
/// identity, or through [`func`](crate::execution::adapter::func) to derive the
/// identity from a function and its bound arguments.
pub struct FnAction {
    name: String,
    args: Option<String>,
    id: String,
    body: Box<Body>,
}

impl FnAction {
    /// Create an action from an explicit identity and a body taking the run context
    pub fn new<F, Fut>(id: impl Into<String>, body: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Outcome,
    {
        let id = id.into();
        Self {
            name: id.clone(),
            args: None,
            id,
            body: Box::new(move |ctx| body(ctx).map(Outcome::into_outcome).boxed()),
        }
    }

    /// Used by the adapter, where the identity is `name(args)`
    pub(crate) fn with_rendered_args<F, Fut>(name: String, args: String, body: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: format!("{}({})", name, args),
            name,
            args: Some(args),
            body: Box::new(move |ctx| body(ctx).boxed()),
        }
    }

    /// Replace the callable name while keeping any bound-argument rendering.
    ///
    /// Closures share a type name per enclosing function, so give each closure
    /// its own name before using it as a dependency.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.id = match &self.args {
            Some(args) => format!("{}({})", self.name, args),
            None => self.name.clone(),
        };
        self
    }

    /// Name of the callable this action wraps, without arguments
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_dep(self) -> Dep {
        Arc::new(self)
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").field("id", &self.id).finish()
    }
}

#[async_trait]
impl Action for FnAction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()> {
        (self.body)(ctx.clone()).await
    }
}
