//! Turn plain async functions into dependencies
//!
//! [`func`] and [`func_ctx`] bind a tuple of up to six arguments to an async
//! function and produce an [`FnAction`] whose identity is the function's name
//! followed by the `Debug` rendering of each bound argument:
//!
//! ```rust
//! use kiln_core::execution::adapter::func;
//! use kiln_core::execution::action::Action;
//!
//! async fn compile(target: String, jobs: u8) -> anyhow::Result<()> {
//!     Ok(())
//! }
//!
//! let dep = func(compile, ("linux".to_string(), 4u8));
//! assert!(dep.id().ends_with("compile(\"linux\", 4)"));
//! ```
//!
//! Equal functions with equal arguments always yield equal identities, so the
//! same call requested twice runs once.

use std::any::type_name;
use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::RunContext;
use crate::execution::action::{FnAction, Outcome};

/// A tuple of argument values bound to a dependency function
pub trait BoundArgs: Clone + Send + Sync + 'static {
    /// Deterministic, comma-separated rendering of every argument
    fn render(&self) -> String;
}

/// Async callable that ignores the run context
pub trait Handler<Args>: Send + Sync + 'static {
    fn invoke(&self, args: Args) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Async callable that takes the run context as its first parameter
pub trait ContextHandler<Args>: Send + Sync + 'static {
    fn invoke(&self, ctx: RunContext, args: Args) -> BoxFuture<'static, anyhow::Result<()>>;
}

macro_rules! bound_args {
    ($($arg:ident),*) => {
        impl<$($arg),*> BoundArgs for ($($arg,)*)
        where
            $($arg: fmt::Debug + Clone + Send + Sync + 'static,)*
        {
            #[allow(non_snake_case)]
            fn render(&self) -> String {
                let ($($arg,)*) = self;
                let rendered: Vec<String> = vec![$(format!("{:?}", $arg)),*];
                rendered.join(", ")
            }
        }

        impl<F, Fut, $($arg),*> Handler<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> Fut + Send + Sync + 'static,
            Fut: Future + Send + 'static,
            Fut::Output: Outcome,
        {
            #[allow(non_snake_case)]
            fn invoke(&self, args: ($($arg,)*)) -> BoxFuture<'static, anyhow::Result<()>> {
                let ($($arg,)*) = args;
                self($($arg),*).map(Outcome::into_outcome).boxed()
            }
        }

        impl<F, Fut, $($arg),*> ContextHandler<($($arg,)*)> for F
        where
            F: Fn(RunContext, $($arg),*) -> Fut + Send + Sync + 'static,
            Fut: Future + Send + 'static,
            Fut::Output: Outcome,
        {
            #[allow(non_snake_case)]
            fn invoke(&self, ctx: RunContext, args: ($($arg,)*)) -> BoxFuture<'static, anyhow::Result<()>> {
                let ($($arg,)*) = args;
                self(ctx, $($arg),*).map(Outcome::into_outcome).boxed()
            }
        }
    };
}

bound_args!();
bound_args!(A1);
bound_args!(A1, A2);
bound_args!(A1, A2, A3);
bound_args!(A1, A2, A3, A4);
bound_args!(A1, A2, A3, A4, A5);
bound_args!(A1, A2, A3, A4, A5, A6);

/// Wrap an async function that does not take the run context
pub fn func<F, A>(f: F, args: A) -> FnAction
where
    F: Handler<A>,
    A: BoundArgs,
{
    let rendered = args.render();
    FnAction::with_rendered_args(callable_name::<F>(), rendered, move |_ctx| {
        Handler::invoke(&f, args.clone())
    })
}

/// Wrap an async function whose first parameter is the run context
pub fn func_ctx<F, A>(f: F, args: A) -> FnAction
where
    F: ContextHandler<A>,
    A: BoundArgs,
{
    let rendered = args.render();
    FnAction::with_rendered_args(callable_name::<F>(), rendered, move |ctx| {
        ContextHandler::invoke(&f, ctx, args.clone())
    })
}

// Function items have a unique, path-qualified type name. Closures only get
// `parent::{{closure}}`, which is why FnAction::with_name exists.
fn callable_name<F>() -> String {
    type_name::<F>().to_string()
}
