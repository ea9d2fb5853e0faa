use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The main error type for Kiln operations
#[derive(Debug, Error)]
pub enum KilnError {
    /// A dependency body failed. Every requester of the same identity receives
    /// the same underlying failure.
    #[error("running {id}: {source}")]
    Dependency { id: String, source: ActionFailure },

    /// Failures collected from one parallel batch, in the order the
    /// dependencies were listed.
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<KilnError>),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Target error: {0}")]
    Target(String),

    #[error("{0}")]
    Command(String),

    /// The run context was cancelled before or while the work ran
    #[error("Run cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

impl KilnError {
    /// Flatten this error into the `(identity, failure)` pairs it carries.
    ///
    /// Aggregates are walked recursively; errors that are not dependency
    /// failures contribute nothing.
    pub fn failures(&self) -> Vec<(&str, &ActionFailure)> {
        match self {
            KilnError::Dependency { id, source } => vec![(id.as_str(), source)],
            KilnError::Aggregate(errors) => errors.iter().flat_map(KilnError::failures).collect(),
            _ => Vec::new(),
        }
    }

    /// Identities of every failed dependency carried by this error
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures().into_iter().map(|(id, _)| id).collect()
    }
}

fn join_errors(errors: &[KilnError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A failure returned by a dependency body.
///
/// The run-once guard caches one of these per identity and hands clones of it
/// to every caller, so all observers see the very same error value.
#[derive(Debug, Clone)]
pub struct ActionFailure(Arc<anyhow::Error>);

impl ActionFailure {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// Attempt to downcast the underlying error to a concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Whether both handles point at the same cached failure
    pub fn same_as(&self, other: &ActionFailure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<anyhow::Error> for ActionFailure {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for ActionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
