use std::path::PathBuf;

/// Convenience result type used across Kinema's public API.
pub type KinemaResult<T> = Result<T, KinemaError>;

/// Top-level error taxonomy used by backend, cache and graph APIs.
#[derive(thiserror::Error, Debug)]
pub enum KinemaError {
    /// Backend setup failed (thread spawn, worker init, startup timeout).
    #[error("setup error: {0}")]
    Setup(String),

    /// A worker thread did not exit within the shutdown deadline.
    #[error("render worker {worker} did not stop within {timeout_ms} ms")]
    StuckWorker {
        /// Index of the stuck worker.
        worker: usize,
        /// Shutdown deadline that elapsed.
        timeout_ms: u128,
    },

    /// Operation not possible in the current state (no root, invalid params, ...).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid node-graph mutation or lookup.
    #[error("graph error: {0}")]
    Graph(String),

    /// A node failed to produce a value.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Configuration or project file could not be used.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem failure with the path that caused it.
    #[error("io error at '{}': {source}", path.display())]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KinemaError {
    /// Build a [`KinemaError::Setup`].
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Build a [`KinemaError::InvalidState`].
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Build a [`KinemaError::Graph`].
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    /// Build a [`KinemaError::Evaluation`].
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Build a [`KinemaError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`KinemaError::Io`] for `path`.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
