//! Public error of async-keeper.

use crate::prelude::*;

/// Error reported by a [`Context`](crate::context::Context) once it is done.
#[derive(Error, PartialEq, Eq, Clone, Copy, Debug)]
pub enum ContextError {
    /// The context was cancelled through its `CancelHandle`.
    #[error("context canceled")]
    Canceled,
    /// The deadline attached to the context has passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Error enumeration for log-data operations.
#[derive(Error, PartialEq, Eq, Clone, Copy, Debug)]
pub enum LogDataError {
    /// No log-data bag was attached anywhere on the context chain.
    #[error("LogData was not initialized in this context")]
    Uninitialized,
}
