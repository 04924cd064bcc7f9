//! A "prelude" for users of the `async-keeper` crate.
//!
//! This prelude is similar to the standard library's prelude in that you'll
//! almost always want to import its entire contents, but unlike the standard
//! library's prelude you'll have to do so manually:
//!
//! ```
//! use async_keeper::prelude::*;
//! ```
//!
//! The prelude may grow over time as additional items see ubiquitous use.

pub use crate::context::log_data::{
    add_log_data, context_with_empty_log_data, context_with_log_data, log_data, LogData,
};
pub use crate::context::{detach, CancelHandle, Context};
pub use crate::error::*;
pub use crate::executor::options::{
    with_context_detachment, with_runtime, with_uninterrupted_context, AsyncOption, Options,
};
pub use crate::executor::panic_capture::{capture_panic, catch_panic, CatchPanic, TaskPanic};
pub use crate::executor::sink::{LogFacadeSink, LogSink};
pub use crate::executor::wait_group::{InFlight, WaitGroup};
pub use crate::executor::{AsyncExecutor, AsyncExecutorBuilder, RuntimeKind};

pub use anyhow::{anyhow, Result as AnyResult};
pub use thiserror::Error;

pub(crate) use log::{debug, error, trace, warn};
pub(crate) use smol::Timer as AsyncTimer;
pub(crate) use std::future::Future;
pub(crate) use tracing::{info_span, Instrument};
