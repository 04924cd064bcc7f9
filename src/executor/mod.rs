//! executor is the core module of the library, it spawns contained background
//! tasks, reports their failures and joins them on shutdown.

pub mod async_executor;
pub mod options;
pub mod panic_capture;
pub mod sink;
pub mod wait_group;

pub(crate) mod runtime;

pub use async_executor::{AsyncExecutor, AsyncExecutorBuilder};
pub use runtime::RuntimeKind;
