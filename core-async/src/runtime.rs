//! Runtime entry points.
//!
//! `block_on` drives a future to completion on a fresh current-thread
//! runtime. It backs the `#[core_async::test]` and `#[core_async::main]`
//! attributes.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion using a lightweight runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be constructed, which only happens when the
/// process is out of file descriptors or threads.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}
