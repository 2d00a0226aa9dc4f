//! Async runtime facade for the collection sync workspace.
//!
//! Every other crate in the workspace reaches the executor through this
//! crate instead of depending on Tokio directly, so the runtime choice lives
//! in exactly one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and execution
//! - `time`: Sleep, timeout, duration, instant
//! - `sync`: Locks, channels, semaphores and cancellation tokens
//! - `runtime`: Blocking entry points for tests and binaries
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
