//! Time utilities: sleeping, timeouts and monotonic instants.

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Error returned by [`timeout`] when the deadline elapses.
pub use tokio::time::error::Elapsed;
