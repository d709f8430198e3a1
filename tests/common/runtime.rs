//! Runtime helpers for synchronous BDD steps.
//!
//! Steps run outside any async context, so each one that drives the library
//! builds a current-thread runtime with a paused clock. Sleeps and poll
//! intervals then complete as soon as every task is idle, keeping backoff and
//! status-poll scenarios instant and deterministic.
//!
//! ```rust
//! #[path = "common/runtime.rs"]
//! mod runtime;
//! ```

use tokio::runtime::{Builder, Runtime};

/// Builds a single-threaded runtime whose clock starts paused.
pub fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("paused runtime should build: {err}"))
}
