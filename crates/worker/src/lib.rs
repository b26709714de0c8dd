#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Worker runtime primitives for background document work.
//!
//! The central type is [`ScopedPool`]: an unbounded FIFO queue feeding at most
//! `max_concurrency` blocking jobs at a time. Every job belongs to a scope (for
//! example one editor view) and a subject (for example one document). Closing a
//! scope or cancelling a subject drops its pending jobs outright, lets running
//! jobs finish, and guarantees their outputs are never delivered.
//!
//! ```text
//! submit() ──► pending (FIFO) ──► running (≤ max_concurrency) ──► per-scope completions
//!                   ▲                       │                            │
//!                   └── close_scope() drops ┘ discard-on-finish          └── take_completed()
//! ```
//!
//! Jobs run on the blocking pool of the ambient tokio runtime, or on a lazily
//! built global runtime when the caller has none.

mod panic;
mod pool;
mod runtime;

pub use panic::panic_message;
pub use pool::{Completion, DrainReport, JobId, JobPanic, PoolConfig, PoolStats, ScopedPool};
pub use runtime::{runtime_handle, spawn_blocking};
