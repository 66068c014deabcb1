//! # autoworker
//!
//! In-process, per-key serialized work dispatcher.
//!
//! A [`Worker`] drains one FIFO with at most one active loop, so its items
//! are processed one at a time in submission order. A [`PartitionRegistry`]
//! keeps one worker per partition key, creating them on demand and dropping
//! them once they go idle. Items under different keys run in parallel.
//!
//! ```no_run
//! # async fn demo() {
//! use autoworker::PartitionRegistry;
//!
//! let registry = PartitionRegistry::new(|account: String, delta: i64| async move {
//!     Ok::<_, anyhow::Error>(format!("{account}:{delta}"))
//! });
//!
//! registry.submit("acct-1", 5);
//! let outcome = registry.submit_and_await("acct-1", -2).await;
//! assert_eq!(outcome.value().map(String::as_str), Some("acct-1:-2"));
//! # }
//! ```

pub mod config;
pub mod error;
pub mod outcome;
pub mod processor;
pub mod registry;
pub mod telemetry;
pub mod worker;

pub use error::Failure;
pub use outcome::WorkerResult;
pub use processor::{PartitionProcessor, Processor};
pub use registry::PartitionRegistry;
pub use worker::{Completion, IdleHook, Worker, WorkerId};
