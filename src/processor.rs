//! Processing capabilities.
//!
//! A worker doesn't know what its items mean; it is handed a single-method
//! capability that turns an input into an output (or an error). Any async
//! closure with the right shape implements these traits.

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by a processing capability.
pub type ProcessFuture<O> = Pin<Box<dyn Future<Output = anyhow::Result<O>> + Send + 'static>>;

/// Processes one item for a standalone [`Worker`](crate::Worker).
pub trait Processor<I, O>: Send + Sync + 'static {
    fn process(&self, item: I) -> ProcessFuture<O>;
}

impl<I, O, F, Fut> Processor<I, O> for F
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    fn process(&self, item: I) -> ProcessFuture<O> {
        Box::pin((self)(item))
    }
}

/// Processes one item on behalf of a partition of a
/// [`PartitionRegistry`](crate::PartitionRegistry). Receives the partition key.
pub trait PartitionProcessor<I, O>: Send + Sync + 'static {
    fn process(&self, key: String, item: I) -> ProcessFuture<O>;
}

impl<I, O, F, Fut> PartitionProcessor<I, O> for F
where
    F: Fn(String, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    fn process(&self, key: String, item: I) -> ProcessFuture<O> {
        Box::pin((self)(key, item))
    }
}
