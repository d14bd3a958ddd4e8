use async_trait::async_trait;

use crate::{ChainResult, EventEnvelope};

/// A lazy, restartable sequence of light-client events.
///
/// Delivery is at-least-once: consumers must de-duplicate by
/// [`EventEnvelope::dedup_key`]. A source that returns `Ok(None)` is
/// exhausted and must be restarted before yielding again; after transport
/// errors the consumer is expected to restart from its last processed
/// block and reconcile state by direct reads.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// The next event, `Ok(None)` when the current sequence is exhausted.
    async fn next_event(&mut self) -> ChainResult<Option<EventEnvelope>>;

    /// Restart the sequence so it replays from `block_number` onward.
    async fn restart_from(&mut self, block_number: u64) -> ChainResult<()>;
}
