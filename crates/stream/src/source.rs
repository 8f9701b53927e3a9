// Append-only stream source contract

use async_trait::async_trait;
use relay_models::{Batch, BlockTimeout, SourceError, StreamCursor};

/// An append-only sequence of entries addressable by cursor.
///
/// `fetch` is the single suspension point of a poll loop: it returns
/// entries strictly after `after`, at most `max_count` of them, waiting
/// up to `block` for the first one to appear. An empty batch on timeout
/// is normal, not an error.
#[async_trait]
pub trait StreamSource: Send {
    async fn fetch(
        &mut self,
        after: &StreamCursor,
        max_count: usize,
        block: BlockTimeout,
    ) -> Result<Batch, SourceError>;

    /// Oldest position the source still holds. Used to catch up after
    /// the source trimmed past our cursor.
    async fn earliest(&mut self) -> Result<Option<StreamCursor>, SourceError>;

    /// Newest position currently in the source. Used to resolve an
    /// `End` start position.
    async fn latest(&mut self) -> Result<Option<StreamCursor>, SourceError>;
}
