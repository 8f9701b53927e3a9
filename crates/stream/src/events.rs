// Observable consumer lifecycle events

use relay_models::StreamCursor;

/// Everything noteworthy a poll loop does, reported over an optional
/// channel so callers can observe recoveries, gaps, and degraded
/// persistence without parsing logs. The expected empty-timeout case is
/// the only condition that stays silent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    /// A batch was handled and the cursor advanced.
    Delivered { count: usize, cursor: StreamCursor },
    /// The handler rejected a batch; it will be refetched after backoff.
    HandlerFailed { cursor: StreamCursor, error: String },
    /// The source transport became unreachable.
    Disconnected { error: String },
    /// The source recovered after one or more connection failures.
    Reconnected,
    /// Entries after `from` were trimmed by the source before we
    /// consumed them. Data loss, reported exactly once per occurrence;
    /// `resume` is positioned just before the earliest surviving entry
    /// so delivery picks up with that entry.
    Gap {
        from: StreamCursor,
        resume: StreamCursor,
    },
    /// Saving the cursor failed. Delivery continues; a crash before the
    /// next successful save re-delivers from the older position.
    CheckpointFailed { error: String },
}
