// Cursor-tracked polling loop with at-least-once delivery

use std::time::Duration;

use anyhow::anyhow;
use relay_models::{Batch, BlockTimeout, RelayError, SourceError, StartPosition, StreamCursor};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::checkpoint::CursorStore;
use crate::events::ConsumerEvent;
use crate::handler::Handler;
use crate::source::StreamSource;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Stream name, used for logging and event context.
    pub stream_key: String,
    pub start_position: StartPosition,
    /// Upper bound on entries per fetch.
    pub max_batch: usize,
    /// Max wait per fetch for the first entry to appear.
    pub block_timeout: BlockTimeout,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Optional bound on one handler invocation; a timeout counts as a
    /// handler failure and the batch is retried.
    pub handler_timeout: Option<Duration>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream_key: "default".to_string(),
            start_position: StartPosition::Saved,
            max_batch: 100,
            block_timeout: BlockTimeout::For(Duration::from_secs(5)),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            handler_timeout: None,
        }
    }
}

/// Single-consumer polling loop.
///
/// Repeatedly fetches the batch after the current cursor, hands it to
/// the handler, and advances the cursor only once the whole batch was
/// handled. A batch is never partially acknowledged: on handler failure
/// the cursor stays put and the identical position is refetched after
/// backoff, which is what makes delivery at-least-once. Fetch and
/// handle are strictly sequential; the blocking fetch is the only
/// suspension point and is raced against the shutdown token so
/// cancellation is timely.
pub struct PollLoop<S, H, C> {
    source: S,
    handler: H,
    store: C,
    config: ConsumerConfig,
    shutdown: CancellationToken,
    events: Option<mpsc::UnboundedSender<ConsumerEvent>>,
}

impl<S, H, C> PollLoop<S, H, C>
where
    S: StreamSource,
    H: Handler,
    C: CursorStore,
{
    pub fn new(
        source: S,
        handler: H,
        store: C,
        config: ConsumerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            handler,
            store,
            config,
            shutdown,
            events: None,
        }
    }

    /// Report lifecycle events over the given channel.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ConsumerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Drive the loop until cancelled. Returns the final cursor, the id
    /// of the last entry of the last fully handled batch.
    pub async fn run(mut self) -> Result<StreamCursor, RelayError> {
        let mut cursor = self.resolve_start().await?;
        info!(
            "▶️  Consuming stream {} from cursor {}",
            self.config.stream_key, cursor
        );

        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);
        let mut disconnected = false;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let fetched = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.source.fetch(
                    &cursor,
                    self.config.max_batch,
                    self.config.block_timeout,
                ) => result,
            };

            let batch = match fetched {
                Ok(batch) => batch,
                Err(SourceError::Connection(err)) => {
                    error!("🔌 Stream source unreachable: {err}");
                    if !disconnected {
                        disconnected = true;
                        self.emit(ConsumerEvent::Disconnected { error: err });
                    }
                    if !self.sleep_backoff(&mut backoff).await {
                        break;
                    }
                    continue;
                }
                Err(SourceError::InvalidCursor { cursor: from, earliest }) => {
                    // trimmed past our position: entries are gone, report
                    // the gap once and catch up from the oldest survivor
                    let resume = match earliest {
                        Some(first) => first.before(),
                        None => StreamCursor::ZERO,
                    };
                    warn!(
                        "⚠️  Stream {} trimmed past cursor {from}, resuming at {resume}",
                        self.config.stream_key
                    );
                    self.emit(ConsumerEvent::Gap { from, resume });
                    cursor = resume;
                    // a source that keeps rejecting the cursor must not
                    // spin; pace the catch-up like the other error arms
                    if !self.sleep_backoff(&mut backoff).await {
                        break;
                    }
                    continue;
                }
            };

            if disconnected {
                disconnected = false;
                backoff.reset();
                info!("🔌 Stream source reachable again");
                self.emit(ConsumerEvent::Reconnected);
            }

            if batch.is_empty() {
                // fetch timed out with no new data, not an error
                debug!("⏳ No new entries on {}", self.config.stream_key);
                continue;
            }
            let Some(last_id) = batch.last().map(|entry| entry.id) else {
                continue;
            };

            match self.handle_batch(&batch).await {
                Ok(()) => {
                    cursor = last_id;
                    if let Err(e) = self.store.save(&cursor).await {
                        warn!("💾 Failed to persist cursor {cursor}: {e}");
                        self.emit(ConsumerEvent::CheckpointFailed {
                            error: e.to_string(),
                        });
                    }
                    backoff.reset();
                    debug!("✅ Delivered {} entries, cursor now {cursor}", batch.len());
                    self.emit(ConsumerEvent::Delivered {
                        count: batch.len(),
                        cursor,
                    });
                }
                Err(e) => {
                    warn!("🔁 Handler rejected batch at cursor {cursor}: {e}");
                    self.emit(ConsumerEvent::HandlerFailed {
                        cursor,
                        error: e.to_string(),
                    });
                    if !self.sleep_backoff(&mut backoff).await {
                        break;
                    }
                }
            }
        }

        info!(
            "🏁 Consumer for {} stopped at cursor {cursor}",
            self.config.stream_key
        );
        Ok(cursor)
    }

    async fn resolve_start(&mut self) -> Result<StreamCursor, RelayError> {
        match self.config.start_position {
            StartPosition::Beginning => Ok(StreamCursor::ZERO),
            StartPosition::Saved => {
                let saved = self.store.load().await?;
                Ok(saved.unwrap_or(StreamCursor::ZERO))
            }
            StartPosition::End => {
                let mut backoff =
                    Backoff::new(self.config.backoff_initial, self.config.backoff_max);
                loop {
                    match self.source.latest().await {
                        Ok(tail) => return Ok(tail.unwrap_or(StreamCursor::ZERO)),
                        Err(e) => {
                            warn!("🔌 Cannot resolve stream tail yet: {e}");
                            if !self.sleep_backoff(&mut backoff).await {
                                return Ok(StreamCursor::ZERO);
                            }
                        }
                    }
                }
            }
        }
    }

    async fn handle_batch(&mut self, batch: &Batch) -> anyhow::Result<()> {
        match self.config.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.handler.handle(batch)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!("handler exceeded {}ms time limit", limit.as_millis())),
            },
            None => self.handler.handle(batch).await,
        }
    }

    /// Sleep the next backoff delay; false means shutdown fired first.
    async fn sleep_backoff(&self, backoff: &mut Backoff) -> bool {
        let delay = backoff.next_delay();
        debug!("⏱️  Backing off for {}ms", delay.as_millis());
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn emit(&self, event: ConsumerEvent) {
        if let Some(events) = &self.events {
            // observer going away must not stop consumption
            let _ = events.send(event);
        }
    }
}
