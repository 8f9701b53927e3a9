// Redis streams transport: XREAD-backed source and XADD producer

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamMaxlen, StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, RedisError, Value};
use relay_models::{Batch, BlockTimeout, Entry, SourceError, StreamCursor};
use tracing::{debug, warn};

use crate::source::StreamSource;

/// Key namespace prefix used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "RD";

fn namespaced_key(namespace: &str, stream_key: &str) -> String {
    if namespace.is_empty() {
        stream_key.to_string()
    } else {
        format!("{namespace}.{stream_key}")
    }
}

/// `BLOCK` argument for one fetch; `None` omits the option entirely.
/// Bounded waits round up to a whole millisecond: sending 0 would flip
/// the meaning to Redis's wait-forever.
fn block_millis(block: BlockTimeout) -> Option<usize> {
    match block {
        BlockTimeout::NoWait => None,
        BlockTimeout::For(wait) => Some((wait.as_millis() as usize).max(1)),
        // Redis convention: BLOCK 0 waits forever
        BlockTimeout::Indefinite => Some(0),
    }
}

/// `StreamSource` over a Redis stream, one `XREAD` per fetch.
///
/// The connection is re-established lazily after a transport failure.
/// After every (re)connect the stream's `max-deleted-entry-id` is
/// checked against the caller's cursor so a trim that happened while we
/// were away surfaces as `InvalidCursor` instead of a silent skip.
pub struct RedisStreamSource {
    client: Client,
    key: String,
    conn: Option<MultiplexedConnection>,
    check_trim: bool,
}

impl RedisStreamSource {
    pub fn new(redis_url: &str, namespace: &str, stream_key: &str) -> Result<Self, SourceError> {
        let client = Client::open(redis_url).map_err(SourceError::connection)?;
        Ok(Self {
            client,
            key: namespaced_key(namespace, stream_key),
            conn: None,
            check_trim: true,
        })
    }

    /// Full Redis key this source reads from.
    pub fn key(&self) -> &str {
        &self.key
    }

    async fn connection(&mut self) -> Result<MultiplexedConnection, SourceError> {
        if let Some(conn) = &self.conn {
            return Ok(conn.clone());
        }
        debug!("🔌 Connecting to Redis for stream {}", self.key);
        let conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(SourceError::connection)?;
        self.conn = Some(conn.clone());
        Ok(conn)
    }

    fn drop_connection(&mut self, err: RedisError) -> SourceError {
        warn!("🔌 Redis connection lost on {}: {}", self.key, err);
        self.conn = None;
        self.check_trim = true;
        SourceError::connection(err)
    }

    /// `max-deleted-entry-id` from `XINFO STREAM`, when the server
    /// exposes it. A missing stream or an older server yields `None`.
    async fn max_deleted_id(
        &mut self,
        conn: &mut MultiplexedConnection,
    ) -> Result<Option<StreamCursor>, SourceError> {
        let key = self.key.clone();
        let info: Result<HashMap<String, Value>, RedisError> = redis::cmd("XINFO")
            .arg("STREAM")
            .arg(&key)
            .query_async(conn)
            .await;
        let info = match info {
            Ok(info) => info,
            // stream does not exist yet, nothing can have been trimmed
            Err(e) if e.kind() == redis::ErrorKind::ResponseError => return Ok(None),
            Err(e) => return Err(self.drop_connection(e)),
        };
        let Some(value) = info.get("max-deleted-entry-id") else {
            return Ok(None);
        };
        let token: String = redis::from_redis_value(value).map_err(SourceError::connection)?;
        match token.parse::<StreamCursor>() {
            Ok(id) if id > StreamCursor::ZERO => Ok(Some(id)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl StreamSource for RedisStreamSource {
    async fn fetch(
        &mut self,
        after: &StreamCursor,
        max_count: usize,
        block: BlockTimeout,
    ) -> Result<Batch, SourceError> {
        let mut conn = self.connection().await?;

        if self.check_trim {
            self.check_trim = false;
            if *after != StreamCursor::ZERO {
                if let Some(deleted) = self.max_deleted_id(&mut conn).await? {
                    if deleted > *after {
                        let earliest = self.earliest().await?;
                        return Err(SourceError::InvalidCursor {
                            cursor: *after,
                            earliest,
                        });
                    }
                }
            }
        }

        let mut options = StreamReadOptions::default().count(max_count);
        if let Some(ms) = block_millis(block) {
            options = options.block(ms);
        }

        let key = self.key.clone();
        let position = after.to_string();
        let result: Result<Option<StreamReadReply>, RedisError> = conn
            .xread_options(&[&key], &[&position], &options)
            .await;
        let reply = result.map_err(|e| self.drop_connection(e))?;

        let mut batch = Batch::new();
        let Some(reply) = reply else {
            return Ok(batch);
        };
        for stream in reply.keys {
            for raw in stream.ids {
                let id = raw.id.parse().map_err(SourceError::connection)?;
                let mut fields = Vec::with_capacity(raw.map.len());
                for (name, value) in raw.map {
                    let value: String =
                        redis::from_redis_value(&value).map_err(SourceError::connection)?;
                    fields.push((name, value));
                }
                batch.push(Entry::new(id, fields));
            }
        }
        batch.sort_by_key(|entry| entry.id);
        Ok(batch)
    }

    async fn earliest(&mut self) -> Result<Option<StreamCursor>, SourceError> {
        let mut conn = self.connection().await?;
        let key = self.key.clone();
        let result: Result<StreamRangeReply, RedisError> =
            conn.xrange_count(&key, "-", "+", 1).await;
        let reply = result.map_err(|e| self.drop_connection(e))?;
        match reply.ids.first() {
            Some(id) => Ok(Some(id.id.parse().map_err(SourceError::connection)?)),
            None => Ok(None),
        }
    }

    async fn latest(&mut self) -> Result<Option<StreamCursor>, SourceError> {
        let mut conn = self.connection().await?;
        let key = self.key.clone();
        let result: Result<StreamRangeReply, RedisError> =
            conn.xrevrange_count(&key, "+", "-", 1).await;
        let reply = result.map_err(|e| self.drop_connection(e))?;
        match reply.ids.first() {
            Some(id) => Ok(Some(id.id.parse().map_err(SourceError::connection)?)),
            None => Ok(None),
        }
    }
}

/// `XADD` producer with approximate `MAXLEN` trimming, the write side
/// of the same namespaced stream keys.
pub struct RedisStreamProducer {
    client: Client,
    key: String,
    max_len: usize,
    conn: Option<MultiplexedConnection>,
}

impl RedisStreamProducer {
    pub fn new(
        redis_url: &str,
        namespace: &str,
        stream_key: &str,
        max_len: usize,
    ) -> Result<Self, SourceError> {
        let client = Client::open(redis_url).map_err(SourceError::connection)?;
        Ok(Self {
            client,
            key: namespaced_key(namespace, stream_key),
            max_len,
            conn: None,
        })
    }

    async fn connection(&mut self) -> Result<MultiplexedConnection, SourceError> {
        if let Some(conn) = &self.conn {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(SourceError::connection)?;
        self.conn = Some(conn.clone());
        Ok(conn)
    }

    /// Append to the configured stream; the returned cursor is the id
    /// Redis assigned.
    pub async fn send(&mut self, fields: &[(String, String)]) -> Result<StreamCursor, SourceError> {
        let key = self.key.clone();
        self.send_to_key(&key, fields).await
    }

    /// Append to an explicit stream under the same namespace rules.
    pub async fn send_to(
        &mut self,
        namespace: &str,
        stream_key: &str,
        fields: &[(String, String)],
    ) -> Result<StreamCursor, SourceError> {
        let key = namespaced_key(namespace, stream_key);
        self.send_to_key(&key, fields).await
    }

    async fn send_to_key(
        &mut self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<StreamCursor, SourceError> {
        let mut conn = self.connection().await?;
        let result: Result<String, RedisError> = conn
            .xadd_maxlen(key, StreamMaxlen::Approx(self.max_len), "*", fields)
            .await;
        let id = result.map_err(|e| {
            self.conn = None;
            SourceError::connection(e)
        })?;
        id.parse().map_err(SourceError::connection)
    }
}
