// Cursor persistence backends

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use relay_models::{CursorError, StreamCursor};

/// External persistence for a single stream's cursor.
///
/// `load` is called once at startup, `save` after each fully handled
/// batch. Each stream owns its checkpoint exclusively; no two consumers
/// may advance the same one concurrently.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self) -> Result<Option<StreamCursor>, CursorError>;
    async fn save(&self, cursor: &StreamCursor) -> Result<(), CursorError>;
}

#[async_trait]
impl CursorStore for Box<dyn CursorStore> {
    async fn load(&self) -> Result<Option<StreamCursor>, CursorError> {
        (**self).load().await
    }

    async fn save(&self, cursor: &StreamCursor) -> Result<(), CursorError> {
        (**self).save(cursor).await
    }
}

/// In-memory store for tests and ephemeral consumers.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursor: Mutex<Option<StreamCursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: StreamCursor) -> Self {
        Self {
            cursor: Mutex::new(Some(cursor)),
        }
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self) -> Result<Option<StreamCursor>, CursorError> {
        Ok(*self.cursor.lock().unwrap_or_else(|e| e.into_inner()))
    }

    async fn save(&self, cursor: &StreamCursor) -> Result<(), CursorError> {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner()) = Some(*cursor);
        Ok(())
    }
}

/// Single cursor token in a file, written atomically via tmp + rename.
#[derive(Debug)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self) -> Result<Option<StreamCursor>, CursorError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(token) => {
                let cursor: StreamCursor = token.trim().parse()?;
                Ok(Some(cursor))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, cursor: &StreamCursor) -> Result<(), CursorError> {
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, cursor.to_string()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Cursor kept in a plain Redis key, one key per stream. The
/// connection is cached and re-established lazily after a failure,
/// like the stream source's.
pub struct RedisCursorStore {
    client: Client,
    key: String,
    conn: Mutex<Option<redis::aio::MultiplexedConnection>>,
}

impl RedisCursorStore {
    pub fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, CursorError> {
        let client = Client::open(redis_url).map_err(|e| CursorError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            key: key.into(),
            conn: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CursorError> {
        let cached = self.conn.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }
        let conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| CursorError::Backend(e.to_string()))?;
        *self.conn.lock().unwrap_or_else(|e| e.into_inner()) = Some(conn.clone());
        Ok(conn)
    }

    fn drop_connection(&self, err: redis::RedisError) -> CursorError {
        *self.conn.lock().unwrap_or_else(|e| e.into_inner()) = None;
        CursorError::Backend(err.to_string())
    }
}

#[async_trait]
impl CursorStore for RedisCursorStore {
    async fn load(&self) -> Result<Option<StreamCursor>, CursorError> {
        let mut conn = self.connection().await?;
        let result: Result<Option<String>, redis::RedisError> = conn.get(&self.key).await;
        match result.map_err(|e| self.drop_connection(e))? {
            Some(token) => Ok(Some(token.trim().parse()?)),
            None => Ok(None),
        }
    }

    async fn save(&self, cursor: &StreamCursor) -> Result<(), CursorError> {
        let mut conn = self.connection().await?;
        let result: Result<(), redis::RedisError> =
            conn.set(&self.key, cursor.to_string()).await;
        result.map_err(|e| self.drop_connection(e))
    }
}
