use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CursorParseError;

/// Position marker within a single stream.
///
/// Concretely this is a Redis stream id: a millisecond timestamp plus a
/// per-millisecond sequence number. Cursors are totally ordered by
/// `(ms, seq)` and serialize as the opaque `"ms-seq"` token, so callers
/// never need to look inside one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StreamCursor {
    ms: u64,
    seq: u64,
}

impl StreamCursor {
    /// Sorts before every id a stream can produce.
    pub const ZERO: StreamCursor = StreamCursor { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// The position immediately before this one, so that a
    /// read-strictly-after at the result delivers this entry itself.
    pub fn before(&self) -> StreamCursor {
        match (self.ms, self.seq) {
            (0, 0) => StreamCursor::ZERO,
            (ms, 0) => StreamCursor { ms: ms - 1, seq: u64::MAX },
            (ms, seq) => StreamCursor { ms, seq: seq - 1 },
        }
    }

    /// Wall-clock time encoded in the id, if representable.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(i64::try_from(self.ms).ok()?).single()
    }
}

impl fmt::Display for StreamCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamCursor {
    type Err = CursorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CursorParseError(s.to_string());
        match s.split_once('-') {
            Some((ms, seq)) => Ok(StreamCursor {
                ms: ms.parse().map_err(|_| invalid())?,
                seq: seq.parse().map_err(|_| invalid())?,
            }),
            // Redis accepts a bare millisecond part, implying sequence 0
            None => Ok(StreamCursor {
                ms: s.parse().map_err(|_| invalid())?,
                seq: 0,
            }),
        }
    }
}

impl From<StreamCursor> for String {
    fn from(cursor: StreamCursor) -> String {
        cursor.to_string()
    }
}

impl TryFrom<String> for StreamCursor {
    type Error = CursorParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Where a consumer begins reading when it starts up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    /// Everything the stream still holds, from the oldest entry.
    Beginning,
    /// Only entries appended after startup.
    End,
    /// Resume from the persisted cursor, falling back to `Beginning`
    /// when nothing has been saved yet.
    Saved,
}

impl Default for StartPosition {
    fn default() -> Self {
        StartPosition::Saved
    }
}

/// How long one fetch may wait for the first entry to appear.
///
/// Redis overloads `BLOCK 0` to mean "wait forever"; this enum names the
/// three cases so that convention stays confined to the transport adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTimeout {
    /// Return immediately, empty-handed if nothing is pending.
    NoWait,
    /// Wait up to the given duration.
    For(Duration),
    /// Wait until an entry arrives.
    Indefinite,
}

impl BlockTimeout {
    /// Configuration mapping: absent means wait forever, zero means
    /// return immediately.
    pub fn from_millis(ms: Option<u64>) -> Self {
        match ms {
            None => BlockTimeout::Indefinite,
            Some(0) => BlockTimeout::NoWait,
            Some(ms) => BlockTimeout::For(Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_token_round_trip() {
        let cursor: StreamCursor = "1717171717000-42".parse().unwrap();
        assert_eq!(cursor, StreamCursor::new(1_717_171_717_000, 42));
        assert_eq!(cursor.to_string(), "1717171717000-42");
    }

    #[test]
    fn test_cursor_bare_millisecond_form() {
        let cursor: StreamCursor = "1717171717000".parse().unwrap();
        assert_eq!(cursor, StreamCursor::new(1_717_171_717_000, 0));
    }

    #[test]
    fn test_cursor_rejects_garbage() {
        assert!("".parse::<StreamCursor>().is_err());
        assert!("abc-1".parse::<StreamCursor>().is_err());
        assert!("1-2-3".parse::<StreamCursor>().is_err());
        assert!("$".parse::<StreamCursor>().is_err());
    }

    #[test]
    fn test_cursor_ordering() {
        let a = StreamCursor::new(1, 5);
        let b = StreamCursor::new(2, 0);
        let c = StreamCursor::new(2, 1);
        assert!(StreamCursor::ZERO < a);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_cursor_before() {
        assert_eq!(StreamCursor::new(5, 3).before(), StreamCursor::new(5, 2));
        assert_eq!(StreamCursor::new(5, 0).before(), StreamCursor::new(4, u64::MAX));
        assert_eq!(StreamCursor::ZERO.before(), StreamCursor::ZERO);
        // a read strictly after `before(x)` must include x
        let x = StreamCursor::new(5, 0);
        assert!(x.before() < x);
    }

    #[test]
    fn test_cursor_serializes_as_opaque_token() {
        let cursor = StreamCursor::new(12, 7);
        let json = serde_json::to_string(&cursor).unwrap();
        assert_eq!(json, "\"12-7\"");
        let back: StreamCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cursor);
    }

    #[test]
    fn test_start_position_from_config_string() {
        let pos: StartPosition = serde_json::from_str("\"beginning\"").unwrap();
        assert_eq!(pos, StartPosition::Beginning);
        let pos: StartPosition = serde_json::from_str("\"end\"").unwrap();
        assert_eq!(pos, StartPosition::End);
        let pos: StartPosition = serde_json::from_str("\"saved\"").unwrap();
        assert_eq!(pos, StartPosition::Saved);
    }

    #[test]
    fn test_block_timeout_mapping() {
        assert_eq!(BlockTimeout::from_millis(None), BlockTimeout::Indefinite);
        assert_eq!(BlockTimeout::from_millis(Some(0)), BlockTimeout::NoWait);
        assert_eq!(
            BlockTimeout::from_millis(Some(250)),
            BlockTimeout::For(Duration::from_millis(250))
        );
    }
}
