use serde::{Deserialize, Serialize};

use crate::cursor::StreamCursor;

/// One immutable stream entry: its id plus a field/value payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: StreamCursor,
    pub fields: Vec<(String, String)>,
}

impl Entry {
    pub fn new(id: StreamCursor, fields: Vec<(String, String)>) -> Self {
        Self { id, fields }
    }

    /// First value stored under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// One fetch's worth of entries, in id order. May be empty when the
/// fetch timed out with no new data.
pub type Batch = Vec<Entry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_field_lookup() {
        let entry = Entry::new(
            StreamCursor::new(1, 0),
            vec![
                ("kind".to_string(), "doc".to_string()),
                ("body".to_string(), "hello".to_string()),
            ],
        );
        assert_eq!(entry.get("kind"), Some("doc"));
        assert_eq!(entry.get("body"), Some("hello"));
        assert_eq!(entry.get("missing"), None);
    }

    #[test]
    fn test_entry_serde_round_trip() {
        let entry = Entry::new(
            StreamCursor::new(7, 2),
            vec![("k".to_string(), "v".to_string())],
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
