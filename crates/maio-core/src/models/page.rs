//! Cursor pagination types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MaioError, Result};

/// Position after a `(created_at, id)` pair.
///
/// Encoded as hex of `"<rfc3339 micros>|<id>"`, which keeps it opaque to
/// callers while staying trivially decodable here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: i64,
}

impl Cursor {
    pub fn encode(&self) -> String {
        let raw = format!("{}|{}", crate::store::time::to_sql(&self.created_at), self.id);
        hex::encode(raw)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let invalid = || MaioError::validation("cursor", "malformed cursor");
        let bytes = hex::decode(token).map_err(|_| invalid())?;
        let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (ts, id) = raw.split_once('|').ok_or_else(invalid)?;
        Ok(Self {
            created_at: crate::store::time::from_sql(ts).map_err(|_| invalid())?,
            id: id.parse().map_err(|_| invalid())?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

/// Page request: where to start and how many items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PageRequest {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_decodes_what_it_encodes() {
        let cursor = Cursor {
            created_at: crate::store::time::from_sql("2024-05-08T10:00:00.123456Z").unwrap(),
            id: 42,
        };
        assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);
    }

    #[test]
    fn test_garbage_cursor_is_validation_error() {
        let err = Cursor::decode("not-hex").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let err = Cursor::decode(&hex::encode("no separator")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
