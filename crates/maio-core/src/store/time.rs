//! Timestamp encoding for TEXT columns.
//!
//! Timestamps are written as RFC 3339 UTC with exactly six fractional digits
//! and a `Z` suffix, so string comparison in SQL orders them chronologically.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

pub(crate) fn to_sql(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_sql(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|at| at.with_timezone(&Utc))
}

/// Current time at storage precision.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    from_sql(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn column_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        from_sql(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_width_encoding() {
        let whole = Utc.with_ymd_and_hms(2024, 5, 8, 10, 0, 0).unwrap();
        assert_eq!(to_sql(&whole), "2024-05-08T10:00:00.000000Z");
        let later = whole + chrono::Duration::microseconds(5);
        assert!(to_sql(&whole) < to_sql(&later));
    }

    #[test]
    fn test_now_survives_storage() {
        let at = now();
        assert_eq!(from_sql(&to_sql(&at)).unwrap(), at);
    }
}
