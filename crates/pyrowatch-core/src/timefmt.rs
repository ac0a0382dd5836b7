// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Wire timestamp conventions.
//!
//! Every timestamp in the system is UTC. The wire formats deliberately omit
//! a timezone suffix; clients must treat the values as UTC.
//!
//! | Context | Format |
//! |---|---|
//! | JSON bodies | `2025-11-29T06:02:35.123456` |
//! | CSV export | `2025-11-29 06:02:35` |
//! | Query parameters | `2025-11-29T06:02:35` |
//! | Database column | `2025-11-29 06:02:35.123456` |

use chrono::{DateTime, NaiveDateTime, Utc};

/// JSON timestamp format, microsecond precision, no timezone suffix.
pub const JSON_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// CSV timestamp format, second precision.
pub const CSV_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Query-parameter timestamp format (`start_date` / `end_date`).
pub const QUERY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Database text column format. Lexicographic order equals chronological
/// order, which the range queries rely on.
pub const DB_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Formats an instant for JSON bodies.
pub fn to_json(ts: DateTime<Utc>) -> String {
    ts.format(JSON_FORMAT).to_string()
}

/// Formats an instant for CSV rows.
pub fn to_csv(ts: DateTime<Utc>) -> String {
    ts.format(CSV_FORMAT).to_string()
}

/// Formats an instant for the database column.
pub fn to_db(ts: DateTime<Utc>) -> String {
    ts.format(DB_FORMAT).to_string()
}

/// Parses a query-parameter timestamp (UTC, no suffix).
pub fn parse_query(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s.trim(), QUERY_FORMAT).map(|naive| naive.and_utc())
}

/// Parses a database column value.
pub fn parse_db(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, DB_FORMAT).map(|naive| naive.and_utc())
}

/// Serde helpers emitting the JSON wire format.
pub mod serde_micros {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes a UTC instant in the JSON wire format.
    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_json(*ts))
    }

    /// Deserializes a UTC instant from the JSON wire format.
    ///
    /// Accepts second- and microsecond-precision values.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, JSON_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&s, QUERY_FORMAT))
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 29, 6, 2, 35).unwrap() + chrono::Duration::microseconds(123_456)
    }

    #[test]
    fn test_json_format() {
        assert_eq!(to_json(instant()), "2025-11-29T06:02:35.123456");
    }

    #[test]
    fn test_csv_format() {
        assert_eq!(to_csv(instant()), "2025-11-29 06:02:35");
    }

    #[test]
    fn test_db_round_trip() {
        let ts = instant();
        assert_eq!(parse_db(&to_db(ts)).unwrap(), ts);
    }

    #[test]
    fn test_query_parse() {
        let ts = parse_query("2025-11-29T06:02:35").unwrap();
        assert_eq!(to_csv(ts), "2025-11-29 06:02:35");
        assert!(parse_query("29/11/2025").is_err());
    }

    #[test]
    fn test_db_order_is_chronological() {
        let early = instant();
        let late = early + chrono::Duration::microseconds(1);
        assert!(to_db(early) < to_db(late));
    }
}
