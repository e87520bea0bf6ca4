//! Persisted timestamp format.
//!
//! All timestamps are stored as `YYYY-MM-DD HH:MM:SS` in UTC, with no
//! zone suffix and whole-second precision. [`parse_db_timestamp`] is the
//! only place that turns such a string back into a [`DateTime<Utc>`].

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use thiserror::Error;

/// `strftime` pattern of the persisted format.
pub const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
#[error("invalid timestamp {input:?}, expected YYYY-MM-DD HH:MM:SS")]
pub struct InvalidTimestamp {
    pub input: String,
    #[source]
    source: chrono::ParseError,
}

/// Parse a persisted `YYYY-MM-DD HH:MM:SS` string, interpreting it as UTC.
///
/// Surrounding whitespace is ignored. Anything else (a `T` separator, a
/// zone suffix, fractional seconds) is rejected.
pub fn parse_db_timestamp(input: &str) -> Result<DateTime<Utc>, InvalidTimestamp> {
    NaiveDateTime::parse_from_str(input.trim(), DB_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|source| InvalidTimestamp {
            input: input.to_string(),
            source,
        })
}

/// Render a timestamp in the persisted format.
pub fn format_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(DB_TIMESTAMP_FORMAT).to_string()
}

/// Current time truncated to the persisted precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// `#[serde(with = ...)]` adapter for `DateTime<Utc>` fields.
pub mod db_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_db_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_db_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = ...)]` adapter for `Option<DateTime<Utc>>` fields.
pub mod db_timestamp_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_some(&super::format_db_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => super::parse_db_timestamp(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
