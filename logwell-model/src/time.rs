//! Flexible timestamp codec.
//!
//! Timestamps arrive either as unix nanoseconds (a bare integer) or as
//! RFC 3339 text with optional sub-second precision. They are always
//! emitted as RFC 3339 with nanoseconds.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::TimeParseError;

/// Parse a timestamp from either unix nanoseconds or RFC 3339 text.
pub fn parse_flexible(input: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimeParseError(input.to_string()));
    }
    if trimmed
        .strip_prefix('-')
        .unwrap_or(trimmed)
        .bytes()
        .all(|b| b.is_ascii_digit())
    {
        let nanos: i64 = trimmed
            .parse()
            .map_err(|_| TimeParseError(input.to_string()))?;
        return Ok(DateTime::from_timestamp_nanos(nanos));
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TimeParseError(input.to_string()))
}

/// Format as RFC 3339 with nanosecond precision and a `Z` suffix.
pub fn format_rfc3339_nanos(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Serde codec for timestamp fields: emits RFC 3339 nanoseconds, accepts
/// either an integer (unix nanoseconds) or RFC 3339 text.
pub mod serde_flex {
    use std::fmt;

    use chrono::{DateTime, Utc};
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_rfc3339_nanos(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FlexVisitor)
    }

    struct FlexVisitor;

    impl<'de> Visitor<'de> for FlexVisitor {
        type Value = DateTime<Utc>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("unix nanoseconds or an RFC 3339 timestamp")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(DateTime::from_timestamp_nanos(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            let nanos =
                i64::try_from(v).map_err(|_| E::custom("timestamp out of range"))?;
            Ok(DateTime::from_timestamp_nanos(nanos))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            super::parse_flexible(v).map_err(E::custom)
        }
    }
}

/// Same codec for `Option<DateTime<Utc>>` fields.
pub mod serde_flex_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    struct Wrapper(#[serde(with = "super::serde_flex")] DateTime<Utc>);

    pub fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ts {
            Some(ts) => super::serde_flex::serialize(ts, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
    }
}
