//! Layer 0: Time primitives
//!
//! Timestamp: a UTC instant, rendered as RFC 3339 in metadata and in the
//! ISO-8601 basic form inside entry ids.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use super::error::CoreError;

/// Basic form used inside ids: no `:` so the id delimiter stays unambiguous.
const COMPACT: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second].[subsecond digits:9]Z");

/// UTC instant with nanosecond precision.
///
/// Always normalized to UTC and limited to four-digit years, so both
/// renderings are total.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn from_datetime(dt: OffsetDateTime) -> Result<Self, CoreError> {
        let dt = dt.to_offset(UtcOffset::UTC);
        if !(0..=9999).contains(&dt.year()) {
            return Err(CoreError::InvalidTimestamp {
                raw: dt.to_string(),
                reason: "year out of range".into(),
            });
        }
        Ok(Self(dt))
    }

    pub fn from_unix_millis(ms: i64) -> Result<Self, CoreError> {
        let dt = OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).map_err(
            |e| CoreError::InvalidTimestamp {
                raw: ms.to_string(),
                reason: e.to_string(),
            },
        )?;
        Self::from_datetime(dt)
    }

    /// Parse an RFC 3339 string; other offsets are normalized to UTC.
    pub fn parse_rfc3339(raw: &str) -> Result<Self, CoreError> {
        let dt = OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| CoreError::InvalidTimestamp {
            raw: raw.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_datetime(dt)
    }

    /// Parse the basic form embedded in entry ids.
    pub fn parse_compact(raw: &str) -> Result<Self, CoreError> {
        let dt = time::PrimitiveDateTime::parse(raw, COMPACT).map_err(|e| {
            CoreError::InvalidTimestamp {
                raw: raw.to_string(),
                reason: e.to_string(),
            }
        })?;
        Self::from_datetime(dt.assume_utc())
    }

    pub fn to_rfc3339(&self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.to_string())
    }

    pub fn to_compact(&self) -> String {
        self.0
            .format(COMPACT)
            .unwrap_or_else(|_| self.0.to_string())
    }

    pub fn as_datetime(&self) -> OffsetDateTime {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.to_rfc3339())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}
