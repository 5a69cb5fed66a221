// crates/tracehub-core/src/time.rs
// ============================================================================
// Module: TraceHub Time
// Description: UTC wall-clock timestamp used across the entity model.
// Purpose: Wrap `time::OffsetDateTime` with RFC3339 serialization and the
//          helpers the projection/decision engines need for ordering.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! All persisted timestamps are UTC with subsecond precision. `Timestamp`
//! wraps [`time::OffsetDateTime`] rather than re-deriving a calendar type,
//! and serializes as RFC3339 so the SQLite store can keep timestamps as
//! sortable `TEXT` columns.

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A UTC timestamp with subsecond precision.
///
/// # Invariants
/// - Always normalized to UTC (offset zero) on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Wraps an existing offset date-time, normalizing it to UTC.
    #[must_use]
    pub fn new(value: OffsetDateTime) -> Self {
        Self(value.to_offset(time::UtcOffset::UTC))
    }

    /// Returns the current wall-clock time. Callers at the service boundary
    /// use this; the engine itself never calls it directly so that decision
    /// logic stays reproducible from explicit inputs in tests.
    #[must_use]
    pub fn now() -> Self {
        Self::new(OffsetDateTime::now_utc())
    }

    /// Returns the wrapped `OffsetDateTime`.
    #[must_use]
    pub const fn as_offset_date_time(&self) -> OffsetDateTime {
        self.0
    }

    /// Formats the timestamp as RFC3339.
    ///
    /// # Errors
    /// Returns an error if the underlying formatter fails, which only
    /// happens for out-of-range components that cannot occur here.
    pub fn to_rfc3339(&self) -> Result<String, time::error::Format> {
        self.0.format(&Rfc3339)
    }

    /// Parses an RFC3339 string into a `Timestamp`.
    ///
    /// # Errors
    /// Returns an error if `value` is not valid RFC3339.
    pub fn parse_rfc3339(value: &str) -> Result<Self, time::error::Parse> {
        OffsetDateTime::parse(value, &Rfc3339).map(Self::new)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "<unformattable timestamp>"),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = self
            .to_rfc3339()
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&text).map_err(serde::de::Error::custom)
    }
}
