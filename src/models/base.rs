//! Base Model - identity and timestamps shared by every record
//!
//! TigerStyle: ids are assigned once, timestamps are owned by the model.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Serialized timestamp format (ISO-8601, no offset, always UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Accepted timestamp format when parsing (fraction optional)
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Sub-second digits kept on every timestamp
pub const TIMESTAMP_SUBSEC_DIGITS: u16 = 6;

/// Current time at the precision both backends can store.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(TIMESTAMP_SUBSEC_DIGITS)
}

/// Fresh globally unique identifier.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// BaseModel
// =============================================================================

/// Identity and timestamp bookkeeping embedded in every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseModel {
    /// Unique identifier (UUID v4), never reassigned
    #[serde(default = "new_id")]
    pub id: String,
    /// Creation timestamp
    #[serde(default = "now", with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last mutating save
    #[serde(default = "now", with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl BaseModel {
    /// New identity stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        let stamp = now();
        Self {
            id: new_id(),
            created_at: stamp,
            updated_at: stamp,
        }
    }

    /// Refresh `updated_at`. Time never moves backwards for a record.
    pub fn touch(&mut self) {
        let stamp = now();
        if stamp > self.updated_at {
            self.updated_at = stamp;
        }
    }
}

impl Default for BaseModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Serde adapter for the ISO-8601 timestamp format.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{TIMESTAMP_FORMAT, TIMESTAMP_PARSE_FORMAT};

    /// Serialize as `%Y-%m-%dT%H:%M:%S%.6f`.
    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    /// Deserialize from the serialized format or full RFC 3339.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    /// Parse a timestamp string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw, TIMESTAMP_PARSE_FORMAT)
            .map(|naive| naive.and_utc())
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_base_has_matching_timestamps() {
        let base = BaseModel::new();
        assert!(!base.id.is_empty());
        assert_eq!(base.created_at, base.updated_at);
    }

    #[test]
    fn test_now_is_microsecond_precision() {
        let stamp = now();
        assert_eq!(stamp.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_touch_moves_forward() {
        let mut base = BaseModel::new();
        let before = base.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        base.touch();
        assert!(base.updated_at > before);
        assert_eq!(base.created_at, before);
    }

    #[test]
    fn test_timestamp_parse_formats() {
        let with_fraction = timestamp::parse("2017-09-28T21:05:54.119427").unwrap();
        assert_eq!(with_fraction.timestamp_subsec_micros(), 119_427);

        let without_fraction = timestamp::parse("2017-09-28T21:05:54").unwrap();
        assert_eq!(without_fraction.timestamp_subsec_nanos(), 0);

        let rfc = timestamp::parse("2017-09-28T21:05:54.5+00:00").unwrap();
        assert_eq!(rfc.timestamp_subsec_millis(), 500);

        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let base = BaseModel {
            id: "abc".to_string(),
            created_at: timestamp::parse("2017-09-28T21:05:54.119427").unwrap(),
            updated_at: timestamp::parse("2017-09-28T21:05:54").unwrap(),
        };
        let value = serde_json::to_value(&base).unwrap();
        assert_eq!(value["created_at"], "2017-09-28T21:05:54.119427");
        assert_eq!(value["updated_at"], "2017-09-28T21:05:54.000000");
    }
}
