//! Serde adapters for configuration values
//!
//! Durations in configuration files and health payloads are plain integer
//! milliseconds, matching the `*_ms` key names.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a `Duration` as integer milliseconds.
///
/// ```rust
/// use std::time::Duration;
///
/// use erpshield_common::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Backend {
///     #[serde(rename = "api_timeout_ms", with = "duration_millis")]
///     api_timeout: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::*;

    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Like [`duration_millis`] for optional values; absent or `null` is `None`.
///
/// Pair with `#[serde(default)]` so that a missing key deserializes.
pub mod option_duration_millis {
    use super::*;

    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for serialization utilities

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Timeouts {
        #[serde(with = "duration_millis")]
        api: Duration,
        #[serde(default, with = "option_duration_millis")]
        grace: Option<Duration>,
    }

    /// Tests that durations are written as integer milliseconds.
    #[test]
    fn test_duration_written_as_millis() {
        let value = Timeouts { api: Duration::from_millis(1500), grace: None };
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"api":1500,"grace":null}"#);
    }

    /// Tests that a missing optional duration defaults to `None`.
    #[test]
    fn test_missing_optional_duration() {
        let parsed: Timeouts = serde_json::from_str(r#"{"api":30000}"#).unwrap();
        assert_eq!(parsed, Timeouts { api: Duration::from_secs(30), grace: None });

        let parsed: Timeouts = serde_json::from_str(r#"{"api":0,"grace":60000}"#).unwrap();
        assert_eq!(parsed.grace, Some(Duration::from_secs(60)));
    }
}
