//! Duration-string handling for configuration fields.
//!
//! Timeouts in the YAML schema and on the command line are written as
//! human-readable strings (`300ms`, `5m`, `1h30m`). Serde (de)serialization
//! goes through the same representation so a loaded config round-trips.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Parse a duration string such as `300ms`, `5m`, or `1h`.
///
/// # Arguments
/// * `text` - Human-readable duration
pub fn parse_duration(text: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(text)
}

/// Format a duration back into its human-readable form.
///
/// # Arguments
/// * `duration` - Duration to format
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

/// Serde deserializer for duration-string fields.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text: String = String::deserialize(deserializer)?;
    parse_duration(&text).map_err(serde::de::Error::custom)
}

/// Serde serializer for duration-string fields.
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_forms() {
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("five minutes?").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_round_trip() {
        for text in ["300ms", "5m", "1h"] {
            let parsed: Duration = parse_duration(text).unwrap();
            assert_eq!(parse_duration(&format_duration(parsed)).unwrap(), parsed);
        }
    }
}
