// src/config/duration.rs

//! Human-friendly duration strings (`"250ms"`, `"3s"`, `"5m"`, `"2h"`, `"1d"`).

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Parse a duration string made of an integer and a unit suffix.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let secs = |mult: u64| {
        value
            .checked_mul(mult)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => secs(1),
        "m" => secs(60),
        "h" => secs(60 * 60),
        "d" => secs(24 * 60 * 60),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, h or d"
        )),
    }
}

/// Render a duration back into the coarsest exact unit.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        return format!("{ms}ms");
    }
    let secs = d.as_secs();
    match secs {
        0 => "0s".to_string(),
        s if s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration(" 1d ").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn rejects_missing_or_unknown_unit() {
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn formats_in_coarsest_unit() {
        assert_eq!(format_duration(Duration::from_secs(1800)), "30m");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1d");
    }
}
