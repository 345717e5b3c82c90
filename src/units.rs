//! Human-readable byte sizes and durations.
//!
//! Used only at configuration and logging boundaries.
//! Reclamation arithmetic always operates in raw bytes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::errors::UnitParseError;

const KIB: f64 = 1024.0;

/// Convert a human-readable byte string (e.g. `"10GB"`, `"500 MB"`, `"1.5TB"`) to bytes.
///
/// Units are case-insensitive and use 1024 multiples. No unit means bytes.
pub fn parse_bytes(s: &str) -> Result<u64, UnitParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(UnitParseError::EmptyByteSize);
    }
    let invalid = || UnitParseError::InvalidByteSize(s.to_string());

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if !is_decimal(number) {
        return Err(invalid());
    }
    let value: f64 = number.parse().map_err(|_| invalid())?;

    let exponent = match unit.trim_start().to_ascii_uppercase().as_str() {
        "" | "B" => 0,
        "K" | "KB" => 1,
        "M" | "MB" => 2,
        "G" | "GB" => 3,
        "T" | "TB" => 4,
        "P" | "PB" => 5,
        _ => return Err(invalid()),
    };

    Ok((value * KIB.powi(exponent)) as u64)
}

/// Convert bytes to a human-readable string (e.g. `"1.23 GB"`).
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let (mut div, mut exp) = (UNIT, 0);
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.2} {}B", bytes as f64 / div as f64, prefix)
}

/// Parse a duration string such as `"90s"`, `"1h30m"`, `"1.5h"` or `"500ms"`.
///
/// Accepted units: `ns`, `us` (`µs`), `ms`, `s`, `m`, `h`. A bare `"0"` is zero.
pub fn parse_duration(s: &str) -> Result<Duration, UnitParseError> {
    let s = s.trim();
    let invalid = || UnitParseError::InvalidDuration(s.to_string());
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(split);
        if !is_decimal(number) {
            return Err(invalid());
        }
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        nanos += value * scale;
        rest = tail;
    }

    if nanos >= u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

/// Number made of digits with at most one decimal point and a digit on both sides of it.
fn is_decimal(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let int = parts.next().unwrap_or_default();
    let frac = parts.next();
    let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    all_digits(int) && frac.is_none_or(all_digits)
}

/// Byte size parsed from a human-readable string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bytes(s).map(Self)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_bytes(self.0))
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(bytes) => Ok(Self(bytes)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Duration parsed from a human-readable string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl FromStr for HumanDuration {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(Self)
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0 B")]
    #[case(500, "500 B")]
    #[case(1023, "1023 B")]
    #[case(1024, "1.00 KB")]
    #[case(1536, "1.50 KB")]
    #[case(1024 * 1024, "1.00 MB")]
    #[case(1024 * 1024 * 1024, "1.00 GB")]
    #[case(1024u64.pow(4), "1.00 TB")]
    #[case(1024u64.pow(5), "1.00 PB")]
    #[case(u64::MAX, "16.00 EB")]
    fn test_format_bytes(#[case] input: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(input), expected);
    }

    #[rstest]
    #[case("100", 100)]
    #[case("100B", 100)]
    #[case("1K", 1024)]
    #[case("10GB", 10 * 1024 * 1024 * 1024)]
    #[case("500 MB", 500 * 1024 * 1024)]
    #[case(" 2kb ", 2048)]
    #[case("1.5TB", 1024u64.pow(4) * 3 / 2)]
    #[case("1p", 1024u64.pow(5))]
    fn test_parse_bytes(#[case] input: &str, #[case] expected: u64) {
        assert_eq!(parse_bytes(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("GB")]
    #[case("10 XB")]
    #[case("1.2.3GB")]
    #[case("-5GB")]
    #[case(".5GB")]
    #[case("10 G B")]
    fn test_parse_bytes_invalid(#[case] input: &str) {
        assert!(parse_bytes(input).is_err());
    }

    #[rstest]
    #[case("0", Duration::ZERO)]
    #[case("1m", Duration::from_secs(60))]
    #[case("90s", Duration::from_secs(90))]
    #[case("1h30m", Duration::from_secs(5400))]
    #[case("1.5h", Duration::from_secs(5400))]
    #[case("500ms", Duration::from_millis(500))]
    #[case("10us", Duration::from_micros(10))]
    fn test_parse_duration(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(parse_duration(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("5")]
    #[case("m")]
    #[case("5 minutes")]
    #[case("1d")]
    fn test_parse_duration_invalid(#[case] input: &str) {
        assert!(parse_duration(input).is_err());
    }

    #[test]
    fn test_byte_size_deserialize() {
        #[derive(Deserialize)]
        struct Doc {
            text: ByteSize,
            int: ByteSize,
        }
        let doc: Doc = toml::from_str("text = \"5GB\"\nint = 4096\n").unwrap();
        assert_eq!(doc.text, ByteSize(5 * 1024 * 1024 * 1024));
        assert_eq!(doc.int, ByteSize(4096));
    }
}
