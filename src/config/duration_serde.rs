//! Common serde utilities for human-readable durations and sizes in configuration.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

/// Custom serde functions for Duration that support human-readable strings
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "a duration as seconds (number) or human-readable string (e.g., '200ms', '5s', '1m')",
                )
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(seconds))
            }

            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(seconds)
                    .map(Duration::from_secs)
                    .map_err(|_| de::Error::custom(format!("Negative duration: {seconds}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                humantime::parse_duration(value)
                    .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Byte sizes given as a number of bytes or a string such as `"10MB"`
pub mod byte_size {
    use super::*;

    /// Parse `"512"`, `"64KB"`, `"10MB"`, `"1GB"` (binary multiples)
    pub fn parse(value: &str) -> Result<u64, String> {
        let trimmed = value.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);
        let amount: u64 = digits
            .parse()
            .map_err(|_| format!("Invalid size '{value}'"))?;
        let multiplier = match unit.trim().to_uppercase().as_str() {
            "" | "B" => 1,
            "KB" | "K" => 1024,
            "MB" | "M" => 1024 * 1024,
            "GB" | "G" => 1024 * 1024 * 1024,
            other => return Err(format!("Unknown size unit '{other}' in '{value}'")),
        };
        amount
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Size '{value}' overflows"))
    }

    pub fn serialize<S>(size: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(*size)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SizeVisitor;

        impl<'de> Visitor<'de> for SizeVisitor {
            type Value = u64;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a size in bytes (number) or string (e.g., '10MB')")
            }

            fn visit_u64<E>(self, bytes: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(bytes)
            }

            fn visit_i64<E>(self, bytes: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(bytes).map_err(|_| de::Error::custom(format!("Negative size: {bytes}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                parse(value).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}
