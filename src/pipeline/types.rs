//! Core types shared by the pipeline entities
//!
//! This module contains the validation trait, the opaque configuration map
//! and the duration / check-interval formats used by the orchestration
//! engine (`1h30m`, `never`).

#![allow(clippy::must_use_candidate)]

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Opaque key/value configuration (resource `source`, step `params`, ...).
///
/// Keys are kept sorted so equality and output are both structural.
pub type Config = BTreeMap<String, serde_json::Value>;

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}

/// How often the engine checks a resource for new versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckInterval {
    /// Check on a fixed interval
    Every(Duration),
    /// Never check; versions only arrive through puts or webhooks
    Never,
}

impl fmt::Display for CheckInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Every(duration) => write!(f, "{}", format_duration(*duration)),
            Self::Never => write!(f, "never"),
        }
    }
}

impl Serialize for CheckInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CheckInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "never" {
            return Ok(Self::Never);
        }
        parse_duration(&raw)
            .map(Self::Every)
            .map_err(de::Error::custom)
    }
}

/// Formats a duration the way the engine expects, e.g. `1h30m` or `45s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    let millis = duration.subsec_millis();
    if millis > 0 {
        out.push_str(&format!("{millis}ms"));
    }
    if out.is_empty() {
        out.push_str("0s");
    }
    out
}

/// True for durations the `h`/`m`/`s`/`ms` format cannot express as non-zero
pub(crate) fn below_resolution(duration: Duration) -> bool {
    duration.as_millis() == 0
}

/// Parses `1h30m`, `90s`, `250ms` style durations.
///
/// # Errors
///
/// Returns a description of the problem when the text is not a sequence of
/// `<number><unit>` pairs with unit `h`, `m`, `s` or `ms`.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("expected a number in duration '{text}'"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("number out of range in duration '{text}'"))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let out_of_range = || format!("duration out of range: '{text}'");
        let part = match &rest[..unit_len] {
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(out_of_range)?),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(out_of_range)?),
            "s" => Duration::from_secs(value),
            "ms" => Duration::from_millis(value),
            "" => return Err(format!("missing unit in duration '{text}'")),
            unit => return Err(format!("unknown unit '{unit}' in duration '{text}'")),
        };
        total = total.checked_add(part).ok_or_else(out_of_range)?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

/// Serde adapter for `Option<Duration>` fields written as `1h30m`.
pub(crate) mod optional_duration {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&format_duration(*duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse_duration(&raw).map_err(de::Error::custom))
            .transpose()
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}
