//! Lexical checks for secret placeholders
//!
//! Placeholders have the fixed form `((scope.field))` or `((scope))` and are
//! resolved by the orchestration engine at run time. They are passed through
//! verbatim; this module only rejects tokens that can never resolve.

use super::errors::PipelineError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<scope>[A-Za-z0-9_-]+)(?:\.(?P<field>[A-Za-z0-9_-]+))?$")
        .expect("placeholder grammar is a valid regex")
});

const OPEN: &str = "((";
const CLOSE: &str = "))";

/// A well-formed placeholder found in a string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Credential scope, e.g. `vault` in `((vault.token))`
    pub scope: &'a str,
    /// Field inside the scope, if any
    pub field: Option<&'a str>,
}

/// Extracts every placeholder in `text`.
///
/// # Errors
///
/// Returns [`PipelineError::MalformedPlaceholder`] for unbalanced
/// parentheses, empty scopes or fields, and characters outside the grammar.
pub fn scan<'a>(text: &'a str, location: &str) -> Result<Vec<Placeholder<'a>>, PipelineError> {
    let mut found = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(OPEN) {
        let after = &rest[open + OPEN.len()..];
        let Some(close) = after.find(CLOSE) else {
            return Err(malformed(&rest[open..], location, "unbalanced parentheses"));
        };
        let inner = &after[..close];
        let token = &rest[open..open + OPEN.len() + close + CLOSE.len()];

        if inner.contains(OPEN) {
            return Err(malformed(token, location, "unbalanced parentheses"));
        }
        if inner.is_empty() || inner.starts_with('.') {
            return Err(malformed(token, location, "empty scope"));
        }
        if inner.ends_with('.') {
            return Err(malformed(token, location, "empty field"));
        }
        let Some(captures) = TOKEN.captures(inner) else {
            return Err(malformed(
                token,
                location,
                "expected ((scope)) or ((scope.field)) with letters, digits, '_' or '-'",
            ));
        };

        found.push(Placeholder {
            scope: captures.name("scope").map_or("", |m| m.as_str()),
            field: captures.name("field").map(|m| m.as_str()),
        });
        rest = &after[close + CLOSE.len()..];
    }

    Ok(found)
}

/// Checks every string inside a configuration value, recursing into
/// arrays and objects. `location` names the value in error messages.
///
/// # Errors
///
/// Returns the first [`PipelineError::MalformedPlaceholder`] found.
pub fn check_value(value: &Value, location: &str) -> Result<(), PipelineError> {
    match value {
        Value::String(text) => scan(text, location).map(|_| ()),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_value(item, &format!("{location}[{i}]"))),
        Value::Object(map) => map
            .iter()
            .try_for_each(|(key, item)| check_value(item, &format!("{location}.{key}"))),
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
    }
}

/// Checks a plain string.
///
/// # Errors
///
/// Returns [`PipelineError::MalformedPlaceholder`] for a malformed token.
pub fn check_str(text: &str, location: &str) -> Result<(), PipelineError> {
    scan(text, location).map(|_| ())
}

fn malformed(token: &str, location: &str, reason: &str) -> PipelineError {
    PipelineError::MalformedPlaceholder {
        token: token.to_string(),
        location: location.to_string(),
        reason: reason.to_string(),
    }
}
