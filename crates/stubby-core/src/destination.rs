use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use url::Url;

const DEFAULT_SCHEME_PREFIX: &str = "http://";

/// Scheme tokens the protocol check recognizes, longest first.
const SCHEME_TOKENS: [&str; 2] = ["https", "http"];

/// A validated, normalized destination URL.
///
/// A bare domain such as `example.com` is a legitimate shorten target and is
/// normalized to `http://example.com`. A recognized scheme that is not
/// followed by `://` (`http:/example.com`) is a user error and is rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Destination(String);

impl Destination {
    /// Validates `input` and returns the normalized destination.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, CoreError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(CoreError::InvalidUrl(
                "destination cannot be empty".to_string(),
            ));
        }

        let normalized = normalize_scheme(raw)?;
        check_well_formed(&normalized)?;

        Ok(Self(normalized))
    }

    /// Wraps a destination read back from a store without re-validating it.
    pub fn new_unchecked(destination: impl Into<String>) -> Self {
        Self(destination.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returns the byte length of the scheme token `raw` starts with, if any.
///
/// A token only counts when it is followed by `:` or `/`, so hosts such as
/// `httpbin.org` are treated as bare domains.
fn scheme_token_len(raw: &str) -> Option<usize> {
    let bytes = raw.as_bytes();
    SCHEME_TOKENS.iter().find_map(|token| {
        let len = token.len();
        let matches = bytes.len() > len
            && bytes[..len].eq_ignore_ascii_case(token.as_bytes())
            && matches!(bytes[len], b':' | b'/');
        matches.then_some(len)
    })
}

fn normalize_scheme(raw: &str) -> std::result::Result<String, CoreError> {
    match scheme_token_len(raw) {
        Some(len) if raw[len..].starts_with("://") => Ok(raw.to_string()),
        Some(_) => Err(CoreError::InvalidUrl(format!(
            "scheme must be followed by '://': {raw}"
        ))),
        None if has_foreign_scheme(raw) => Err(CoreError::InvalidUrl(format!(
            "scheme must be http or https: {raw}"
        ))),
        None => Ok(format!("{DEFAULT_SCHEME_PREFIX}{raw}")),
    }
}

/// Detects an explicit non-http scheme such as `ftp://`, which would
/// otherwise be swallowed into the host by the `http://` prefix.
fn has_foreign_scheme(raw: &str) -> bool {
    raw.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn check_well_formed(candidate: &str) -> std::result::Result<(), CoreError> {
    // The url crate percent-encodes control characters on parse, while the
    // raw string is what gets stored and redirected to.
    if candidate
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(CoreError::InvalidUrl(format!(
            "must not contain whitespace or control characters: {candidate:?}"
        )));
    }

    // The url crate tolerates extra slashes and empty userinfo, so the
    // authority is checked before parsing.
    let authority_starts_well = candidate
        .split_once("://")
        .and_then(|(_, rest)| rest.chars().next())
        .is_some_and(|c| c.is_alphanumeric() || c == '[');
    if !authority_starts_well {
        return Err(CoreError::InvalidUrl(format!(
            "missing host: {candidate}"
        )));
    }

    let parsed = Url::parse(candidate)
        .map_err(|e| CoreError::InvalidUrl(format!("{candidate}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::InvalidUrl(format!(
            "scheme must be http or https: {candidate}"
        )));
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::InvalidUrl(format!(
            "missing host: {candidate}"
        )));
    }

    Ok(())
}

impl TryFrom<String> for Destination {
    type Error = CoreError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        value.0
    }
}

impl Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
