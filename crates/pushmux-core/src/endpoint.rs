//! Push server endpoint derivation
//!
//! The base URL is configured by the user (often copied from a browser, so
//! `http`/`https` schemes and stray slashes are common). Each listener
//! connects to `<base>/<key>`; the derived URL is kept exactly as typed and
//! a normalized variant serves as the one-shot fallback when the primary
//! attempt fails.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::ConnectionKey;
use crate::error::{ConfigError, ConfigResult};

/// Validated push server base URL with a websocket scheme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Validate a user supplied base URL (see [`parse_endpoint`]).
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        parse_endpoint(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary endpoint for a listener: `<base>/<key>`, unmodified
    pub fn endpoint_for(&self, key: &ConnectionKey) -> ConfigResult<String> {
        if key.is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        Ok(format!("{}/{}", self.0, key.as_str()))
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BaseUrl> for String {
    fn from(value: BaseUrl) -> Self {
        value.0
    }
}

/// Validate a websocket endpoint, mapping `http(s)` to `ws(s)`.
///
/// The rest of the string is kept verbatim so that what the user typed is
/// what gets dialled first.
pub fn parse_endpoint(raw: &str) -> ConfigResult<String> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|e| ConfigError::InvalidUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;

    let mapped = match parsed.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidUrl {
            url: trimmed.to_string(),
            reason: "missing host".to_string(),
        });
    }

    // Url::parse accepted the input, so the scheme separator is present
    let rest = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or_default();

    Ok(format!("{}://{}", mapped, rest))
}

/// Normalized variant of an endpoint URL, if it differs from the input.
///
/// Only the path changes: repeated slashes collapse and a trailing slash is
/// dropped. Scheme, authority, query and fragment are kept as written.
/// Returns `None` when the path is already normal or the URL does not parse.
pub fn fallback_url(primary: &str) -> Option<String> {
    Url::parse(primary).ok()?;

    let (scheme, rest) = primary.split_once("://")?;
    let path_start = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, after) = rest.split_at(path_start);
    let path_end = after.find(['?', '#']).unwrap_or(after.len());
    let (path, tail) = after.split_at(path_end);

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let collapsed = if segments.is_empty() {
        String::new()
    } else {
        format!("/{}", segments.join("/"))
    };

    if collapsed == path {
        return None;
    }
    Some(format!("{}://{}{}{}", scheme, authority, collapsed, tail))
}
