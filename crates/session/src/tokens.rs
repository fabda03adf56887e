//! Token types and refresh response parsing

use serde::Serialize;
use serde_json::Value;

use crate::constants::FALLBACK_TIME_ZONE;

/// Token pair issued by the refresh endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Bearer credential for regular requests
    pub access_token: String,

    /// Rotated refresh token; `None` when the backend kept the old one
    pub refresh_token: Option<String>,
}

/// JSON body of a refresh request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub device_token: &'a str,
    pub time_zone: &'a str,
}

type Extractor = fn(&Value) -> Option<&Value>;

/// Locations of the access token across backend response shapes, most
/// specific first.
const ACCESS_TOKEN_EXTRACTORS: &[Extractor] = &[
    |v| v.pointer("/data/tokens/access/token"),
    |v| v.pointer("/tokens/access/token"),
    |v| v.get("accessToken"),
    |v| v.pointer("/access/token"),
    |v| v.get("token"),
];

const REFRESH_TOKEN_EXTRACTORS: &[Extractor] = &[
    |v| v.pointer("/data/tokens/refresh/token"),
    |v| v.pointer("/tokens/refresh/token"),
    |v| v.get("refreshToken"),
    |v| v.pointer("/refresh/token"),
];

fn first_token(body: &Value, extractors: &[Extractor]) -> Option<String> {
    extractors
        .iter()
        .filter_map(|extract| extract(body))
        .filter_map(Value::as_str)
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// Pulls a token pair out of a refresh response body.
///
/// Returns `None` when no access token is present, even if a refresh token is.
pub fn extract_token_pair(body: &Value) -> Option<TokenPair> {
    let access_token = first_token(body, ACCESS_TOKEN_EXTRACTORS)?;
    Some(TokenPair {
        access_token,
        refresh_token: first_token(body, REFRESH_TOKEN_EXTRACTORS),
    })
}

/// IANA name of the host time zone, `UTC` when it cannot be determined
pub fn local_time_zone() -> String {
    match iana_time_zone::get_timezone() {
        Ok(zone) if !zone.is_empty() => zone,
        Ok(_) => FALLBACK_TIME_ZONE.to_string(),
        Err(e) => {
            tracing::debug!("Could not determine host time zone: {}", e);
            FALLBACK_TIME_ZONE.to_string()
        }
    }
}
