use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Failure of an authenticated request
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or its response could not be read
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status that was not recovered from
    #[error("{method} {url} failed: {} {status_text}{}", status_code(.status), body_suffix(.body))]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        status_text: String,
        body: Option<String>,
    },

    /// A JSON success response had a malformed body
    #[error("{method} {url} returned an invalid JSON body: {source}")]
    Decode {
        method: Method,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid request url {0}")]
    InvalidUrl(String),

    /// The HTTP client itself could not be set up
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

fn status_code(status: &StatusCode) -> u16 {
    status.as_u16()
}

fn body_suffix(body: &Option<String>) -> String {
    match body {
        Some(body) if !body.is_empty() => format!(" - {}", body),
        _ => String::new(),
    }
}

impl ApiError {
    /// HTTP status of the failure, when the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status(),
            _ => None,
        }
    }

    /// True when the session is no longer authenticated
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}
