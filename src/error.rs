//! Crate-wide error type.
//!
//! HTTP responses with a non-2xx status are not errors: they come back as
//! an [`ApiResponse`](crate::http::ApiResponse) with `ok == false`. This enum
//! only covers failures where no response could be produced at all.

use thiserror::Error;

/// Errors surfaced by the client, configuration loading and logging setup.
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be sent or its response could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The joined base URL and path did not form a valid absolute URL.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A body could not be converted to or from JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A caller-supplied header name or value was rejected.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A seeded session cookie had an unusable name or value.
    #[error("invalid cookie '{0}'")]
    InvalidCookie(String),

    /// The caller aborted the request through its abort registration.
    #[error("request aborted")]
    Aborted,

    /// The configuration file or environment could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The logging configuration was rejected.
    #[error("logging error: {0}")]
    Logging(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// Shorthand used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
