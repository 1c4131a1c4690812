//! Error taxonomy shared by every client component.
//!
//! Nothing in this crate retries: each variant is surfaced to the caller
//! with its original cause so the caller can decide on retry or backoff.

/// Result alias for radiko operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network or connection failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-200 answer from one of the authentication steps.
    #[error("{message} (status {status}, url {url})")]
    Auth {
        message: String,
        status: u16,
        url: String,
    },

    /// An expected pattern or element is absent from a trusted response.
    #[error("not found: {0}")]
    NotFound(String),

    /// A required identifier or time range was rejected before any
    /// network call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value was present but malformed (header integer, timestamp, id, JSON).
    #[error("parse error: {0}")]
    Parse(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Error {
    pub fn auth(message: impl Into<String>, status: u16, url: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            status,
            url: url.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(format!("invalid JSON: {}", e))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(quick_xml::Error::InvalidAttr(e))
    }
}
