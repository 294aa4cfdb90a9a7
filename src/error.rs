use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The URL cannot be decoded into a search query. Never retryable.
    #[error("malformed url '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    /// A mandatory anchor is missing: the markup drifted or the document is
    /// an interstitial rather than the expected page.
    #[error("structure error: anchor '{anchor}' not found in {context}")]
    Structure { anchor: String, context: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("search cancelled")]
    Cancelled,
}

impl ExtractError {
    pub fn malformed_url(url: &str, reason: impl Into<String>) -> Self {
        Self::MalformedUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn structure(anchor: &str, context: &str) -> Self {
        Self::Structure {
            anchor: anchor.to_string(),
            context: context.to_string(),
        }
    }

    /// True when the failure points at site markup drift rather than at the input.
    pub fn is_structure_drift(&self) -> bool {
        matches!(self, Self::Structure { .. })
    }
}

/// Failures reported by the transport collaborator. Passed through as is.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("timed out fetching {url}")]
    Timeout { url: String },
}
