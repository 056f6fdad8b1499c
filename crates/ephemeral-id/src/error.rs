//! Error types for the cookie jar, the base pipeline, and the client.

use std::path::PathBuf;

use http::StatusCode;

/// Failure to load a cookie jar from disk.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    #[error("failed to read cookie jar {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cookie jar {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of the base pipeline rejecting a response.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Anything that can go wrong issuing a request through [`crate::EphemeralClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("upstream timeout: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("upstream connection error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout(e)
        } else {
            ClientError::Transport(e)
        }
    }
}
