use reqwest::StatusCode;
use thiserror::Error;

/// Errors talking to the remote certificate authority.
#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid authority URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("certificate is already revoked: {0}")]
    AlreadyRevoked(String),

    #[error("authority returned HTTP {status}: {detail}")]
    Status { status: StatusCode, detail: String },
}

/// Convenient Result type alias
pub type AuthorityResult<T> = Result<T, AuthorityError>;
