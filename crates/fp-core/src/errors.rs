/// Core error type for the client.
///
/// Adapter crates map their transport-specific failures into this type
/// (usually `Error::External`) so callers handle everything through one
/// `Result` alias.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The authenticated-user marker is missing from a page that is only
    /// served to logged-in sessions. The session cookie is invalid or
    /// expired; there is no point retrying with the same credentials.
    #[error("unauthorized: session cookie is invalid or expired")]
    Unauthorized,

    /// Session data required by this operation has not been loaded yet.
    #[error("session not initialized: fetch the home page first")]
    NotInitialized,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A payload violated the site's markup/wire contract in a way the
    /// tolerant parsers could not absorb.
    #[error("unexpected payload: {0}")]
    Payload(String),

    /// A user-supplied phrase pattern failed to compile.
    #[error("invalid phrase pattern: {0}")]
    Pattern(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
