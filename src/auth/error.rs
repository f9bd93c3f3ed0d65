use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("no pending login matches the returned state")]
    InvalidState,

    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("provider discovery failed: {0}")]
    Discovery(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}
