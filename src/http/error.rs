use rouille::Response;

use crate::{auth::AuthError, storage::error::StorageError};

/// Path protected routes send anonymous browsers to
pub const LOGIN_PATH: &str = "/score_login";

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// no authenticated session, answered with a redirect to the login route
    LoginRequired,
    Unauthorized(String),
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ApiError::NotFound(format!("score {} not found", id)),

            StorageError::ValidationRejected(e) => ApiError::BadRequest(e.to_string()),

            StorageError::Unavailable(e) => {
                log::error!("score storage unavailable: {e}");
                ApiError::Internal("internal server error".into())
            }

            StorageError::Internal(e) => {
                log::error!("internal storage error: {e:#}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => ApiError::LoginRequired,

            AuthError::InvalidState | AuthError::ExchangeFailed(_) => {
                ApiError::Unauthorized(format!("login failed: {err}"))
            }

            AuthError::Discovery(_) | AuthError::InvalidUrl(_) => {
                log::error!("identity provider misconfigured: {err}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::LoginRequired => 302,
            ApiError::Unauthorized(_) => 401,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::LoginRequired => Response::redirect_302(LOGIN_PATH),

            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Internal(msg) => Response::text(msg).with_status_code(status),
        }
    }
}
