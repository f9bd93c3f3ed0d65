use chrono::{TimeDelta, Utc};
use log::{info, warn};

use crate::auth::{
    error::AuthError,
    provider::IdentityProvider,
    session::{Session, SessionState, SessionStore},
};

/// Query parameters the provider sends to the callback
#[derive(Debug, Clone)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: String,
}

/// Decides whether a browser session may mutate the catalog
pub struct AuthGate {
    provider: Box<dyn IdentityProvider>,
    sessions: SessionStore,
}

impl AuthGate {
    /// `session_ttl` bounds how long an idle browser session is remembered
    pub fn new(provider: Box<dyn IdentityProvider>, session_ttl: TimeDelta) -> Self {
        Self {
            provider,
            sessions: SessionStore::new(session_ttl),
        }
    }

    /// Marks `sid` as pending and returns the provider URL to redirect to.
    ///
    /// Replaces whatever state `sid` had before.
    pub fn start_login(&self, sid: &str) -> String {
        let request = self.provider.authorization_request();
        self.sessions.put(
            sid,
            SessionState::Pending {
                csrf_state: request.csrf_state,
                pkce_verifier: request.pkce_verifier,
            },
        );
        info!("login started for session {sid}");
        request.url
    }

    /// Exchanges the callback code and stores the resulting session.
    ///
    /// On failure the state of `sid` is left as it was. A logout or a newer login
    /// for `sid` during the exchange wins over this callback.
    pub fn complete_login(
        &self,
        sid: &str,
        response: &AuthorizationResponse,
    ) -> Result<Session, AuthError> {
        let pkce_verifier = match self.sessions.get(sid) {
            Some(SessionState::Pending {
                csrf_state,
                pkce_verifier,
            }) if csrf_state == response.state => pkce_verifier,
            _ => {
                warn!("callback for session {sid} does not match a pending login");
                return Err(AuthError::InvalidState);
            }
        };

        let session = self
            .provider
            .exchange_code(&response.code, &pkce_verifier)
            .inspect_err(|e| warn!("login failed for session {sid}: {e}"))?;

        if !self
            .sessions
            .promote(sid, &response.state, session.clone())
        {
            warn!("login for session {sid} was cancelled while exchanging the code");
            return Err(AuthError::InvalidState);
        }
        info!("session {sid} authenticated as {}", session.subject);
        Ok(session)
    }

    /// Moves the state of `old_sid` to `new_sid`, so a session id known before login
    /// stops working once the login completes
    pub fn rotate_session(&self, old_sid: &str, new_sid: &str) -> bool {
        let moved = self.sessions.rename(old_sid, new_sid);
        if moved {
            info!("session {old_sid} continues as {new_sid}");
        }
        moved
    }

    /// Forgets `sid` locally and returns the provider logout URL
    pub fn logout(&self, sid: &str) -> String {
        if self.sessions.remove(sid).is_some() {
            info!("session {sid} logged out");
        }
        self.provider.logout_url()
    }

    pub fn current_session(&self, sid: &str) -> Option<Session> {
        match self.sessions.get(sid)? {
            SessionState::Authenticated(session) if session.is_expired(Utc::now()) => {
                info!("session {sid} expired");
                self.sessions.remove(sid);
                None
            }
            SessionState::Authenticated(session) => Some(session),
            SessionState::Pending { .. } => None,
        }
    }

    pub fn is_authenticated(&self, sid: &str) -> bool {
        self.current_session(sid).is_some()
    }

    pub fn require_session(&self, sid: &str) -> Result<Session, AuthError> {
        self.current_session(sid).ok_or(AuthError::Unauthenticated)
    }
}
