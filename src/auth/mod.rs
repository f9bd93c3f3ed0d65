//! Authentication gate around an external OpenID Connect provider.
//!
//! A browser session moves through three states: no entry (anonymous),
//! [`SessionState::Pending`] while the provider handles the login, and
//! [`SessionState::Authenticated`] once the callback code has been exchanged.
//! Only the last one authorizes mutating requests.

pub mod error;
pub mod gate;
pub mod provider;
pub mod session;

pub use error::AuthError;
pub use gate::{AuthGate, AuthorizationResponse};
pub use provider::{AuthorizationRequest, IdentityProvider, OidcProvider};
pub use session::{Session, SessionState, SessionStore};
