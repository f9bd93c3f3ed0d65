use chrono::{TimeDelta, Utc};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
    basic::BasicClient, url::Url,
};
use serde::Deserialize;

use crate::{
    auth::{error::AuthError, session::Session},
    config::OidcConfig,
};

/// Redirect issued to start a login, with the secrets the callback must match
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

/// The identity provider as seen by the gate
pub trait IdentityProvider: Send + Sync {
    fn authorization_request(&self) -> AuthorizationRequest;

    /// Trades an authorization code for the session it proves
    fn exchange_code(&self, code: &str, pkce_verifier: &str) -> Result<Session, AuthError>;

    /// Provider endpoint that ends its own session and sends the browser back to us
    fn logout_url(&self) -> String;
}

/// Subset of the OpenID Connect discovery document we rely on
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    name: Option<String>,
    email: Option<String>,
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub struct OidcProvider {
    client: ConfiguredClient,
    http: reqwest::blocking::Client,
    scopes: Vec<String>,
    userinfo_url: Option<String>,
    logout_url: String,
}

fn discovery_url(issuer_url: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer_url.trim_end_matches('/')
    )
}

fn http_client() -> Result<reqwest::blocking::Client, AuthError> {
    // the token endpoint must not be followed through redirects
    reqwest::blocking::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| AuthError::Discovery(e.to_string()))
}

impl OidcProvider {
    /// Fetches the discovery document of `config.issuer_url` and builds the client from it
    pub fn discover(config: &OidcConfig) -> Result<Self, AuthError> {
        let http = http_client()?;
        let url = discovery_url(&config.issuer_url);
        log::info!("Discovering OpenID provider at {url}");

        let metadata: ProviderMetadata = http
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| AuthError::Discovery(format!("{url}: {e}")))?;

        Self::from_metadata(config, metadata, http)
    }

    pub fn from_metadata(
        config: &OidcConfig,
        metadata: ProviderMetadata,
        http: reqwest::blocking::Client,
    ) -> Result<Self, AuthError> {
        let invalid = |e: oauth2::url::ParseError| AuthError::InvalidUrl(e.to_string());

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(AuthUrl::new(metadata.authorization_endpoint.clone()).map_err(invalid)?)
            .set_token_uri(TokenUrl::new(metadata.token_endpoint.clone()).map_err(invalid)?)
            .set_redirect_uri(RedirectUrl::new(config.redirect_url.clone()).map_err(invalid)?);
        let client = match &config.client_secret {
            Some(secret) => client.set_client_secret(ClientSecret::new(secret.clone())),
            None => {
                log::warn!("No client secret configured, using a public client");
                client
            }
        };

        Ok(Self {
            client,
            http,
            scopes: config.scopes.clone(),
            userinfo_url: metadata.userinfo_endpoint.clone(),
            logout_url: build_logout_url(config, &metadata)?,
        })
    }

    fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, AuthError> {
        let url = self.userinfo_url.as_deref().ok_or_else(|| {
            AuthError::ExchangeFailed("provider advertises no userinfo endpoint".into())
        })?;

        self.http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| AuthError::ExchangeFailed(format!("userinfo: {e}")))
    }
}

/// Prefers the standard `end_session_endpoint`, falling back to the Auth0 logout route.
fn build_logout_url(config: &OidcConfig, metadata: &ProviderMetadata) -> Result<String, AuthError> {
    let url = match &metadata.end_session_endpoint {
        Some(endpoint) => Url::parse_with_params(
            endpoint,
            &[
                ("client_id", config.client_id.as_str()),
                ("post_logout_redirect_uri", config.post_logout_url.as_str()),
            ],
        ),
        None => Url::parse_with_params(
            &format!("{}/v2/logout", metadata.issuer.trim_end_matches('/')),
            &[
                ("returnTo", config.post_logout_url.as_str()),
                ("client_id", config.client_id.as_str()),
            ],
        ),
    }
    .map_err(|e| AuthError::InvalidUrl(e.to_string()))?;

    Ok(url.to_string())
}

impl IdentityProvider for OidcProvider {
    fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    fn exchange_code(&self, code: &str, pkce_verifier: &str) -> Result<Session, AuthError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_owned()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()))
            .request(&self.http)
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        let info = self.fetch_userinfo(token.access_token().secret())?;
        let expires_at = token
            .expires_in()
            .and_then(|d| TimeDelta::from_std(d).ok())
            .map(|d| Utc::now() + d);

        Ok(Session {
            subject: info.sub,
            name: info.name.or(info.email),
            expires_at,
        })
    }

    fn logout_url(&self) -> String {
        self.logout_url.clone()
    }
}
