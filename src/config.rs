use anyhow::Context;
use chrono::TimeDelta;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted when `oidc.client_secret` is absent from the file
pub const CLIENT_SECRET_ENV: &str = "OIDC_CLIENT_SECRET";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub database: Database,
    pub http: HttpConfig,
    pub oidc: OidcConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.to_string_lossy()))?;
        let mut config: Config =
            toml::from_str(&contents).with_context(|| "Failed to parse config TOML")?;

        if config.oidc.client_secret.is_none() {
            config.oidc.client_secret = std::env::var(CLIENT_SECRET_ENV).ok();
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub in_memory: bool,
    pub path: Option<PathBuf>,
}

/// Registration of this application at the OpenID Connect provider
#[derive(Debug, Deserialize, Clone)]
pub struct OidcConfig {
    /// Base URL the discovery document is fetched from
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Callback URI registered with the provider
    pub redirect_url: String,
    /// Where the provider sends the browser after logging out
    pub post_logout_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_scopes() -> Vec<String> {
    vec!["openid".into(), "profile".into(), "email".into()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_cookie_name() -> String {
    "SID".into()
}

fn default_timeout_secs() -> u64 {
    3600
}

impl SessionConfig {
    /// How long an idle session is kept, both in the cookie and server side
    pub fn ttl(&self) -> TimeDelta {
        i64::try_from(self.timeout_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
