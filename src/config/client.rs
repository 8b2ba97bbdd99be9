use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REFRESH_PATH: &str = "/api/v2/auth/refresh";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_ACCESS_COOKIE: &str = "access_token_cookie";
pub const DEFAULT_REFRESH_COOKIE: &str = "refresh_token_cookie";

/// Settings read by every request the client issues.
///
/// A client takes its own copy at construction time and never mutates it,
/// so requests always observe a consistent configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct ClientConfig {
    /// Base URL every request path is joined onto.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the session refresh endpoint, relative to `base_url`.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// Destination handed to the navigator when a session cannot be renewed.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Name of the access session cookie.
    #[serde(default = "default_access_cookie")]
    pub access_cookie: String,
    /// Name of the refresh session cookie.
    #[serde(default = "default_refresh_cookie")]
    pub refresh_cookie: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_access_cookie() -> String {
    DEFAULT_ACCESS_COOKIE.to_string()
}

fn default_refresh_cookie() -> String {
    DEFAULT_REFRESH_COOKIE.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
            access_cookie: default_access_cookie(),
            refresh_cookie: default_refresh_cookie(),
        }
    }
}

/// A partial [`ClientConfig`]; unset fields keep their current value.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq, JsonSchema)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub refresh_path: Option<String>,
    pub login_path: Option<String>,
    pub access_cookie: Option<String>,
    pub refresh_cookie: Option<String>,
}

impl ClientConfig {
    /// Convenience constructor that only changes the base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Applies startup overrides on top of this configuration.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(v) = overrides.base_url {
            self.base_url = v;
        }
        if let Some(v) = overrides.refresh_path {
            self.refresh_path = v;
        }
        if let Some(v) = overrides.login_path {
            self.login_path = v;
        }
        if let Some(v) = overrides.access_cookie {
            self.access_cookie = v;
        }
        if let Some(v) = overrides.refresh_cookie {
            self.refresh_cookie = v;
        }
        self
    }
}
