use std::fmt;
use std::sync::Arc;

use futures::future::AbortRegistration;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::navigate::Navigator;
use crate::error::{Error, Result};

/// Per-request options.
///
/// Defaults: refresh-and-retry enabled, auth check enabled, no extra headers,
/// the client's base URL and default navigator.
pub struct RequestOptions {
    /// Redirect callback used instead of the client's default navigator.
    pub navigate: Option<Arc<dyn Navigator>>,
    /// Reserved. Session cookies are HttpOnly, so nothing can be checked
    /// before the request; the client always sends optimistically and relies
    /// on a 401/422 answer.
    pub ensure_auth_check: bool,
    /// When false, a 401/422 is returned as-is: no refresh, no redirect.
    pub retry_on_401: bool,
    /// Alternate base URL for this request only.
    pub base_url: Option<String>,
    headers: Vec<(String, String)>,
    abort: Option<AbortRegistration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            navigate: None,
            ensure_auth_check: true,
            retry_on_401: true,
            base_url: None,
            headers: Vec::new(),
            abort: None,
        }
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("navigate", &self.navigate.is_some())
            .field("ensure_auth_check", &self.ensure_auth_check)
            .field("retry_on_401", &self.retry_on_401)
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("abortable", &self.abort.is_some())
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn navigate(mut self, navigator: impl Navigator + 'static) -> Self {
        self.navigate = Some(Arc::new(navigator));
        self
    }

    pub fn ensure_auth_check(mut self, enabled: bool) -> Self {
        self.ensure_auth_check = enabled;
        self
    }

    pub fn retry_on_401(mut self, enabled: bool) -> Self {
        self.retry_on_401 = enabled;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Adds a header. Names and values are validated when the request is sent.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Lets the caller cancel this request through the matching `AbortHandle`.
    /// Only this request is cancelled; a refresh it joined keeps running.
    pub fn abort_registration(mut self, registration: AbortRegistration) -> Self {
        self.abort = Some(registration);
        self
    }

    pub(crate) fn take_abort(&mut self) -> Option<AbortRegistration> {
        self.abort.take()
    }

    pub(crate) fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidHeader(format!("{}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidHeader(format!("{}: {}", name, e)))?;
            map.append(name, value);
        }
        Ok(map)
    }
}
