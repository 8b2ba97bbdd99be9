//! The API client: cookies on every request, transparent session renewal.
//!
//! A request that comes back 401 or 422 triggers (or joins) a session
//! refresh. On success the identical request is sent once more and that
//! answer is final, whatever it is. On failure the navigator is sent to the
//! login destination and the original failing answer is returned; the
//! navigation is not awaited.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::Abortable;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::body::RequestBody;
use super::navigate::{BroadcastNavigator, Navigator};
use super::options::RequestOptions;
use super::refresh::{HttpRefresher, RefreshGuard, RefreshRole, SessionRefresher};
use super::response::{is_auth_failure, ApiResponse};
use super::url::resolve;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::metrics::{MetricsRecorder, NoopMetrics};
use crate::utils::log_throttle::should_emit;

const REDIRECT_LOG_WINDOW: Duration = Duration::from_secs(30);

struct Inner {
    config: ClientConfig,
    http: reqwest::Client,
    jar: Arc<Jar>,
    refresher: Arc<dyn SessionRefresher>,
    guard: RefreshGuard,
    navigator: Arc<dyn Navigator>,
    redirects: BroadcastNavigator,
    metrics: Arc<dyn MetricsRecorder>,
}

/// Cheap to clone; clones share cookies, the refresh guard and metrics.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    refresher: Arc<dyn SessionRefresher>,
    navigator: Option<Arc<dyn Navigator>>,
    metrics: Arc<dyn MetricsRecorder>,
    jar: Arc<Jar>,
    cookies: Vec<(String, String)>,
}

impl ApiClientBuilder {
    /// Replaces the HTTP refresh call, e.g. to add backoff or instrumentation.
    pub fn refresher(mut self, refresher: impl SessionRefresher + 'static) -> Self {
        self.refresher = Arc::new(refresher);
        self
    }

    /// Default navigator for requests that do not bring their own.
    /// Replaces the broadcast behind [`ApiClient::subscribe_redirects`].
    pub fn navigator(mut self, navigator: impl Navigator + 'static) -> Self {
        self.navigator = Some(Arc::new(navigator));
        self
    }

    pub fn metrics(mut self, metrics: impl MetricsRecorder) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    /// Starts from an existing cookie jar, e.g. one holding a restored session.
    pub fn cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.jar = jar;
        self
    }

    /// Seeds a session cookie for the base URL before the first request.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Seeds the access and refresh tokens under the configured cookie names.
    pub fn session_tokens(mut self, access: Option<String>, refresh: Option<String>) -> Self {
        if let Some(token) = access {
            let name = self.config.access_cookie.clone();
            self = self.cookie(name, token);
        }
        if let Some(token) = refresh {
            let name = self.config.refresh_cookie.clone();
            self = self.cookie(name, token);
        }
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        // fail early on a base URL that can never work
        let base = resolve(&self.config.base_url, "")?;

        for (name, value) in &self.cookies {
            validate_cookie(name, value)?;
            let cookie = format!("{}={}; Path=/", name, value);
            self.jar.add_cookie_str(&cookie, &base);
        }
        if !self.cookies.is_empty() {
            debug!(seeded = self.cookies.len(), "session cookies seeded");
        }

        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&self.jar))
            .build()?;

        let redirects = BroadcastNavigator::default();
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(redirects.clone()) as Arc<dyn Navigator>);

        info!(
            base_url = self.config.base_url.as_str(),
            refresh_path = self.config.refresh_path.as_str(),
            "API client created"
        );

        Ok(ApiClient {
            inner: Arc::new(Inner {
                config: self.config,
                http,
                jar: self.jar,
                refresher: self.refresher,
                guard: RefreshGuard::new(),
                navigator,
                redirects,
                metrics: self.metrics,
            }),
        })
    }
}

fn validate_cookie(name: &str, value: &str) -> Result<()> {
    let bad_name = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | '=' | ','));
    let bad_value = value
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | ','));
    if bad_name || bad_value {
        return Err(Error::InvalidCookie(name.to_string()));
    }
    Ok(())
}

impl ApiClient {
    /// A client with the HTTP refresher, broadcast navigation and no metrics.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            refresher: Arc::new(HttpRefresher),
            navigator: None,
            metrics: Arc::new(NoopMetrics),
            jar: Arc::new(Jar::default()),
            cookies: Vec::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The jar holding the session cookies.
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.inner.jar
    }

    /// Login destinations published by the default navigator.
    pub fn subscribe_redirects(&self) -> broadcast::Receiver<String> {
        self.inner.redirects.subscribe()
    }

    /// True while a session refresh is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.inner.guard.is_refreshing()
    }

    /// Whether the refresh cookie is present for the base URL.
    ///
    /// Diagnostic only: a browser never exposes HttpOnly cookies, so the
    /// refresh decision never depends on this.
    pub fn has_refresh_cookie(&self) -> bool {
        match resolve(&self.inner.config.base_url, "") {
            Ok(url) => self.refresh_cookie_visible(&url),
            Err(_) => false,
        }
    }

    fn refresh_cookie_visible(&self, url: &Url) -> bool {
        let Some(header) = self.inner.jar.cookies(url) else {
            return false;
        };
        let Ok(cookies) = header.to_str() else {
            return false;
        };
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, _)| name == self.inner.config.refresh_cookie)
    }

    pub async fn get(&self, path: &str, opts: RequestOptions) -> Result<ApiResponse> {
        self.request(Method::GET, path, RequestBody::Empty, opts).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: impl Into<RequestBody>,
        opts: RequestOptions,
    ) -> Result<ApiResponse> {
        self.request(Method::POST, path, body, opts).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: impl Into<RequestBody>,
        opts: RequestOptions,
    ) -> Result<ApiResponse> {
        self.request(Method::PUT, path, body, opts).await
    }

    pub async fn patch(
        &self,
        path: &str,
        body: impl Into<RequestBody>,
        opts: RequestOptions,
    ) -> Result<ApiResponse> {
        self.request(Method::PATCH, path, body, opts).await
    }

    pub async fn delete(&self, path: &str, opts: RequestOptions) -> Result<ApiResponse> {
        self.request(Method::DELETE, path, RequestBody::Empty, opts).await
    }

    /// Issues `method path` and handles session expiry as described in the
    /// module docs. Only transport failures and aborts are errors.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: impl Into<RequestBody>,
        mut opts: RequestOptions,
    ) -> Result<ApiResponse> {
        let body = body.into();
        let span = info_span!(
            "api_request",
            request_id = %Uuid::new_v4(),
            http_method = %method,
            path,
        );

        match opts.take_abort() {
            Some(registration) => {
                let exchange = self.exchange(method, path, body, opts);
                Abortable::new(exchange, registration)
                    .instrument(span)
                    .await
                    .map_err(|_| Error::Aborted)
                    .and_then(|result| result)
            }
            None => self.exchange(method, path, body, opts).instrument(span).await,
        }
    }

    async fn exchange(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        opts: RequestOptions,
    ) -> Result<ApiResponse> {
        let started = Instant::now();
        let metrics = &self.inner.metrics;
        let result = self.exchange_inner(&method, path, &body, &opts).await;

        let outcome = match &result {
            Ok(response) if response.ok => "ok",
            Ok(_) => "error_status",
            Err(_) => "transport_error",
        };
        metrics.record_request(method.as_str(), outcome);
        metrics.record_request_duration(method.as_str(), started.elapsed().as_secs_f64());
        result
    }

    async fn exchange_inner(
        &self,
        method: &Method,
        path: &str,
        body: &RequestBody,
        opts: &RequestOptions,
    ) -> Result<ApiResponse> {
        let base = opts
            .base_url
            .as_deref()
            .unwrap_or(&self.inner.config.base_url);
        let url = resolve(base, path)?;
        let headers = opts.header_map()?;

        let response = self.send(method, &url, &headers, body).await?;
        let status = response.status();
        debug!(http_status = status.as_u16(), "response received");

        if !is_auth_failure(status) || !opts.retry_on_401 {
            return ApiResponse::read(response).await;
        }

        let refresh_cookie_visible = self.refresh_cookie_visible(&url);
        debug!(
            http_status = status.as_u16(),
            refresh_cookie_visible, "session rejected, refreshing"
        );

        if self.refresh_session().await {
            self.inner.metrics.record_retry();
            // no second refresh cycle: whatever the retry returns is final
            let retried = self.send(method, &url, &headers, body).await?;
            debug!(http_status = retried.status().as_u16(), "retry answered");
            return ApiResponse::read(retried).await;
        }

        self.redirect_to_login(opts);
        ApiResponse::read(response).await
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: &RequestBody,
    ) -> Result<reqwest::Response> {
        let builder = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .headers(headers.clone());
        let builder = body.apply(builder, headers)?;
        Ok(builder.send().await?)
    }

    /// Joins the in-flight refresh or starts one. Never fails.
    async fn refresh_session(&self) -> bool {
        let config = &self.inner.config;
        let url = match resolve(&config.base_url, &config.refresh_path) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot build refresh URL: {}", e);
                return false;
            }
        };

        let http = self.inner.http.clone();
        let refresher = Arc::clone(&self.inner.refresher);
        let metrics = Arc::clone(&self.inner.metrics);
        let (outcome, role) = self.inner.guard.join_or_start(move || async move {
            let renewed = refresher.refresh(&http, &url).await;
            metrics.record_refresh(if renewed { "success" } else { "failure" });
            renewed
        });

        if role == RefreshRole::Joined {
            debug!("joined in-flight session refresh");
        }
        outcome.await
    }

    fn redirect_to_login(&self, opts: &RequestOptions) {
        let login_path = self.inner.config.login_path.as_str();
        if let Some(suppressed_count) =
            should_emit("api_client.session.redirect", REDIRECT_LOG_WINDOW)
        {
            warn!(
                event_name = "api_client.session.redirect",
                event_domain = "session",
                destination = login_path,
                suppressed_count,
                "session could not be renewed, redirecting to login"
            );
        }
        self.inner.metrics.record_redirect();
        match &opts.navigate {
            Some(navigator) => navigator.navigate(login_path),
            None => self.inner.navigator.navigate(login_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::AbortHandle;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client_for(server: &Server) -> ApiClient {
        ApiClient::new(ClientConfig::with_base_url(server.url())).expect("client should build")
    }

    fn recording_navigator() -> (Arc<Mutex<Vec<String>>>, impl Navigator + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |path: &str| sink.lock().unwrap().push(path.to_string()))
    }

    #[tokio::test]
    async fn success_is_returned_without_refresh() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/api/v2/threads/3")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 3, "status": "active"}"#)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/api/v2/auth/refresh")
            .expect(0)
            .create_async()
            .await;

        let response = client_for(&server)
            .get("/api/v2/threads/3", RequestOptions::default())
            .await
            .unwrap();

        m.assert_async().await;
        refresh.assert_async().await;
        assert!(response.ok);
        assert_eq!(response.data, json!({"id": 3, "status": "active"}));
    }

    #[tokio::test]
    async fn non_auth_failures_are_plain_results() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/api/v2/threads/9")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"detail": "not found"}"#)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/api/v2/auth/refresh")
            .expect(0)
            .create_async()
            .await;
        let (seen, navigator) = recording_navigator();

        let response = client_for(&server)
            .delete("/api/v2/threads/9", RequestOptions::new().navigate(navigator))
            .await
            .unwrap();

        refresh.assert_async().await;
        assert!(!response.ok);
        assert_eq!(response.status.as_u16(), 404);
        assert_eq!(response.data["detail"], "not found");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bypass_flag_returns_raw_auth_failure() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/api/v2/auth/me")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/api/v2/auth/refresh")
            .expect(0)
            .create_async()
            .await;
        let (seen, navigator) = recording_navigator();

        let response = client_for(&server)
            .get(
                "/api/v2/auth/me",
                RequestOptions::new().retry_on_401(false).navigate(navigator),
            )
            .await
            .unwrap();

        m.assert_async().await;
        refresh.assert_async().await;
        assert_eq!(response.status.as_u16(), 401);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_redirects_once_and_returns_original() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/api/v2/leads")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"msg": "Signature has expired"}"#)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/api/v2/auth/refresh")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let (seen, navigator) = recording_navigator();

        let response = client_for(&server)
            .get("/api/v2/leads", RequestOptions::new().navigate(navigator))
            .await
            .unwrap();

        m.assert_async().await;
        refresh.assert_async().await;
        assert_eq!(response.status.as_u16(), 422);
        assert_eq!(response.data["msg"], "Signature has expired");
        assert_eq!(*seen.lock().unwrap(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn default_navigator_broadcasts_login_path() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v2/payouts")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("POST", "/api/v2/auth/refresh")
            .with_status(500)
            .create_async()
            .await;

        let config = ClientConfig {
            login_path: "/auth/login".to_string(),
            ..ClientConfig::with_base_url(server.url())
        };
        let client = ApiClient::new(config).unwrap();
        let mut redirects = client.subscribe_redirects();

        let response = client
            .get("/api/v2/payouts", RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(response.status.as_u16(), 401);
        assert_eq!(redirects.recv().await.unwrap(), "/auth/login");
    }

    #[tokio::test]
    async fn per_request_base_url_wins() {
        let mut primary = Server::new_async().await;
        let mut alternate = Server::new_async().await;
        let untouched = primary
            .mock("GET", "/health")
            .expect(0)
            .create_async()
            .await;
        let m = alternate
            .mock("GET", "/health")
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;

        let response = client_for(&primary)
            .get("health", RequestOptions::new().base_url(alternate.url() + "/"))
            .await
            .unwrap();

        untouched.assert_async().await;
        m.assert_async().await;
        assert_eq!(response.data, json!("OK"));
    }

    #[tokio::test]
    async fn caller_content_type_reaches_the_server() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/api/v2/threads")
            .match_header("content-type", "application/merge-patch+json")
            .match_body(Matcher::Json(json!({"name": "Leads RU"})))
            .with_status(201)
            .create_async()
            .await;

        let response = client_for(&server)
            .post(
                "/api/v2/threads",
                json!({"name": "Leads RU"}),
                RequestOptions::new().header("Content-Type", "application/merge-patch+json"),
            )
            .await
            .unwrap();

        m.assert_async().await;
        assert!(response.ok);
        assert_eq!(response.data, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn aborted_request_reports_aborted() {
        let server = Server::new_async().await;
        let (handle, registration) = AbortHandle::new_pair();
        handle.abort();

        let result = client_for(&server)
            .get(
                "/api/v2/leads",
                RequestOptions::new().abort_registration(registration),
            )
            .await;

        assert!(matches!(result, Err(Error::Aborted)));
    }

    #[tokio::test]
    async fn refresh_cookie_presence_is_visible_to_diagnostics() {
        let server = Server::new_async().await;
        let client = client_for(&server);
        assert!(!client.has_refresh_cookie());

        let url = Url::parse(&server.url()).unwrap();
        client
            .cookie_jar()
            .add_cookie_str("refresh_token_cookie=opaque; Path=/", &url);
        assert!(client.has_refresh_cookie());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let client = ApiClient::new(ClientConfig::with_base_url("http://127.0.0.1:9")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = client
            .get(
                "/api/v2/leads",
                RequestOptions::new().navigate(move |_: &str| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn seeded_tokens_use_configured_cookie_names() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/api/v2/auth/me")
            .match_header("cookie", Matcher::Regex("session=abc".to_string()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let mut config = ClientConfig::with_base_url(server.url());
        config.access_cookie = "session".to_string();
        let client = ApiClient::builder(config)
            .session_tokens(Some("abc".to_string()), Some("r-1".to_string()))
            .build()
            .unwrap();
        assert!(client.has_refresh_cookie());

        let response = client
            .get("/api/v2/auth/me", RequestOptions::default())
            .await
            .unwrap();

        m.assert_async().await;
        assert!(response.ok);
    }

    #[test]
    fn malformed_seed_cookie_is_rejected() {
        let result = ApiClient::builder(ClientConfig::default())
            .cookie("access_token_cookie", "two; parts")
            .build();
        assert!(matches!(result, Err(Error::InvalidCookie(name)) if name == "access_token_cookie"));

        let result = ApiClient::builder(ClientConfig::default())
            .cookie("", "value")
            .build();
        assert!(matches!(result, Err(Error::InvalidCookie(_))));
    }
}
