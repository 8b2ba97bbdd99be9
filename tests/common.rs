#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use leadmaker::config::{load_config_str, ConfigV1};
use leadmaker::http::{HttpRefresher, Navigator, SessionRefresher};
use reqwest::Url;

pub const TEST_CONFIG: &str = r#"
version: "1.0.0"
logging:
  level: "debug"
  format: "json"
client:
  base_url: "http://localhost:1"
  refresh_path: "/api/v2/auth/refresh"
  login_path: "/login"
metrics:
  enabled: true
"#;

pub const FRESH_SESSION_COOKIE: &str = "access_token_cookie=fresh; Path=/; HttpOnly";

/// Test configuration pointed at `base_url` (usually a mockito server).
pub fn load_test_config(base_url: &str) -> ConfigV1 {
    let mut config = load_config_str(TEST_CONFIG).expect("Failed to parse test config YAML");
    config.client.base_url = base_url.to_string();
    config
}

/// Waits before delegating to the HTTP refresher, so concurrent requests
/// have time to pile up behind the guard.
pub struct DelayedRefresher {
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl DelayedRefresher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl SessionRefresher for DelayedRefresher {
    async fn refresh(&self, http: &reqwest::Client, url: &Url) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        HttpRefresher.refresh(http, url).await
    }
}

/// Navigator that records every destination it was sent to.
#[derive(Clone, Default)]
pub struct RecordingNavigator {
    pub destinations: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn seen(&self) -> Vec<String> {
        self.destinations.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.destinations.lock().unwrap().push(path.to_string());
    }
}
