//! HTTP access to the Leadmaker REST API.
//!
//! [`ApiClient`] is the only entry point page-level code needs; the other
//! modules are its building blocks and are public for custom refreshers,
//! navigators and tests.

pub mod body;
pub mod client;
pub mod navigate;
pub mod options;
pub mod refresh;
pub mod response;
pub mod url;

pub use body::{MultipartBody, RequestBody};
pub use client::{ApiClient, ApiClientBuilder};
pub use navigate::{BroadcastNavigator, Navigator};
pub use options::RequestOptions;
pub use refresh::{HttpRefresher, RefreshGuard, RefreshRole, SessionRefresher};
pub use response::ApiResponse;
pub use url::join_url;
