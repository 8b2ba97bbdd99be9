//! Library exports for the Leadmaker API client, shared between the binary and tests.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod utils;

pub use error::{Error, Result};
pub use http::{ApiClient, ApiResponse, RequestBody, RequestOptions};
