use reqwest::Url;

use crate::error::{Error, Result};

/// Joins `base` and `path` with exactly one `/` at the seam.
///
/// An empty path yields the base without its trailing slashes.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base, path)
}

/// [`join_url`] followed by parsing into an absolute URL.
pub fn resolve(base: &str, path: &str) -> Result<Url> {
    let joined = join_url(base, path);
    Url::parse(&joined).map_err(|e| Error::InvalidUrl {
        url: joined,
        reason: e.to_string(),
    })
}
