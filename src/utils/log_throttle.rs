//! Windowed rate limiting for noisy warnings.
//!
//! A burst of requests hitting an expired session would otherwise emit one
//! warning each; callers ask [`should_emit`] first and attach the number of
//! suppressed events when a window rolls over.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Window {
    opened_at: Instant,
    suppressed: u64,
}

static WINDOWS: OnceLock<Mutex<HashMap<String, Window>>> = OnceLock::new();

fn windows() -> &'static Mutex<HashMap<String, Window>> {
    WINDOWS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns `Some(suppressed_count)` when a log for `key` should be emitted,
/// otherwise `None` and the event is counted as suppressed for the active window.
pub fn should_emit(key: &str, interval: Duration) -> Option<u64> {
    let mut map = windows().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let now = Instant::now();

    let Some(window) = map.get_mut(key) else {
        map.insert(
            key.to_string(),
            Window {
                opened_at: now,
                suppressed: 0,
            },
        );
        return Some(0);
    };

    if now.duration_since(window.opened_at) < interval {
        window.suppressed += 1;
        return None;
    }

    let suppressed = std::mem::take(&mut window.suppressed);
    window.opened_at = now;
    Some(suppressed)
}
