// This module re-exports important pieces for convenience,
// so we can "use crate::config::*" easily.
pub mod client;
pub mod logging;
pub mod types;

pub use client::*;
pub use logging::*;
pub use types::*;
