//! Error handling for the cache engine
//!
//! Every variant carries a [`RecoveryHint`] so callers can decide between
//! retrying, bypassing the cache, or treating the failure as a miss.

mod conversions;
mod display;
mod recovery;
mod types;

pub use types::*;
