/// Re-export `Config` from `pagecount-core` for use within this crate.
///
/// All environment-variable parsing lives in `pagecount-core` so it can be
/// shared with integration tests without depending on the full server.
pub use pagecount_core::config::{CacheBackend, Config};
