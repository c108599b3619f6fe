use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("dedup cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("dedup cache call timed out")]
    CacheTimeout,

    #[error("counter store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("counter store call timed out")]
    StoreTimeout,

    #[error("resource {0} not found")]
    ResourceNotFound(i64),
}
