pub mod app;
pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod state;

#[cfg(feature = "redis")]
pub mod redis_cache;
