pub mod backend;
pub mod counter;
pub mod post;
pub mod schema;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `pagecount_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
