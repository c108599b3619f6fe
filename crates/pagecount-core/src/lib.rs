pub mod config;
pub mod counter;
pub mod dedup;
pub mod error;
pub mod service;
pub mod visitor;
