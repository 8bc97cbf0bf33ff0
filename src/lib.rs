pub mod cache;
pub mod clusters;
pub mod config;
pub mod error;
