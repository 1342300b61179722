pub mod config;
pub mod upload;
