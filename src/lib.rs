pub mod cli;
pub mod config;
pub mod dir_watcher;
pub mod log;
pub mod models;
pub mod uploader;
pub mod walker;
