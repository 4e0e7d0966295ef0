// Core modules
pub mod api;
pub mod backtest;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod strategy;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::EngineError;
pub use models::*;
pub use strategy::{SignalGenerator, Strategy};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
