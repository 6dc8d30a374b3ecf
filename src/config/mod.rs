/// Database connection and schema creation
pub mod database;

/// Application settings from config.toml
pub mod settings;

pub use settings::{AppConfig, DispatcherSettings, load_app_configuration, load_config};
