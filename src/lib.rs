pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod server;

pub use config::Config;
pub use error::{HomeCloudError, Result};
pub use filesystem::{FileStore, StorageTracker};
pub use server::{create_app, AppState, Server};
