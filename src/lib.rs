pub mod access;
pub mod autosave;
pub mod config;
pub mod custom_fields;
pub mod custom_id;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod proto;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
