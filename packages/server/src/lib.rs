pub mod app;
pub mod config;
pub mod routes;
pub mod services;

pub use app::{build_app, AppState};
pub use config::Config;
