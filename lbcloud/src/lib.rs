pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::AppError;
pub use utils::state::AppState;
