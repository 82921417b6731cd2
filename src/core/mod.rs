pub mod config;
pub mod db;
pub mod storage;

pub use config::AppConfig;
pub use storage::*;
