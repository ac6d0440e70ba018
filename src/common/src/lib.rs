pub mod config;
pub mod error;
pub mod types;

pub use types::DEFAULT_HOST;
pub use types::SYSTEM_PROPERTIES;
