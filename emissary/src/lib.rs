pub mod config;
pub mod controller;

pub use config::{ConfigError, MailerConfig, QueueConfig};
pub use controller::Emissary;
