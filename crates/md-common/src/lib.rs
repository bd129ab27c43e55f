pub mod config;

pub use config::EnvConfig;
