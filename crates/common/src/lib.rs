//! Shared configuration and platform helpers for the exam console workspace.

pub mod config;
pub mod platform;

pub use config::{Config, ConfigError};
