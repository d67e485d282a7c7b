//! Shared utilities for futures-consensus
//!
//! This crate provides common functionality used across the workspace,
//! including logging setup, `.env`/environment configuration loading, and
//! small parsing helpers.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigError, env_bool, env_list, env_parse, env_var, load_dotenv, require_env};
pub use logging::{LogFormat, init_tracing, init_tracing_with};
