//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The database URL is wrapped in `secrecy::SecretString` so it never
//! lands in logs.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Identity recorded in the `worker` field of claimed jobs.
    pub worker_id: String,
    /// Optional TOML file with task metadata overrides.
    pub tasks_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call [`Config::from_dotenv`] instead to read `.env` first.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            worker_id: std::env::var("JOBQ_WORKER_ID").unwrap_or_else(|_| default_worker_id()),
            tasks_file: std::env::var("JOBQ_TASKS_FILE").ok().map(PathBuf::from),
        })
    }

    /// Read a `.env` file if one exists, then load from the environment.
    pub fn from_dotenv() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// `<hostname>:<pid>`, unique enough to tell workers apart in the store.
fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{host}:{}", std::process::id())
}
