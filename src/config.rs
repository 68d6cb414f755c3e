use anyhow::Context;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Process configuration, read once at startup and carried in app state.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Expected `x-api-key` value. When unset the gate is open (local dev).
    pub api_key: Option<String>,
    /// Deadline applied to every ingest/aggregate/query operation.
    pub request_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let bind_addr = env::var("AVWATCH_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse()
            .context("AVWATCH_BIND is not a valid socket address")?;

        let api_key = env::var("AVWATCH_API_KEY").ok().filter(|k| !k.is_empty());

        let timeout_secs: u64 = env::var("AVWATCH_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("AVWATCH_REQUEST_TIMEOUT_SECS is not a number")?;

        Ok(Self {
            database_url,
            bind_addr,
            api_key,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
