use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_API_BASE: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://popular_movies.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3146";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    /// Empty when unset; every catalog call then fails with a 401 API error.
    pub api_key: String,
    pub api_base_url: String,
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub default_language: Option<String>,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = match get("TMDB_API_KEY") {
            Some(key) => {
                info!("TMDB API key found");
                key
            }
            None => {
                warn!("TMDB_API_KEY is not set; catalog requests will be rejected");
                String::new()
            }
        };
        let api_base_url = get("TMDB_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let database_url =
            get("FAVORITES_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR is not a valid socket address")?;
        let default_language = get("TMDB_LANGUAGE");
        let timeout_secs = match get("TMDB_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("TMDB_TIMEOUT_SECS must be a number, got '{}'", raw))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key,
            api_base_url,
            database_url,
            bind_addr,
            default_language,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
