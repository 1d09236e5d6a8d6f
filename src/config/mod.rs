use std::{env, fmt::Display, net::SocketAddr, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::services::code::DEFAULT_CODE_LENGTH;
use crate::services::guard::DEFAULT_GUARD_TIMEOUT;
use crate::services::issuer::DEFAULT_MAX_MINT_ATTEMPTS;
use crate::services::redeemer::DEFAULT_SEARCH_LIMIT;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_ADMIN_PAGE_LIMIT: usize = 200;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs against the in-memory backend.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub guard_timeout: Duration,
    pub search_limit: usize,
    pub admin_page_limit: usize,
    pub code_length: usize,
    pub max_mint_attempts: u32,
    /// Seeds an admin session on the in-memory backend.
    pub bootstrap_admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: optional("DATABASE_URL"),
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            bind_addr: try_load("BIND_ADDR", default_bind_addr()),
            guard_timeout: Duration::from_millis(try_load(
                "GUARD_TIMEOUT_MS",
                DEFAULT_GUARD_TIMEOUT.as_millis() as u64,
            )),
            search_limit: try_load("SEARCH_LIMIT", DEFAULT_SEARCH_LIMIT),
            admin_page_limit: try_load("ADMIN_PAGE_LIMIT", DEFAULT_ADMIN_PAGE_LIMIT),
            code_length: try_load("CODE_LENGTH", DEFAULT_CODE_LENGTH),
            max_mint_attempts: try_load("MAX_MINT_ATTEMPTS", DEFAULT_MAX_MINT_ATTEMPTS),
            bootstrap_admin_token: optional("BOOTSTRAP_ADMIN_TOKEN"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            bind_addr: default_bind_addr(),
            guard_timeout: DEFAULT_GUARD_TIMEOUT,
            search_limit: DEFAULT_SEARCH_LIMIT,
            admin_page_limit: DEFAULT_ADMIN_PAGE_LIMIT,
            code_length: DEFAULT_CODE_LENGTH,
            max_mint_attempts: DEFAULT_MAX_MINT_ATTEMPTS,
            bootstrap_admin_token: None,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    parse_or(key, env::var(key).ok(), default)
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = raw else {
        info!("{key} not set, using default: {default}");
        return default;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid {key} value '{raw}': {e}, using default: {default}");
            default
        }
    }
}
