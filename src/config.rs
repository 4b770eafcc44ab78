use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    /// Unset means the in-memory store.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub store_timeout: Duration,
    pub db_max_connections: u32,
    /// JSON reference data for the in-memory store.
    pub seed_file: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let store_timeout_ms = env::var("STORE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(2000);
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);
        let seed_file = env::var("SEED_FILE").ok().filter(|s| !s.trim().is_empty());

        Ok(Self {
            database_url,
            bind_addr,
            store_timeout: Duration::from_millis(store_timeout_ms),
            db_max_connections,
            seed_file,
        })
    }
}
