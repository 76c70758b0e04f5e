//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — Postgres connection string (default: in-memory stores)
/// - `CURRENCY` — default transaction currency (default: `"usd"`)
/// - `WEBHOOK_SECRET` — provider webhook signing secret
/// - `OPERATOR_TOKEN` — bearer token required for refund operations
/// - `WORKERS_PER_QUEUE` — claim loops per queue (default: `2`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub currency: String,
    pub webhook_secret: String,
    pub operator_token: String,
    pub workers_per_queue: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "whsec_dev".to_string()),
            operator_token: std::env::var("OPERATOR_TOKEN")
                .unwrap_or_else(|_| "optok_dev".to_string()),
            workers_per_queue: std::env::var("WORKERS_PER_QUEUE")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(2),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            currency: "usd".to_string(),
            webhook_secret: "whsec_dev".to_string(),
            operator_token: "optok_dev".to_string(),
            workers_per_queue: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.currency, "usd");
        assert_eq!(config.workers_per_queue, 2);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
