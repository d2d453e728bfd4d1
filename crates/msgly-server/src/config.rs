use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl: chrono::Duration,
    pub db_busy_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("MSGLY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MSGLY_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let db_path = get("MSGLY_DB_PATH").unwrap_or_else(|| "msgly.db".into()).into();
        let host = get("MSGLY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("MSGLY_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("MSGLY_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("MSGLY_HOST must be an IP address")?;

        let ttl_hours: i64 = get("MSGLY_TOKEN_TTL_HOURS")
            .map(|v| v.parse::<i64>())
            .transpose()
            .context("MSGLY_TOKEN_TTL_HOURS must be an integer")?
            .unwrap_or(24);
        if ttl_hours <= 0 {
            bail!("MSGLY_TOKEN_TTL_HOURS must be positive");
        }

        let busy_ms: u64 = get("MSGLY_DB_BUSY_TIMEOUT_MS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("MSGLY_DB_BUSY_TIMEOUT_MS must be an integer")?
            .unwrap_or(5000);

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            token_ttl: chrono::Duration::hours(ttl_hours),
            db_busy_timeout: Duration::from_millis(busy_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("MSGLY_JWT_SECRET", "s3cr3t")]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("msgly.db"));
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.token_ttl, chrono::Duration::hours(24));
        assert_eq!(config.db_busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn placeholder_secret_is_refused() {
        assert!(load(&[]).is_err());
        assert!(load(&[("MSGLY_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("MSGLY_JWT_SECRET", "s3cr3t"),
            ("MSGLY_HOST", "127.0.0.1"),
            ("MSGLY_PORT", "8080"),
            ("MSGLY_TOKEN_TTL_HOURS", "2"),
        ])
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.token_ttl, chrono::Duration::hours(2));

        assert!(load(&[("MSGLY_JWT_SECRET", "s3cr3t"), ("MSGLY_PORT", "http")]).is_err());
        assert!(load(&[("MSGLY_JWT_SECRET", "s3cr3t"), ("MSGLY_TOKEN_TTL_HOURS", "0")]).is_err());
    }
}
