use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::utils::generate_secret;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("SECRET_KEY_BASE must be at least 32 bytes long")]
    WeakSecret,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub redis_connect_timeout_secs: u64,
    pub redis_response_timeout_secs: u64,
    pub secret_key_base: String,
    pub session_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub sweep_interval_secs: u64,
    pub shutdown_grace_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let secret_key_base = match var("SECRET_KEY_BASE") {
            Some(secret) if secret.len() < MIN_SECRET_LEN => return Err(ConfigError::WeakSecret),
            Some(secret) => secret,
            None => {
                let secret = generate_secret();
                tracing::warn!(
                    "SECRET_KEY_BASE is not set, generated one for this process. \
                     Store it, otherwise every session token fails to verify after a restart:\n{}",
                    secret
                );
                secret
            }
        };

        // 与令牌有效期一致，单位小时，允许 "48h" 这样的写法
        let session_hours: u64 = match var("SESSION_EXPIRATION") {
            Some(raw) => parse("SESSION_EXPIRATION", raw.trim_end_matches('h'))?,
            None => 48,
        };

        let rate_limit_requests: u32 = parse_or(&var, "RATE_LIMIT_REQUESTS", 1200)?;
        if rate_limit_requests == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_REQUESTS",
                value: "0".into(),
            });
        }

        Ok(Config {
            database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            redis_url: var("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            redis_connect_timeout_secs: parse_or(&var, "REDIS_CONNECT_TIMEOUT", 10)?,
            redis_response_timeout_secs: parse_or(&var, "REDIS_RESPONSE_TIMEOUT", 15)?,
            secret_key_base,
            session_expiration_secs: positive("SESSION_EXPIRATION", session_hours)? * 3600,
            rate_limit_window_secs: positive(
                "RATE_LIMIT_WINDOW",
                parse_or(&var, "RATE_LIMIT_WINDOW", 3600)?,
            )?,
            rate_limit_requests,
            sweep_interval_secs: positive(
                "CACHE_SWEEP_INTERVAL",
                parse_or(&var, "CACHE_SWEEP_INTERVAL", 60)?,
            )?,
            shutdown_grace_secs: parse_or(&var, "SHUTDOWN_GRACE_PERIOD", 5)?,
            server_host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: parse_or(&var, "SERVER_PORT", 3000)?,
            api_base_uri: var("API_BASE_URI").unwrap_or_else(|| "/api".into()),
        })
    }

    pub fn redis_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.redis_connect_timeout_secs)
    }

    pub fn redis_response_timeout(&self) -> Duration {
        Duration::from_secs(self.redis_response_timeout_secs)
    }

    pub fn session_expiration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_expiration_secs as i64)
    }

    pub fn rate_limit_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.rate_limit_window_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

// 时长类配置不能为 0；上限保证换算成 chrono::Duration 不会溢出
fn positive(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 || value > 10 * 365 * 24 * 3600 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
impl Config {
    pub fn default_for_test() -> Self {
        Self::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/lingo_test".into()),
            "SECRET_KEY_BASE" => Some("test-secret-key-base-that-is-long-enough".into()),
            _ => None,
        })
        .expect("test configuration is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://db")]).unwrap();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.session_expiration(), chrono::Duration::days(2));
        assert_eq!(config.rate_limit_window(), chrono::Duration::hours(1));
        assert_eq!(config.rate_limit_requests, 1200);
        assert_eq!(config.redis_connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.redis_response_timeout(), Duration::from_secs(15));
        assert_eq!(config.api_base_uri, "/api");
        // 未配置时自动生成
        assert_eq!(config.secret_key_base.len(), 64);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db"),
            ("SESSION_EXPIRATION", "24h"),
            ("RATE_LIMIT_WINDOW", "60"),
            ("RATE_LIMIT_REQUESTS", "500"),
            ("SECRET_KEY_BASE", "0123456789abcdef0123456789abcdef"),
        ])
        .unwrap();
        assert_eq!(config.session_expiration(), chrono::Duration::days(1));
        assert_eq!(config.rate_limit_window_secs, 60);
        assert_eq!(config.rate_limit_requests, 500);
        assert_eq!(config.secret_key_base, "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("DATABASE_URL"))));
        assert!(matches!(
            load(&[("DATABASE_URL", "x"), ("SECRET_KEY_BASE", "short")]),
            Err(ConfigError::WeakSecret)
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "x"), ("RATE_LIMIT_REQUESTS", "0")]),
            Err(ConfigError::Invalid { key: "RATE_LIMIT_REQUESTS", .. })
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "x"), ("RATE_LIMIT_WINDOW", "soon")]),
            Err(ConfigError::Invalid { key: "RATE_LIMIT_WINDOW", .. })
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "x"), ("CACHE_SWEEP_INTERVAL", "0")]),
            Err(ConfigError::Invalid { key: "CACHE_SWEEP_INTERVAL", .. })
        ));
    }
}
