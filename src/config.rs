use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Context};
use serde::Deserialize;

/// Tokens may live at most one year.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

const DEFAULT_LOG_FILTER: &str = "authapi=debug,axum=info,tower_http=info,sqlx=warn";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` selects the in-memory user store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub rate_limit_per_minute: u32,
    pub host: IpAddr,
    pub port: u16,
    /// `RUST_LOG` directive string.
    pub log_filter: String,
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let jwt = JwtConfig {
            secret: lookup("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "authapi".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "authapi-users".into()),
            ttl_minutes: parse_or(&lookup, "JWT_TTL_MINUTES", 30)?,
        };
        if jwt.ttl_minutes <= 0 {
            bail!("JWT_TTL_MINUTES must be positive");
        }
        if jwt.ttl_minutes > MAX_TTL_MINUTES {
            bail!("JWT_TTL_MINUTES must be at most {MAX_TTL_MINUTES}");
        }

        let rate_limit_per_minute = parse_or(&lookup, "RATE_LIMIT_PER_MINUTE", 60)?;
        if rate_limit_per_minute == 0 {
            bail!("RATE_LIMIT_PER_MINUTE must be at least 1");
        }

        let log_json = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => false,
            Some("json") => true,
            Some(other) => bail!("invalid LOG_FORMAT={other:?}: expected \"text\" or \"json\""),
        };

        Ok(Self {
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            jwt,
            rate_limit_per_minute,
            host: parse_or(&lookup, "APP_HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&lookup, "APP_PORT", 8080)?,
            log_filter: lookup("RUST_LOG")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.into()),
            log_json,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.database_max_connections, 10);
        assert_eq!(cfg.jwt.issuer, "authapi");
        assert_eq!(cfg.jwt.audience, "authapi-users");
        assert_eq!(cfg.jwt.ttl_minutes, 30);
        assert_eq!(cfg.rate_limit_per_minute, 60);
        assert_eq!(cfg.listen_addr(), SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(cfg.log_filter, DEFAULT_LOG_FILTER);
        assert!(!cfg.log_json);
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "x"),
            ("DATABASE_URL", "postgres://localhost/app"),
            ("RATE_LIMIT_PER_MINUTE", "5"),
            ("JWT_TTL_MINUTES", "15"),
            ("APP_HOST", "127.0.0.1"),
            ("APP_PORT", "9000"),
            ("RUST_LOG", "authapi=trace"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(cfg.rate_limit_per_minute, 5);
        assert_eq!(cfg.jwt.ttl_minutes, 15);
        assert_eq!(cfg.listen_addr(), SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(cfg.log_filter, "authapi=trace");
        assert!(cfg.log_json);
    }

    #[test]
    fn ttl_must_fit_in_a_year() {
        let with_ttl = |ttl: &str| {
            AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "x"), ("JWT_TTL_MINUTES", ttl)]))
        };
        assert_eq!(with_ttl("525600").unwrap().jwt.ttl_minutes, MAX_TTL_MINUTES);
        let err = with_ttl("525601").unwrap_err();
        assert!(err.to_string().contains("JWT_TTL_MINUTES"));
        assert!(with_ttl("10000000000000").is_err());
        assert!(with_ttl("0").is_err());
        assert!(with_ttl("-5").is_err());
    }

    #[test]
    fn rejects_bad_listen_and_log_settings() {
        for (key, value) in [
            ("APP_PORT", "http"),
            ("APP_PORT", "70000"),
            ("APP_HOST", "not a host"),
            ("LOG_FORMAT", "yaml"),
        ] {
            let err = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "x"), (key, value)]))
                .unwrap_err();
            assert!(err.to_string().contains(key), "{key}={value}: {err}");
        }
    }

    #[test]
    fn rejects_garbage_and_zero_limits() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "x"),
            ("RATE_LIMIT_PER_MINUTE", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_PER_MINUTE"));

        assert!(AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "x"),
            ("RATE_LIMIT_PER_MINUTE", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn blank_database_url_means_memory_store() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "x"), ("DATABASE_URL", "  ")]))
            .unwrap();
        assert!(cfg.database_url.is_none());
    }
}
