use anyhow::Context;

/// Connection settings for the accounts database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: Option<String>,
    pub secure: bool, // TLS, enabled in production
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DbConfig,
    pub http_host: String,
    pub http_port: u16,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("DB_PORT") {
            Some(v) => v
                .trim()
                .parse::<u16>()
                .with_context(|| format!("DB_PORT is not a valid port: {v:?}"))?,
            None => 5432,
        };
        let secure = lookup("APP_ENV").as_deref() == Some("production");

        Ok(Self {
            url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            host: lookup("DB_HOST").unwrap_or_else(|| "localhost".into()),
            port,
            name: lookup("DB_NAME").unwrap_or_else(|| "neolink".into()),
            user: lookup("DB_USER").unwrap_or_else(|| "postgres".into()),
            password: lookup("DB_PASSWORD"),
            secure,
        })
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = DbConfig::from_lookup(&lookup)?;
        let http_port = match lookup("APP_PORT") {
            Some(v) => v.parse::<u16>().context("APP_PORT is not a valid port")?,
            None => 8080,
        };
        let max_connections = lookup("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        Ok(Self {
            database,
            http_host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            http_port,
            max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let cfg = AppConfig::from_lookup(env(&[])).expect("defaults parse");
        assert_eq!(cfg.database.host, "localhost");
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.database.name, "neolink");
        assert_eq!(cfg.database.user, "postgres");
        assert!(cfg.database.password.is_none());
        assert!(cfg.database.url.is_none());
        assert!(!cfg.database.secure);
        assert_eq!(cfg.http_host, "0.0.0.0");
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.max_connections, 10);
    }

    #[test]
    fn reads_discrete_database_settings() {
        let cfg = DbConfig::from_lookup(env(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_NAME", "accounts"),
            ("DB_USER", "neo"),
            ("DB_PASSWORD", "s3cret"),
        ]))
        .expect("parse");
        assert_eq!(cfg.host, "db.internal");
        assert_eq!(cfg.port, 6543);
        assert_eq!(cfg.name, "accounts");
        assert_eq!(cfg.user, "neo");
        assert_eq!(cfg.password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn secure_transport_only_in_production() {
        let prod = DbConfig::from_lookup(env(&[("APP_ENV", "production")])).unwrap();
        assert!(prod.secure);
        let dev = DbConfig::from_lookup(env(&[("APP_ENV", "development")])).unwrap();
        assert!(!dev.secure);
    }

    #[test]
    fn rejects_bad_port() {
        let err = DbConfig::from_lookup(env(&[("DB_PORT", "not-a-port")])).unwrap_err();
        assert!(err.to_string().contains("DB_PORT"));
    }

    #[test]
    fn empty_database_url_is_ignored() {
        let cfg = DbConfig::from_lookup(env(&[("DATABASE_URL", "")])).unwrap();
        assert!(cfg.url.is_none());
    }
}
