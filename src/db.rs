use anyhow::Context;
use serde::Serialize;
use sqlx::{
    migrate::Migrator,
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};
use time::OffsetDateTime;
use tracing::{error, info};

use crate::config::DbConfig;

/// Schema for the `users` table, embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Result of the liveness probe.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub ok: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub server_time: Option<OffsetDateTime>,
    pub error: Option<String>,
}

pub fn connect_options(cfg: &DbConfig) -> anyhow::Result<PgConnectOptions> {
    let options = match &cfg.url {
        Some(url) => url
            .parse::<PgConnectOptions>()
            .context("parse DATABASE_URL")?,
        None => {
            let options = PgConnectOptions::new()
                .host(&cfg.host)
                .port(cfg.port)
                .database(&cfg.name)
                .username(&cfg.user)
                .ssl_mode(PgSslMode::Disable);
            match &cfg.password {
                Some(password) => options.password(password),
                None => options,
            }
        }
    };

    // Encrypted but unverified, matching managed Postgres providers.
    Ok(if cfg.secure {
        options.ssl_mode(PgSslMode::Require)
    } else {
        options
    })
}

/// Build the process-wide pool. Connections are opened on first use, so
/// an unreachable database does not stop start-up.
pub fn connect(cfg: &DbConfig, max_connections: u32) -> anyhow::Result<PgPool> {
    let options = connect_options(cfg)?;
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_lazy_with(options);
    info!(host = %cfg.host, port = cfg.port, database = %cfg.name, secure = cfg.secure, "database pool created");
    Ok(pool)
}

/// Run `SELECT NOW()` against the pool. Failures are logged and reported
/// in the returned [`Health`], never raised.
pub async fn ping(db: &PgPool) -> Health {
    match sqlx::query_scalar::<_, OffsetDateTime>("SELECT NOW()")
        .fetch_one(db)
        .await
    {
        Ok(now) => {
            info!(server_time = %now, "database connected");
            Health {
                ok: true,
                server_time: Some(now),
                error: None,
            }
        }
        Err(e) => {
            error!(error = %e, "database connection error");
            Health {
                ok: false,
                server_time: None,
                error: Some(e.to_string()),
            }
        }
    }
}

pub async fn close(db: PgPool) {
    db.close().await;
    info!("database pool closed");
}
