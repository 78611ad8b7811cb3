//! Applies the schema and inserts the demo accounts that are missing.

use std::process::ExitCode;

use neolink_accounts::{
    config::AppConfig,
    db,
    telemetry,
    users::{
        repo::UserRepo,
        seed::{seed_accounts, DEMO_ACCOUNTS},
    },
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    telemetry::init();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let pool = match db::connect(&config.database, config.max_connections) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "error creating database pool");
            return ExitCode::FAILURE;
        }
    };

    let code = run(UserRepo::new(pool.clone())).await;
    db::close(pool).await;
    code
}

async fn run(repo: UserRepo) -> ExitCode {
    db::ping(repo.pool()).await;

    if let Err(e) = db::MIGRATOR.run(repo.pool()).await {
        error!(error = %e, "error initializing database schema");
        return ExitCode::FAILURE;
    }
    info!("database schema created");

    info!("creating initial users");
    let report = seed_accounts(&repo, DEMO_ACCOUNTS).await;
    info!(
        created = report.created.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "database initialization completed"
    );
    ExitCode::SUCCESS
}
