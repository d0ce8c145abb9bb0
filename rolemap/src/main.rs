use clap::Parser;
use rolemap::db::handlers::{LoginAttempts, Permissions, Roles, Users};
use rolemap::{Config, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = rolemap::config::Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry(&config.log_filter)?;

    tracing::debug!("{:?}", args);

    let pool = rolemap::setup_database(&config).await?;

    let mut conn = pool.acquire().await?;
    let permissions = Permissions::new(&mut conn).count().await?;
    let roles = Roles::new(&mut conn).count().await?;
    let users = Users::new(&mut conn).count().await?;
    let login_attempts = LoginAttempts::new(&mut conn).count().await?;
    drop(conn);

    tracing::info!(permissions, roles, users, login_attempts, "Authorization store summary");

    pool.close().await;
    Ok(())
}
