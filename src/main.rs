mod cli;
mod startup;

use clap::Parser;
use cli::{Cli, Commands, DbCommands, TxCommands};
use pix_contact_gate::config::Config;
use pix_contact_gate::{build_state, create_app, db};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(Config::from_env()?).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&Config::from_env()?).await,
        Commands::Tx(TxCommands::Reconcile { payment_id }) => {
            cli::handle_tx_reconcile(&Config::from_env()?, &payment_id).await
        }
        Commands::Config => {
            let config = Config::from_env()?;
            cli::handle_config_validate(&config)?;

            let pool = match db::create_pool(&config).await {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!(error = %e, "database unreachable");
                    None
                }
            };
            let report = startup::validate_environment(&config, pool.as_ref()).await;
            report.print();
            if !report.is_valid() {
                anyhow::bail!("startup validation failed");
            }
            Ok(())
        }
        Commands::Watch(args) => cli::handle_watch(args).await,
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let state = build_state(&config, pool);
    let app = create_app(state, &config.cors_allowed_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
