use clap::{Parser, Subcommand};
use day0_api::build_app;
use day0_api::config::AppConfig;
use day0_api::database::Database;
use poem::{listener::TcpListener, Server};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "api-server")]
#[command(about = "Day0 case record API server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let cli = Cli::parse();

    // Load .env file if it exists
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {:#}", e);
        std::io::Error::other(format!("Invalid configuration: {}", e))
    })?;

    match cli.command {
        Commands::Serve => serve_command(config).await,
        Commands::Migrate => open_database(&config).await.map(|_| ()),
    }
}

async fn open_database(config: &AppConfig) -> Result<Arc<Database>, std::io::Error> {
    match Database::new(&config.database_url).await {
        Ok(db) => Ok(Arc::new(db)),
        Err(e) => {
            tracing::error!(
                "Failed to initialize database at {}: {:#}",
                config.database_url,
                e
            );
            Err(std::io::Error::other(format!(
                "Database initialization failed: {}",
                e
            )))
        }
    }
}

async fn serve_command(config: AppConfig) -> Result<(), std::io::Error> {
    let db = open_database(&config).await?;
    let addr = config.listen_addr();
    tracing::info!(
        "Starting Day0 case API on {} ({})",
        addr,
        config.environment
    );

    let app = build_app(db.clone(), Arc::new(config));
    let result = Server::new(TcpListener::bind(&addr)).run(app).await;
    db.close().await;
    result
}
