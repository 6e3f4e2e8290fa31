//! quilld - Quill poem and pull request service

use anyhow::Context;
use clap::{Parser, ValueEnum};
use quill_service::config::{ServiceConfig, StorageConfig};
use quill_service::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StorageMode {
    /// Postgres when a database URL is given, otherwise the configured backend
    Auto,
    Memory,
    Postgres,
}

/// quilld CLI
#[derive(Parser)]
#[command(name = "quilld")]
#[command(about = "Quill - poem publishing with reviewable edit proposals", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUILL_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "QUILL_LISTEN_ADDR")]
    listen: Option<String>,

    /// Storage backend
    #[arg(long, env = "QUILL_STORAGE", value_enum, default_value_t = StorageMode::Auto)]
    storage: StorageMode,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Image rendering endpoint
    #[arg(long, env = "QUILL_RENDER_ENDPOINT")]
    render_endpoint: Option<String>,

    /// Log level
    #[arg(long, env = "QUILL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "QUILL_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        ServiceConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    apply_overrides(&mut config, &cli)?;

    init_tracing(&config.logging.level, config.logging.json);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        "starting quilld"
    );

    let server = Server::new(config).await?;
    server.run().await?;
    Ok(())
}

fn apply_overrides(config: &mut ServiceConfig, cli: &Cli) -> anyhow::Result<()> {
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("invalid listen address `{listen}`"))?;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json {
        config.logging.json = true;
    }
    if let Some(endpoint) = &cli.render_endpoint {
        config.render.endpoint = Some(endpoint.clone());
    }

    config.storage = match (cli.storage, &cli.database_url) {
        (StorageMode::Memory, _) => StorageConfig::Memory,
        (StorageMode::Postgres | StorageMode::Auto, Some(url)) => {
            postgres_with_url(&config.storage, url)
        }
        (StorageMode::Postgres, None) => match &config.storage {
            StorageConfig::Postgres { .. } => config.storage.clone(),
            StorageConfig::Memory => {
                anyhow::bail!("--storage postgres needs --database-url or a [storage] url")
            }
        },
        (StorageMode::Auto, None) => config.storage.clone(),
    };
    Ok(())
}

/// Keep configured pool settings, swap the URL.
fn postgres_with_url(current: &StorageConfig, url: &str) -> StorageConfig {
    match current {
        StorageConfig::Postgres {
            max_connections,
            connect_timeout_secs,
            ..
        } => StorageConfig::Postgres {
            url: url.to_string(),
            max_connections: *max_connections,
            connect_timeout_secs: *connect_timeout_secs,
        },
        StorageConfig::Memory => StorageConfig::Postgres {
            url: url.to_string(),
            max_connections: 10,
            connect_timeout_secs: 5,
        },
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
