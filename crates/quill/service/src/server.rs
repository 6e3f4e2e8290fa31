//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{ServiceConfig, StorageConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::render::{HttpRenderer, Renderer};
use quill_storage::{InMemoryQuillStorage, QuillStorage};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Quill HTTP server
pub struct Server {
    config: ServiceConfig,
    state: AppState,
}

impl Server {
    /// Connect storage and build application state
    pub async fn new(config: ServiceConfig) -> ServiceResult<Self> {
        let storage = connect_storage(&config.storage).await?;
        let renderer = HttpRenderer::from_config(&config.render)
            .map_err(|e| ServiceError::Config(e.to_string()))?
            .map(|renderer| Arc::new(renderer) as Arc<dyn Renderer>);
        if renderer.is_none() {
            tracing::info!("no rendering endpoint configured; /generate-image will answer 503");
        }

        let state = AppState::new(storage, renderer);
        Ok(Self { config, state })
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> ServiceResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(self.state.clone(), self.config.server.enable_cors);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(%addr, storage = self.state.backend, "quilld listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServiceError::Server(e.to_string()))?;

        tracing::info!("quilld shut down");
        Ok(())
    }
}

async fn connect_storage(config: &StorageConfig) -> ServiceResult<Arc<dyn QuillStorage>> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("using in-memory storage; data is lost on restart");
            Ok(Arc::new(InMemoryQuillStorage::new()))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let store = quill_storage::postgres::PostgresQuillStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            tracing::info!("connected to postgres storage");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(ServiceError::Config(
            "postgres storage requested but quilld was built without the `postgres` feature"
                .to_string(),
        )),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received terminate signal, initiating graceful shutdown");
        }
    }
}
