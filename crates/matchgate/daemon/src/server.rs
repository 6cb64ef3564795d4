//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::service::{ServiceSettings, SessionService};
use matchgate_credential::CredentialAuthority;
use matchgate_storage::{InMemoryStore, MatchgateStorage};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Matchgate daemon server
pub struct Server {
    config: DaemonConfig,
    service: Arc<SessionService>,
}

impl Server {
    /// Open storage and build the session service.
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate().map_err(DaemonError::Config)?;

        let storage = open_storage(&config).await?;
        let authority = CredentialAuthority::new(config.credentials.secret.as_bytes())?;
        let service = Arc::new(SessionService::new(
            storage,
            authority,
            ServiceSettings::from_config(&config),
        ));

        Ok(Self { config, service })
    }

    pub fn service(&self) -> Arc<SessionService> {
        self.service.clone()
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.service.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("matchgate daemon listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("matchgate daemon shutting down");
        Ok(())
    }
}

/// Build the configured storage backend.
pub async fn open_storage(config: &DaemonConfig) -> DaemonResult<Arc<dyn MatchgateStorage>> {
    let session_offset = config.counters.session_offset;
    match &config.storage {
        StorageConfig::Memory => {
            tracing::warn!("using in-memory storage; players and matches are lost on restart");
            Ok(Arc::new(InMemoryStore::with_session_offset(session_offset)))
        }
        #[cfg(feature = "sqlite")]
        StorageConfig::Sqlite {
            url,
            max_connections,
            busy_timeout_secs,
        } => {
            let store = matchgate_storage::SqliteStore::connect_with_options(
                url,
                *max_connections,
                *busy_timeout_secs,
                session_offset,
            )
            .await?;
            tracing::info!(url = %url, "sqlite storage ready");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageConfig::Sqlite { .. } => Err(DaemonError::Config(
            "sqlite storage requested but the daemon was built without the `sqlite` feature"
                .to_string(),
        )),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
