use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::net::TcpListener as TokioTcpListener;

use crate::config::GatewayConfig;
use crate::latra::client::LatraClient;
use crate::latra::payload::PayloadBuilder;
use crate::persistence::{AuditSink, VehicleStore};
use crate::teltonika::connection::GatewayConnection;
use crate::vehicles::VehicleDirectory;
use crate::worker::IngestionPool;

/// The gateway's single owner of shared state.
///
/// All process-wide mutable state (the vehicle directory cache, the MGS_ID
/// counter inside the payload builder, the ingestion pool) lives here; every
/// collaborator is an explicit constructor parameter and there are no
/// module-level singletons.
pub struct Listener {
    config: GatewayConfig,
    directory: VehicleDirectory,
    payload_builder: PayloadBuilder,
    transmitter: LatraClient,
    audit: AuditSink,
    pool: IngestionPool,
}

impl Listener {
    /// Wires the gateway together from configuration and the persistence
    /// collaborator.
    pub fn new(config: GatewayConfig, store: Arc<dyn VehicleStore>) -> Self {
        let directory = VehicleDirectory::new(store.clone(), Duration::from_secs(config.vehicle_cache_ttl_seconds));
        let payload_builder = PayloadBuilder::new(config.fallback_latitude, config.fallback_longitude);
        let transmitter = LatraClient::new(config.latra_api_url.clone(), config.latra_api_token.clone());
        let audit = AuditSink::new(store);
        let pool = IngestionPool::new(config.worker_pool_size);

        Listener {
            config,
            directory,
            payload_builder,
            transmitter,
            audit,
            pool,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn directory(&self) -> &VehicleDirectory {
        &self.directory
    }

    pub fn payload_builder(&self) -> &PayloadBuilder {
        &self.payload_builder
    }

    pub fn transmitter(&self) -> &LatraClient {
        &self.transmitter
    }

    pub fn audit(&self) -> &AuditSink {
        &self.audit
    }

    pub fn pool(&self) -> &IngestionPool {
        &self.pool
    }

    /// Accepts device connections until the process stops.
    ///
    /// Each connection runs in its own task; a connection failing never
    /// affects the others.
    pub async fn serve(self: Arc<Self>) -> std::io::Result<()> {
        let address = self.config.listen_address();
        let tcp_listener = TokioTcpListener::bind(&address).await?;
        info!("Listening on: {}", address);

        loop {
            let socket = match tcp_listener.accept().await {
                Ok((socket, peer)) => {
                    info!("Connection from {}", peer);
                    socket
                }
                Err(error) => {
                    warn!("Failed to accept connection: {}", error);
                    continue;
                }
            };

            let listener = self.clone();
            tokio::spawn(async move {
                if let Err(error) = GatewayConnection::handle_connection(socket, listener).await {
                    match error.kind() {
                        ErrorKind::ConnectionAborted | ErrorKind::InvalidData => {
                            warn!("Connection aborted: {}", error);
                        }
                        _ => {}
                    }
                }
            });
        }
    }
}
