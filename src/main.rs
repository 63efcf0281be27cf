use std::sync::Arc;

use log::info;

use latra_telematics_gateway::config::{GatewayConfig, DATABASE_URL_ENV_KEY};
use latra_telematics_gateway::listener::Listener;
use latra_telematics_gateway::persistence::MySqlVehicleStore;
use latra_telematics_gateway::utils::read_env_variable;

/// LATRA Telematics Gateway
///
/// This application terminates TCP connections from Teltonika-style GPS
/// trackers, decodes their Codec 8 / 8E AVL frames, classifies every record
/// into a LATRA activity and forwards the reports to the regulator API,
/// keeping a local audit trail of every ingestion attempt.
#[tokio::main]
async fn main() {
    env_logger::init();

    info!("Starting LATRA Telematics Gateway...");

    let config = GatewayConfig::from_env();
    let database_url: String = read_env_variable(DATABASE_URL_ENV_KEY);
    let store = match MySqlVehicleStore::connect(&database_url).await {
        Ok(store) => Arc::new(store),
        Err(error) => {
            panic!("Failed to connect to database: {}", error);
        }
    };

    let listener = Arc::new(Listener::new(config, store));
    if let Err(error) = listener.serve().await {
        panic!("Failed to bind to address: {}", error);
    }
}
