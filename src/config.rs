use std::path::PathBuf;

use crate::utils::{read_env_variable, read_env_variable_with_default_value, read_optional_env_variable};

pub const LATRA_API_URL_ENV_KEY: &str = "LATRA_API_URL";
pub const LATRA_API_TOKEN_ENV_KEY: &str = "LATRA_API_TOKEN";
pub const DATABASE_URL_ENV_KEY: &str = "DATABASE_URL";
pub const LISTEN_HOST_ENV_KEY: &str = "LISTEN_HOST";
pub const LISTEN_PORT_ENV_KEY: &str = "LISTEN_PORT";
pub const WORKER_POOL_SIZE_ENV_KEY: &str = "WORKER_POOL_SIZE";
pub const VEHICLE_CACHE_TTL_ENV_KEY: &str = "VEHICLE_CACHE_TTL_SECONDS";
pub const FALLBACK_LATITUDE_ENV_KEY: &str = "FALLBACK_LATITUDE";
pub const FALLBACK_LONGITUDE_ENV_KEY: &str = "FALLBACK_LONGITUDE";
pub const AVL_LOG_DIR_ENV_KEY: &str = "AVL_LOG_DIR";

/// Runtime configuration for the gateway.
///
/// Everything is sourced from the environment once at startup; the rest of the
/// process receives this struct through the [`crate::listener::Listener`] it
/// belongs to.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub latra_api_url: String,
    pub latra_api_token: String,
    pub listen_host: String,
    pub listen_port: u16,
    pub worker_pool_size: usize,
    pub vehicle_cache_ttl_seconds: u64,
    pub fallback_latitude: f64,
    pub fallback_longitude: f64,
    /// Base directory for base64-encoded raw frame capture. Disabled when unset.
    pub avl_log_dir: Option<PathBuf>,
}

impl GatewayConfig {
    /// Reads the configuration from the environment.
    ///
    /// Panics if a required variable is missing or unparseable, so a
    /// misconfigured process exits non-zero before binding the socket.
    pub fn from_env() -> Self {
        GatewayConfig {
            latra_api_url: read_env_variable(LATRA_API_URL_ENV_KEY),
            latra_api_token: read_env_variable(LATRA_API_TOKEN_ENV_KEY),
            listen_host: read_env_variable_with_default_value(LISTEN_HOST_ENV_KEY, String::from("0.0.0.0")),
            listen_port: read_env_variable_with_default_value(LISTEN_PORT_ENV_KEY, 2000),
            worker_pool_size: read_env_variable_with_default_value(WORKER_POOL_SIZE_ENV_KEY, 10),
            vehicle_cache_ttl_seconds: read_env_variable_with_default_value(VEHICLE_CACHE_TTL_ENV_KEY, 300),
            fallback_latitude: read_env_variable_with_default_value(FALLBACK_LATITUDE_ENV_KEY, -1.286389),
            fallback_longitude: read_env_variable_with_default_value(FALLBACK_LONGITUDE_ENV_KEY, 36.817223),
            avl_log_dir: read_optional_env_variable::<String>(AVL_LOG_DIR_ENV_KEY).map(PathBuf::from),
        }
    }

    /// Address the TCP listener binds to.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_address() {
        let config = GatewayConfig {
            latra_api_url: String::from("http://localhost/api"),
            latra_api_token: String::from("dGVzdDp0ZXN0"),
            listen_host: String::from("0.0.0.0"),
            listen_port: 2000,
            worker_pool_size: 10,
            vehicle_cache_ttl_seconds: 300,
            fallback_latitude: -1.286389,
            fallback_longitude: 36.817223,
            avl_log_dir: None,
        };

        assert_eq!(config.listen_address(), "0.0.0.0:2000");
    }
}
