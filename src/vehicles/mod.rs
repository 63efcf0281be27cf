use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::persistence::VehicleStore;

/// The vehicle a device reports for.
///
/// A transient identity stands in for an IMEI with no registered vehicle: the
/// report still goes upstream under the last six digits of the IMEI, but no
/// audit row is written and the identity is not cached, so a late
/// registration is picked up on the next frame.
#[derive(Clone, Debug, Serialize)]
pub struct VehicleIdentity {
    pub id: Option<i64>,
    pub name: String,
    pub registration: String,
    pub imei: String,
    pub transient: bool,
}

impl VehicleIdentity {
    /// Synthesizes the transient identity for an unknown IMEI.
    pub fn transient(imei: &str) -> Self {
        let tail_start = imei.len().saturating_sub(6);
        let tail = imei[tail_start..].to_string();

        VehicleIdentity {
            id: None,
            name: tail.clone(),
            registration: tail,
            imei: imei.to_string(),
            transient: true,
        }
    }
}

/// A cached lookup with its refresh instant.
struct DirectoryEntry {
    identity: VehicleIdentity,
    refreshed_at: Instant,
}

impl DirectoryEntry {
    fn new(identity: VehicleIdentity) -> Self {
        DirectoryEntry {
            identity,
            refreshed_at: Instant::now(),
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.refreshed_at.elapsed() > ttl
    }
}

/// Process-local IMEI to vehicle identity cache over the persistence
/// collaborator.
///
/// Entries are served while fresher than the TTL; expired entries are evicted
/// opportunistically whenever the last sweep is older than the TTL itself.
pub struct VehicleDirectory {
    store: Arc<dyn VehicleStore>,
    ttl: Duration,
    cache: RwLock<HashMap<String, DirectoryEntry>>,
    last_sweep: RwLock<Instant>,
}

impl VehicleDirectory {
    pub fn new(store: Arc<dyn VehicleStore>, ttl: Duration) -> Self {
        VehicleDirectory {
            store,
            ttl,
            cache: RwLock::new(HashMap::new()),
            last_sweep: RwLock::new(Instant::now()),
        }
    }

    /// Resolves the identity for an IMEI.
    ///
    /// Serves from cache while fresh, otherwise queries the store. A store
    /// miss or error yields a transient identity, which is deliberately not
    /// cached.
    pub async fn resolve(&self, imei: &str) -> VehicleIdentity {
        self.sweep_if_due().await;

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(imei) {
                if !entry.is_stale(self.ttl) {
                    return entry.identity.clone();
                }
            }
        }

        match self.store.find_vehicle_by_imei(imei).await {
            Ok(Some(identity)) => {
                debug!(target: imei, "Resolved vehicle [{}] for IMEI", identity.registration);
                let mut cache = self.cache.write().await;
                cache.insert(imei.to_string(), DirectoryEntry::new(identity.clone()));
                identity
            }
            Ok(None) => {
                warn!(target: imei, "No vehicle registered for IMEI, synthesizing transient identity");
                VehicleIdentity::transient(imei)
            }
            Err(err) => {
                warn!(target: imei, "Vehicle lookup failed ({}), synthesizing transient identity", err);
                VehicleIdentity::transient(imei)
            }
        }
    }

    /// Evicts expired entries when the last sweep is older than the TTL.
    async fn sweep_if_due(&self) {
        {
            let last_sweep = self.last_sweep.read().await;
            if last_sweep.elapsed() <= self.ttl {
                return;
            }
        }

        let mut last_sweep = self.last_sweep.write().await;
        if last_sweep.elapsed() <= self.ttl {
            return;
        }
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| !entry.is_stale(self.ttl));
        debug!("Evicted {} expired vehicle cache entries", before - cache.len());
        *last_sweep = Instant::now();
    }

    #[cfg(test)]
    async fn cached_imeis(&self) -> Vec<String> {
        self.cache.read().await.keys().cloned().collect()
    }
}
