use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use latra_telematics_gateway::persistence::{AuditEntry, StoreFuture, VehicleStore};
use latra_telematics_gateway::vehicles::VehicleIdentity;

/// One recorded audit write.
#[derive(Clone, Debug)]
pub struct AuditRecord {
    pub vehicle_id: i64,
    pub success: bool,
    pub decoded: Value,
    pub response: Value,
}

/// In-memory [`VehicleStore`] that records audit writes for assertions.
#[derive(Default)]
pub struct RecordingStore {
    vehicles: Mutex<Vec<VehicleIdentity>>,
    audits: Mutex<Vec<AuditRecord>>,
}

impl RecordingStore {
    pub fn with_registered_vehicle(id: i64, registration: &str, imei: &str) -> Self {
        let store = Self::default();
        store.vehicles.lock().unwrap().push(VehicleIdentity {
            id: Some(id),
            name: registration.to_string(),
            registration: registration.to_string(),
            imei: imei.to_string(),
            transient: false,
        });
        store
    }

    pub fn audits(&self) -> Vec<AuditRecord> {
        self.audits.lock().unwrap().clone()
    }

    /// Blocks until the background pipeline has written an audit row.
    pub async fn wait_for_audit(&self) -> AuditRecord {
        for _ in 0..200 {
            if let Some(first) = self.audits.lock().unwrap().first() {
                return first.clone();
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("no audit row was written");
    }
}

impl VehicleStore for RecordingStore {
    fn find_vehicle_by_imei<'a>(&'a self, imei: &'a str) -> StoreFuture<'a, Result<Option<VehicleIdentity>, sqlx::Error>> {
        Box::pin(async move {
            let vehicles = self.vehicles.lock().unwrap();
            Ok(vehicles.iter().find(|vehicle| vehicle.imei == imei).cloned())
        })
    }

    fn append_audit(&self, entry: AuditEntry) -> StoreFuture<'_, Result<(), sqlx::Error>> {
        Box::pin(async move {
            self.audits.lock().unwrap().push(AuditRecord {
                vehicle_id: entry.vehicle_id,
                success: entry.success,
                decoded: entry.decoded,
                response: entry.response,
            });
            Ok(())
        })
    }
}
