use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::{debug, error};
use serde_json::Value;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool, Row};

use crate::vehicles::VehicleIdentity;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One persisted ingestion attempt.
pub struct AuditEntry {
    pub vehicle_id: i64,
    pub raw_hex: String,
    pub decoded: Value,
    pub response: Value,
    pub success: bool,
}

/// The persistence collaborator: vehicle lookup by IMEI and the append-only
/// audit log. Everything richer (registration, user management) lives in the
/// administrative system and is out of scope here.
pub trait VehicleStore: Send + Sync {
    fn find_vehicle_by_imei<'a>(&'a self, imei: &'a str) -> StoreFuture<'a, Result<Option<VehicleIdentity>, sqlx::Error>>;

    fn append_audit(&self, entry: AuditEntry) -> StoreFuture<'_, Result<(), sqlx::Error>>;
}

/// MySQL-backed [`VehicleStore`].
pub struct MySqlVehicleStore {
    pool: Pool<MySql>,
}

impl MySqlVehicleStore {
    pub fn new(pool: Pool<MySql>) -> Self {
        MySqlVehicleStore { pool }
    }

    /// Connects a small pool to the given database URL.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = MySqlPoolOptions::new().max_connections(5).connect(database_url).await?;
        Ok(MySqlVehicleStore::new(pool))
    }
}

impl VehicleStore for MySqlVehicleStore {
    fn find_vehicle_by_imei<'a>(&'a self, imei: &'a str) -> StoreFuture<'a, Result<Option<VehicleIdentity>, sqlx::Error>> {
        Box::pin(async move {
            let row = sqlx::query(
                r#"
                SELECT vehicle.id, vehicle.registration_number, device_imei.imei_number
                FROM vehicle
                INNER JOIN device_imei ON device_imei.id = vehicle.imei_id
                WHERE device_imei.imei_number = ?
                "#,
            )
            .bind(imei)
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                return Ok(None);
            };
            let id: i64 = row.try_get("id")?;
            let registration: String = row.try_get("registration_number")?;
            let imei_number: String = row.try_get("imei_number")?;

            Ok(Some(VehicleIdentity {
                id: Some(id),
                name: registration.clone(),
                registration,
                imei: imei_number,
                transient: false,
            }))
        })
    }

    fn append_audit(&self, entry: AuditEntry) -> StoreFuture<'_, Result<(), sqlx::Error>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO reported_data (vehicle_id, raw_data, processed_data, latra_response, is_success, created_at)
                VALUES (?, ?, ?, ?, ?, NOW())
                "#,
            )
            .bind(entry.vehicle_id)
            .bind(entry.raw_hex)
            .bind(entry.decoded.to_string())
            .bind(entry.response.to_string())
            .bind(entry.success)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }
}

/// Writes one audit row per ingestion attempt.
///
/// Transient identities are skipped: there is no vehicle row to attach the
/// audit to, and the matching registration may arrive at any moment. Failures
/// here are logged and swallowed; audit problems never affect the session or
/// the upstream report.
pub struct AuditSink {
    store: Arc<dyn VehicleStore>,
}

impl AuditSink {
    pub fn new(store: Arc<dyn VehicleStore>) -> Self {
        AuditSink { store }
    }

    /// Persists one ingestion attempt.
    ///
    /// # Arguments
    /// * `identity` - The vehicle the frame belongs to
    /// * `raw_hex` - The raw frame as received, hex encoded
    /// * `decoded` - The decoded frame as JSON
    /// * `response` - The upstream response or error as JSON
    /// * `success` - Whether the upstream accepted the report
    pub async fn record_attempt(&self, identity: &VehicleIdentity, raw_hex: String, decoded: Value, response: Value, success: bool) {
        if identity.transient {
            debug!(target: &identity.imei, "Skipping audit write for unregistered vehicle");
            return;
        }
        let Some(vehicle_id) = identity.id else {
            debug!(target: &identity.imei, "Skipping audit write for vehicle without database id");
            return;
        };

        let entry = AuditEntry {
            vehicle_id,
            raw_hex,
            decoded,
            response,
            success,
        };
        if let Err(err) = self.store.append_audit(entry).await {
            error!(target: &identity.imei, "Failed to write audit row: {}", err);
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// In-memory [`VehicleStore`] for tests.
    #[derive(Default)]
    pub struct InMemoryVehicleStore {
        pub vehicles: Mutex<Vec<VehicleIdentity>>,
        pub audits: Mutex<Vec<(i64, bool)>>,
    }

    impl InMemoryVehicleStore {
        pub fn with_vehicle(identity: VehicleIdentity) -> Self {
            let store = Self::default();
            store.vehicles.lock().unwrap().push(identity);
            store
        }
    }

    impl VehicleStore for InMemoryVehicleStore {
        fn find_vehicle_by_imei<'a>(
            &'a self,
            imei: &'a str,
        ) -> StoreFuture<'a, Result<Option<VehicleIdentity>, sqlx::Error>> {
            Box::pin(async move {
                let vehicles = self.vehicles.lock().unwrap();
                Ok(vehicles.iter().find(|vehicle| vehicle.imei == imei).cloned())
            })
        }

        fn append_audit(&self, entry: AuditEntry) -> StoreFuture<'_, Result<(), sqlx::Error>> {
            Box::pin(async move {
                self.audits.lock().unwrap().push((entry.vehicle_id, entry.success));
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::InMemoryVehicleStore;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_audit_sink_skips_transient_identity() {
        let store = Arc::new(InMemoryVehicleStore::default());
        let sink = AuditSink::new(store.clone());
        let identity = VehicleIdentity::transient("531360808494930");

        sink.record_attempt(&identity, String::from("00"), json!({}), json!({}), true)
            .await;

        assert!(store.audits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_sink_writes_registered_identity() {
        let store = Arc::new(InMemoryVehicleStore::default());
        let sink = AuditSink::new(store.clone());
        let identity = VehicleIdentity {
            id: Some(7),
            name: String::from("T123ABC"),
            registration: String::from("T123ABC"),
            imei: String::from("531360808494930"),
            transient: false,
        };

        sink.record_attempt(&identity, String::from("00"), json!({}), json!({"error": "timeout"}), false)
            .await;

        assert_eq!(*store.audits.lock().unwrap(), vec![(7, false)]);
    }
}
