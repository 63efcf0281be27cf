use std::sync::Arc;

use log::{debug, error};
use rand::{thread_rng, Rng};
use serde_json::json;
use tokio::sync::Semaphore;

use crate::activity::classifier::classify;
use crate::listener::Listener;
use crate::teltonika::{AvlFrame, AvlRecord};
use crate::utils::bytes_to_hex;

/// Bounded pool for the post-decode pipeline.
///
/// Each successfully decoded frame dispatches exactly one task that runs
/// classification, identity resolution, payload assembly, upstream
/// transmission and the audit write. The semaphore caps how many of those run
/// at once; the connection task itself never waits on upstream I/O.
pub struct IngestionPool {
    slots: Arc<Semaphore>,
}

impl IngestionPool {
    pub fn new(slots: usize) -> Self {
        IngestionPool {
            slots: Arc::new(Semaphore::new(slots)),
        }
    }

    /// Queues one decoded frame for processing.
    ///
    /// # Arguments
    /// * `listener` - The owning listener, providing every collaborator
    /// * `imei` - IMEI of the sending device
    /// * `raw` - The frame exactly as received, for the audit trail
    /// * `frame` - The decoded frame
    pub fn dispatch(&self, listener: Arc<Listener>, imei: String, raw: Vec<u8>, frame: AvlFrame) {
        let slots = self.slots.clone();
        tokio::spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                // Only happens when the semaphore is closed during shutdown
                return;
            };
            process_frame(listener, imei, raw, frame).await;
        });
    }
}

/// Runs the post-decode pipeline for one frame: classify every record,
/// resolve the vehicle identity, build and send the upstream batch, record
/// the attempt. Errors never escape; they end as log lines and audit rows.
pub async fn process_frame(listener: Arc<Listener>, imei: String, raw: Vec<u8>, frame: AvlFrame) {
    let worker_id: u32 = thread_rng().gen_range(0..u32::MAX);
    let log_target = format!("{}-{}", imei, worker_id);
    debug!(target: &log_target, "Worker processing frame with {} records", frame.records.len());

    let identity = listener.directory().resolve(&imei).await;

    let classified: Vec<(AvlRecord, u16)> = frame
        .records
        .iter()
        .map(|record| (record.clone(), classify(record)))
        .collect();

    let raw_hex = bytes_to_hex(&raw);
    let decoded = serde_json::to_value(&frame).unwrap_or_else(|_| json!({}));

    if classified.is_empty() {
        error!(target: &log_target, "Frame decoded to no records; nothing to transmit");
        let response = json!({ "error": "no records decoded", "parse_errors": frame.parse_errors });
        listener
            .audit()
            .record_attempt(&identity, raw_hex, decoded, response, false)
            .await;
        return;
    }

    let batch = listener.payload_builder().build_batch(&identity, &classified);
    let outcome = listener.transmitter().send_batch(&batch).await;
    if !outcome.success {
        error!(target: &log_target, "Upstream transmission failed: {}", outcome.response);
    }

    listener
        .audit()
        .record_attempt(&identity, raw_hex, decoded, outcome.response, outcome.success)
        .await;

    debug!(target: &log_target, "Worker finished processing frame");
}
