use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Timelike, Utc};
use log::debug;
use rand::{thread_rng, Rng};

use super::{LatraBatch, LatraItem};
use crate::activity::{activity_name, hardware_fault_description, NON_GPS_ACTIVITIES};
use crate::teltonika::io_semantics::is_invalid_scan;
use crate::teltonika::{format_scaled, AvlRecord};
use crate::vehicles::VehicleIdentity;

/// Device timestamps further in the future than this are replaced with "now".
const MAX_FUTURE_MILLIS: i64 = 24 * 60 * 60 * 1000;
/// MGS_ID counter range; the counter wraps back to the low end.
const MGS_COUNTER_LOW: u64 = 10_000;
const MGS_COUNTER_SPAN: u64 = 90_000;
/// Trip speed statistics outside (0, 300] km/h are dropped as sensor noise.
const MAX_PLAUSIBLE_SPEED: f64 = 300.0;

/// Mobile country codes accepted as an MCC override from I/O 14.
const EAST_AFRICA_MCC_PREFIXES: &[&str] = &["640", "639", "641", "642", "635", "636", "637", "638", "659"];
/// Tanzania, the regulator's home network.
const DEFAULT_MCC: &str = "640";

/// Assembles upstream report items from classified records.
///
/// The builder owns the process-wide MGS_ID counter and the configured
/// coordinate fallback; everything else it needs is on the record.
pub struct PayloadBuilder {
    fallback_latitude: f64,
    fallback_longitude: f64,
    mgs_counter: AtomicU64,
}

impl PayloadBuilder {
    pub fn new(fallback_latitude: f64, fallback_longitude: f64) -> Self {
        PayloadBuilder {
            fallback_latitude,
            fallback_longitude,
            mgs_counter: AtomicU64::new(0),
        }
    }

    /// Builds the POST body for one decoded frame.
    ///
    /// # Arguments
    /// * `identity` - The vehicle the frame belongs to
    /// * `classified` - The frame's records, each paired with its activity id
    pub fn build_batch(&self, identity: &VehicleIdentity, classified: &[(AvlRecord, u16)]) -> LatraBatch {
        LatraBatch {
            vehicle_reg_no: identity.registration.clone(),
            report_type: String::from("poi"),
            imei: identity.imei.clone(),
            items: classified
                .iter()
                .map(|(record, activity)| self.build_item(record, *activity))
                .collect(),
        }
    }

    /// Builds one upstream item.
    ///
    /// Coordinates and timestamp are substituted rather than ever dropping
    /// the record: an invalid fix becomes the configured fallback point, a
    /// non-positive or far-future timestamp becomes "now".
    pub fn build_item(&self, record: &AvlRecord, activity: u16) -> LatraItem {
        let (latitude, longitude) = self.resolve_coordinates(record, activity);
        let timestamp = resolve_timestamp(record);

        LatraItem {
            latitude: format!("{:.6}", latitude),
            longitude: format!("{:.6}", longitude),
            altitude: i64::from(record.altitude).to_string(),
            timestamp: timestamp.to_string(),
            horizontal_speed: record.speed.to_string(),
            vertical_speed: String::from("0"),
            bearing: record.bearing.to_string(),
            satellite_count: record.satellites.to_string(),
            hdop: record.io_display(182).unwrap_or_else(|| String::from("0")),
            d2d3: gps_mode(record),
            rssi: record.io_u64(21).map(|raw| (raw * 6).to_string()).unwrap_or_else(|| String::from("0")),
            lac: location_area_code(record),
            cell_id: record.io_u64(205).map(|cell| cell.to_string()).unwrap_or_else(|| String::from("0")),
            mgs_id: self.next_mgs_id(),
            mcc: mobile_country_code(record),
            activity_id: activity.to_string(),
            addon_info: addon_info(record, activity),
            fuel_info: fuel_info(record, activity),
        }
    }

    /// Applies the coordinate policy (invariant: every emitted pair is inside
    /// [-90, 90] x [-180, 180]).
    fn resolve_coordinates(&self, record: &AvlRecord, activity: u16) -> (f64, f64) {
        let latitude = record.latitude;
        let longitude = record.longitude;
        let in_range = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        if in_range && (latitude != 0.0 || longitude != 0.0) {
            return (latitude, longitude);
        }

        if NON_GPS_ACTIVITIES.contains(&activity) {
            debug!(
                "No GPS fix for activity {} - {}; using fallback point",
                activity,
                activity_name(activity)
            );
        } else {
            debug!(
                "Invalid fix ({}, {}) for GPS activity {}; using fallback point",
                latitude, longitude, activity
            );
        }

        (self.fallback_latitude, self.fallback_longitude)
    }

    /// Produces the next per-message id: wrapping counter, seconds tail,
    /// random tail, truncated to eight characters. The counter alone makes
    /// ids distinct within any one-second window.
    fn next_mgs_id(&self) -> String {
        let n = self.mgs_counter.fetch_add(1, Ordering::Relaxed);
        let counter = MGS_COUNTER_LOW + n % MGS_COUNTER_SPAN;
        let second = Utc::now().second();
        let random_tail = thread_rng().gen_range(0..100u32);

        let mut id = format!("{}{:02}{:02}", counter, second, random_tail);
        id.truncate(8);
        id
    }
}

/// Device timestamp in epoch milliseconds, or "now" when non-positive or more
/// than 24 hours ahead.
fn resolve_timestamp(record: &AvlRecord) -> i64 {
    let millis = record.timestamp.timestamp_millis();
    let now = Utc::now().timestamp_millis();
    if millis <= 0 || millis > now + MAX_FUTURE_MILLIS {
        debug!("Substituting server time for device timestamp {}", millis);
        return now;
    }

    millis
}

/// GPS mode: I/O 181 when present (raw 2 means a 2D fix), otherwise inferred
/// from the satellite count.
fn gps_mode(record: &AvlRecord) -> String {
    if let Some(fix_type) = record.io_u64(181) {
        return if fix_type == 2 { String::from("2") } else { String::from("3") };
    }
    if record.satellites >= 4 {
        String::from("3")
    } else if record.satellites > 0 {
        String::from("2")
    } else {
        String::from("0")
    }
}

/// LAC from I/O 206, accepted only in the valid GSM range.
fn location_area_code(record: &AvlRecord) -> String {
    match record.io_u64(206) {
        Some(lac) if (1..=65_534).contains(&lac) => lac.to_string(),
        _ => String::from("0"),
    }
}

/// MCC defaults to Tanzania and may be overridden from I/O 14 only by a
/// recognized East-Africa prefix.
fn mobile_country_code(record: &AvlRecord) -> String {
    if let Some(operator) = record.io_u64(14) {
        let operator = operator.to_string();
        for prefix in EAST_AFRICA_MCC_PREFIXES {
            if operator.starts_with(prefix) {
                return prefix.to_string();
            }
        }
    }

    String::from(DEFAULT_MCC)
}

/// The first driver identifier present on the record (I/O 245, then 78),
/// already normalized to 16 uppercase hex characters.
fn driver_identifier(record: &AvlRecord) -> Option<String> {
    for id in [245, 78] {
        if let Some(identifier) = record.io(id).and_then(|value| value.as_identifier()) {
            return Some(identifier.to_string());
        }
    }

    None
}

/// Driver identifier with the invalid-scan sentinels blanked out.
fn driver_identifier_or_empty(record: &AvlRecord) -> String {
    match driver_identifier(record) {
        Some(identifier) if !is_invalid_scan(&identifier) => identifier,
        _ => String::new(),
    }
}

fn insert_io(addon: &mut BTreeMap<String, String>, key: &str, record: &AvlRecord, id: u16) {
    if let Some(value) = record.io_display(id) {
        addon.insert(key.to_string(), value);
    }
}

/// Activity-keyed addon block, or `None` when the activity carries none.
fn addon_info(record: &AvlRecord, activity: u16) -> Option<BTreeMap<String, String>> {
    let mut addon = BTreeMap::new();

    match activity {
        2 => {
            insert_io(&mut addon, "idleTime", record, 11);
            if let Some(identifier) = driver_identifier(record) {
                addon.insert(String::from("v_driver_identification_no"), identifier);
            }
        }
        3 | 19 => {
            // Journey stop report: trip statistics plus a snapshot of the
            // vehicle's state at shutdown
            if let Some(meters) = record.io_u64(199) {
                addon.insert(String::from("distance_travelled"), format_scaled(meters, 3));
            }
            insert_io(&mut addon, "total_odometer", record, 16);
            if let Some(seconds) = record.io_u64(80) {
                addon.insert(String::from("trip_duration"), (seconds / 60).max(1).to_string());
            }
            if let Some(average) = record.io(241) {
                if average.as_f64() > 0.0 && average.as_f64() <= MAX_PLAUSIBLE_SPEED {
                    addon.insert(String::from("avgSpeed"), average.display());
                }
            }
            if let Some(maximum) = record.io(242) {
                if maximum.as_f64() > 0.0 && maximum.as_f64() <= MAX_PLAUSIBLE_SPEED {
                    addon.insert(String::from("maxSpeed"), maximum.display());
                }
            }
            insert_io(&mut addon, "battery_voltage", record, 67);
            insert_io(&mut addon, "ext_power_voltage", record, 66);
            insert_io(&mut addon, "journey_status", record, 239);
            insert_io(&mut addon, "movement_status", record, 240);
            insert_io(&mut addon, "gsm_signal", record, 21);
            if driver_identifier(record).is_some() {
                addon.insert(
                    String::from("v_driver_identification_no"),
                    driver_identifier_or_empty(record),
                );
            }
            insert_io(&mut addon, "digital_input_1", record, 1);
            insert_io(&mut addon, "digital_input_2", record, 2);
            insert_io(&mut addon, "digital_input_3", record, 3);
            insert_io(&mut addon, "ambient_temperature", record, 72);
        }
        9 | 10 | 14 => {
            insert_io(&mut addon, "ext_power_voltage", record, 66);
            insert_io(&mut addon, "int_battery_voltage", record, 67);
        }
        17 | 24 => {
            addon.insert(
                String::from("v_driver_identification_no"),
                driver_identifier_or_empty(record),
            );
        }
        5 | 6 | 7 => {
            let event_type = match activity {
                5 => "harsh_braking",
                6 => "harsh_turning",
                _ => "harsh_acceleration",
            };
            addon.insert(String::from("driving_event_type"), event_type.to_string());
            insert_io(&mut addon, "accelerometer_x", record, 17);
            insert_io(&mut addon, "accelerometer_y", record, 18);
            insert_io(&mut addon, "accelerometer_z", record, 19);
            insert_io(&mut addon, "gsm_signal", record, 21);
        }
        8 => {
            addon.insert(String::from("panic_source"), String::from("driver"));
            insert_io(&mut addon, "panic_state", record, 2);
            insert_io(&mut addon, "gsm_signal", record, 21);
            insert_io(&mut addon, "battery_voltage", record, 67);
        }
        _ => {}
    }

    if addon.is_empty() {
        None
    } else {
        Some(addon)
    }
}

/// The fuel sensor block attached to activity 16 reports.
fn fuel_info(record: &AvlRecord, activity: u16) -> Option<BTreeMap<String, String>> {
    if activity != 16 {
        return None;
    }

    let mut fuel = BTreeMap::new();
    insert_io(&mut fuel, "validFlag", record, 250);
    insert_io(&mut fuel, "signalLevel", record, 251);
    insert_io(&mut fuel, "softStatus", record, 252);
    if let Some(fault) = record.io_u64(253) {
        fuel.insert(String::from("hardFault"), hardware_fault_description(fault).to_string());
    }
    insert_io(&mut fuel, "fuelLevel", record, 16);
    insert_io(&mut fuel, "rtFuelLevel", record, 254);
    if let Some(temperature) = record.io_u64(255) {
        fuel.insert(String::from("tankTemp"), format_scaled(temperature, 1));
    }
    fuel.insert(
        String::from("channel"),
        record.io_display(256).unwrap_or_else(|| String::from("1")),
    );

    Some(fuel)
}
