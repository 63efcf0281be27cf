use log::debug;

use super::{activity_name, EventMapping, IoRule, EVENT_TO_ACTIVITY, IO_ACTIVITY_RULES};
use crate::teltonika::io_semantics::is_invalid_scan;
use crate::teltonika::AvlRecord;

/// Reserved system event range: unmapped event ids in this range report as
/// plain movement/logging.
const SYSTEM_EVENT_RANGE: std::ops::RangeInclusive<u16> = 1..=8;
/// Highest activity id the regulator accepts directly as an event id.
const MAX_DIRECT_ACTIVITY: u16 = 50;
/// Speed limit for the speeding activity, km/h.
const SPEED_LIMIT: u16 = 80;
/// At or above this speed a power disconnect is treated as tampering, km/h.
const TAMPERING_SPEED_THRESHOLD: u16 = 20;
/// Below this scaled voltage the external supply counts as lost.
const EXTERNAL_POWER_LOST_BELOW: f64 = 8.0;
/// Below this scaled voltage the backup battery counts as low.
const BACKUP_BATTERY_LOW_BELOW: f64 = 3.5;

/// Derives the LATRA activity id for a decoded record.
///
/// Rules are evaluated in strict priority order and the first match wins:
/// event id, movement indicator, ignition indicator, speed threshold, the
/// prioritized I/O table, GPS loss, and finally the guaranteed fallback.
/// Never returns 0: every record classifies (at worst as 15, black box data
/// logging).
pub fn classify(record: &AvlRecord) -> u16 {
    let activity = classify_inner(record);
    debug!(
        "Classified record (event {}, {} I/O elements, speed {}) as activity {} - {}",
        record.event_id,
        record.io_elements.len(),
        record.speed,
        activity,
        activity_name(activity)
    );

    return activity;
}

fn classify_inner(record: &AvlRecord) -> u16 {
    if record.event_id != 0 {
        return classify_event(record);
    }

    // Movement indicator: both transitions are plain movement/logging, the
    // state itself travels in the upstream addon block.
    if record.has_io(240) {
        return 1;
    }

    if let Some(ignition) = record.io_u64(239) {
        return match ignition {
            1 => 2,
            0 => 3,
            _ => 1,
        };
    }

    if record.speed > SPEED_LIMIT {
        return 4;
    }

    if let Some(activity) = scan_io_rules(record) {
        return activity;
    }

    // GPS loss needs evidence the device itself is alive, otherwise an
    // entirely empty record would never reach the black-box fallback.
    let device_alive = !record.io_elements.is_empty() || record.speed > 0;
    if record.satellites == 0 && record.latitude == 0.0 && record.longitude == 0.0 && device_alive {
        return 26;
    }

    let has_gps = record.latitude != 0.0 || record.longitude != 0.0;
    if has_gps || !record.io_elements.is_empty() || record.speed > 0 {
        return 1;
    }

    15
}

/// Rule 1: the event id path.
fn classify_event(record: &AvlRecord) -> u16 {
    let event_id = record.event_id;
    match EVENT_TO_ACTIVITY.get(&event_id) {
        Some(EventMapping::Fixed(activity)) => *activity,
        Some(EventMapping::Ignition) => match record.io_u64(239) {
            Some(0) => 3,
            _ => 2,
        },
        Some(EventMapping::Trip) => match record.io_u64(250) {
            Some(0) => 19,
            _ => 18,
        },
        Some(EventMapping::GreenDriving) => match record.io_u64(253) {
            Some(2) => 5,
            Some(3) => 6,
            _ => 7,
        },
        None if SYSTEM_EVENT_RANGE.contains(&event_id) => 1,
        None if event_id <= MAX_DIRECT_ACTIVITY => event_id,
        None => 1,
    }
}

/// Rule 5: first match in the prioritized I/O table wins.
fn scan_io_rules(record: &AvlRecord) -> Option<u16> {
    for (id, rule) in IO_ACTIVITY_RULES {
        let Some(value) = record.io(*id) else {
            continue;
        };
        let matched = match rule {
            IoRule::Map(activity) => Some(*activity),
            IoRule::ExternalPowerStatus => {
                if value.as_u64() == 1 {
                    Some(power_loss_activity(record))
                } else {
                    None
                }
            }
            IoRule::ExternalPowerVoltage => {
                if value.as_f64() < EXTERNAL_POWER_LOST_BELOW {
                    Some(power_loss_activity(record))
                } else {
                    None
                }
            }
            IoRule::BackupBatteryLow => {
                if value.as_f64() < BACKUP_BATTERY_LOW_BELOW {
                    Some(9)
                } else {
                    None
                }
            }
            IoRule::GreenDriving => match value.as_u64() {
                1 => Some(7),
                2 => Some(5),
                3 => Some(6),
                _ => None,
            },
            IoRule::TripState => match value.as_u64() {
                1 => Some(18),
                0 => Some(19),
                _ => None,
            },
            IoRule::DriverId => match value.as_identifier() {
                Some(identifier) if is_invalid_scan(identifier) => Some(17),
                Some(_) => Some(24),
                None => None,
            },
            IoRule::PanicInput => {
                if value.as_u64() == 1 {
                    Some(8)
                } else {
                    None
                }
            }
        };
        if matched.is_some() {
            return matched;
        }
    }

    None
}

/// A power disconnect while moving is tampering; stationary it is an
/// ordinary external power disconnect.
fn power_loss_activity(record: &AvlRecord) -> u16 {
    if record.speed >= TAMPERING_SPEED_THRESHOLD {
        14
    } else {
        10
    }
}
