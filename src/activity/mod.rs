pub mod classifier;

use std::collections::HashMap;

use lazy_static::lazy_static;

/// How a mapped Teltonika event id resolves to a LATRA activity.
///
/// Most entries are fixed. The state-change events carry their direction in
/// the matching I/O element, so mapping them flatly would report "Engine ON"
/// for an ignition-off record; those consult the element and fall back to the
/// declared default when it is absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventMapping {
    Fixed(u16),
    /// Event 239: ignition state 1 -> Engine ON (2), 0 -> Engine OFF (3).
    Ignition,
    /// Event 250: trip state 1 -> Engine Start (18), 0 -> Engine Stop (19).
    Trip,
    /// Event 253: green driving value 1 -> 7, 2 -> 5, 3 -> 6.
    GreenDriving,
}

lazy_static! {
    /// LATRA activity names, used for logging only.
    pub static ref ACTIVITY_NAMES: HashMap<u16, &'static str> = {
        let mut names = HashMap::new();
        names.insert(0, "No Event");
        names.insert(1, "Movement/Logging (Default)");
        names.insert(2, "Engine ON");
        names.insert(3, "Engine OFF");
        names.insert(4, "Speeding");
        names.insert(5, "Harsh Braking");
        names.insert(6, "Harsh Turning");
        names.insert(7, "Harsh Acceleration");
        names.insert(8, "Panic Button (Driver)");
        names.insert(9, "Internal Battery Low");
        names.insert(10, "External Power Disconnected");
        names.insert(11, "Excessive Idle");
        names.insert(12, "Accident");
        names.insert(13, "Panic Button (Passenger)");
        names.insert(14, "Device Tampering");
        names.insert(15, "Black Box Data Logging");
        names.insert(16, "Fuel Data Report");
        names.insert(17, "Invalid Scan");
        names.insert(18, "Engine Start");
        names.insert(19, "Engine Stop");
        names.insert(20, "Enter Boundary");
        names.insert(21, "Leave Boundary");
        names.insert(22, "Enter Checkpoint");
        names.insert(23, "Leave Checkpoint");
        names.insert(24, "iButton Scan (Regular)");
        names.insert(25, "GPS Antenna Disconnected");
        names.insert(26, "GPS Signal Lost");
        names.insert(27, "GPS Signal Restored");
        names.insert(28, "Main Power Disconnected");
        names.insert(29, "Main Power Connected");
        names.insert(30, "Emergency Button");
        names.insert(31, "Driver Identification");
        names.insert(32, "Unauthorized Driver");
        names.insert(33, "Vehicle Theft");
        names.insert(34, "Maintenance Alert");
        names.insert(35, "Service Reminder");
        names.insert(36, "Low Fuel Alert");
        names.insert(37, "High Temperature Alert");
        names.insert(38, "Low Temperature Alert");
        names.insert(39, "Door Open");
        names.insert(40, "Door Close");
        names.insert(41, "Hood Open");
        names.insert(42, "Hood Close");
        names.insert(43, "Trunk Open");
        names.insert(44, "Trunk Close");
        names.insert(45, "Seatbelt Unfastened");
        names.insert(46, "Seatbelt Fastened");
        names.insert(47, "Airbag Deployed");
        names.insert(48, "Collision Detected");
        names.insert(49, "Rollover Detected");
        names.insert(50, "Emergency Call");
        names
    };

    /// Teltonika event id to LATRA activity. First declaration wins: the
    /// reserved low event ids are handled by the classifier's rule chain and
    /// deliberately have no entries here.
    pub static ref EVENT_TO_ACTIVITY: HashMap<u16, EventMapping> = {
        use EventMapping::*;

        let mut map = HashMap::new();
        // Geofence zones
        for zone in [155, 156, 157, 158, 159, 61, 62, 63, 64, 65, 70, 88, 91, 92, 93, 94, 95, 96, 97, 98, 99] {
            map.insert(zone, Fixed(20));
        }
        map.insert(175, Fixed(20)); // Auto geofence

        // Eventual I/O state changes
        map.insert(250, Trip);
        map.insert(251, Fixed(11)); // Idling
        map.insert(252, Fixed(9)); // Battery unplug
        map.insert(253, GreenDriving);
        map.insert(254, Fixed(7)); // Green driving value
        map.insert(255, Fixed(4)); // Over speeding
        map.insert(246, Fixed(33)); // Towing detection
        map.insert(247, Fixed(12)); // Crash detection
        map.insert(248, Fixed(24)); // Immobilizer
        map.insert(249, Fixed(26)); // Jamming

        // Permanent I/O state changes
        map.insert(239, Ignition);
        map.insert(240, Fixed(1)); // Movement

        map.insert(236, Fixed(8)); // Alarm
        map.insert(257, Fixed(12)); // Crash trace data
        map.insert(285, Fixed(31)); // Blood alcohol content
        map.insert(318, Fixed(26)); // GNSS jamming
        map.insert(391, Fixed(14)); // Private mode
        map.insert(449, Fixed(2)); // Ignition on counter

        // Driver card events
        for id in 403..=409 {
            map.insert(id, Fixed(31));
        }

        // OBD events
        map.insert(256, Fixed(16)); // VIN
        map.insert(30, Fixed(34)); // Number of DTCs
        map.insert(281, Fixed(34)); // Fault codes

        // CAN adapter events
        map.insert(90, Fixed(39)); // Door status
        map.insert(235, Fixed(34)); // Oil level
        map.insert(160, Fixed(34)); // DTC faults

        // BLE sensor events
        map.insert(385, Fixed(22)); // Beacon
        map.insert(548, Fixed(22)); // Advanced BLE beacon

        map
    };
}

/// A rule in the prioritized I/O inspection table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoRule {
    /// Presence of the id maps straight to an activity.
    Map(u16),
    /// I/O 252: status 1 means external power lost; speed decides 14 vs 10.
    ExternalPowerStatus,
    /// I/O 66: scaled voltage below the disconnect threshold; speed decides 14 vs 10.
    ExternalPowerVoltage,
    /// I/O 67: backup battery below 3.5 V.
    BackupBatteryLow,
    /// I/O 253: 1 -> harsh acceleration, 2 -> harsh braking, 3 -> harsh turning.
    GreenDriving,
    /// I/O 250: 1 -> Engine Start, 0 -> Engine Stop.
    TripState,
    /// I/O 78 / 245: invalid-scan sentinel -> 17, anything else -> 24.
    DriverId,
    /// I/O 2 == 1: driver panic button.
    PanicInput,
}

/// The prioritized I/O inspection order: critical safety first, then driver
/// identification, power and trip, temperature, geofence, digital I/O,
/// BLE/environmental, OBD and CAN. First match wins.
pub static IO_ACTIVITY_RULES: &[(u16, IoRule)] = &[
    // Critical safety
    (252, IoRule::ExternalPowerStatus),
    (246, IoRule::Map(33)),
    (247, IoRule::Map(12)),
    (253, IoRule::GreenDriving),
    (254, IoRule::Map(7)),
    (255, IoRule::Map(4)),
    (236, IoRule::Map(8)),
    (249, IoRule::Map(26)),
    (318, IoRule::Map(26)),
    (67, IoRule::BackupBatteryLow),
    // Driver identification
    (78, IoRule::DriverId),
    (245, IoRule::DriverId),
    (248, IoRule::Map(24)),
    (285, IoRule::Map(31)),
    (403, IoRule::Map(31)),
    (404, IoRule::Map(31)),
    (405, IoRule::Map(31)),
    (406, IoRule::Map(31)),
    (407, IoRule::Map(31)),
    (408, IoRule::Map(31)),
    (409, IoRule::Map(31)),
    // Power and trip
    (66, IoRule::ExternalPowerVoltage),
    (250, IoRule::TripState),
    (251, IoRule::Map(11)),
    (449, IoRule::Map(2)),
    // Temperature
    (72, IoRule::Map(37)),
    (73, IoRule::Map(37)),
    (74, IoRule::Map(37)),
    (75, IoRule::Map(37)),
    // Geofence
    (155, IoRule::Map(20)),
    (156, IoRule::Map(20)),
    (157, IoRule::Map(20)),
    (158, IoRule::Map(20)),
    (159, IoRule::Map(20)),
    (61, IoRule::Map(20)),
    (62, IoRule::Map(20)),
    (63, IoRule::Map(20)),
    (64, IoRule::Map(20)),
    (65, IoRule::Map(20)),
    (70, IoRule::Map(20)),
    (88, IoRule::Map(20)),
    (91, IoRule::Map(20)),
    (92, IoRule::Map(20)),
    (93, IoRule::Map(20)),
    (94, IoRule::Map(20)),
    (95, IoRule::Map(20)),
    (96, IoRule::Map(20)),
    (97, IoRule::Map(20)),
    (98, IoRule::Map(20)),
    (99, IoRule::Map(20)),
    (175, IoRule::Map(20)),
    // Digital I/O
    (2, IoRule::PanicInput),
    (90, IoRule::Map(39)),
    // BLE / environmental sensors
    (385, IoRule::Map(22)),
    (548, IoRule::Map(22)),
    // OBD
    (256, IoRule::Map(16)),
    (30, IoRule::Map(34)),
    (281, IoRule::Map(34)),
    // CAN adapter
    (235, IoRule::Map(34)),
    (160, IoRule::Map(34)),
];

/// Activities that legitimately report without a GPS fix; used for logging
/// the coordinate substitution decision.
pub static NON_GPS_ACTIVITIES: &[u16] = &[2, 3, 8, 9, 10, 13, 14, 15, 16, 17, 18, 19, 24, 25, 26, 28, 29, 34, 35];

/// Human-readable activity name for log lines.
pub fn activity_name(id: u16) -> &'static str {
    ACTIVITY_NAMES.get(&id).copied().unwrap_or("Unknown Activity")
}

/// Fuel sensor hardware fault descriptions for activity 16 reports.
pub fn hardware_fault_description(code: u64) -> &'static str {
    match code {
        0 => "Normal",
        1 => "Sensor Communication Error",
        2 => "Sensor Data Error",
        3 => "Sensor Hardware Fault",
        4 => "Sensor Configuration Error",
        _ => "Unknown Fault",
    }
}
