#![allow(dead_code)]
//! Utilities for building AVL record bytes for testing various parsing
//! scenarios. See https://wiki.teltonika-gps.com/view/Codec#Codec_8 for the
//! byte order reference.

use chrono::{DateTime, Utc};

use crate::teltonika::{Codec, IoValue};
use crate::utils::str_to_bytes;

/// A record under construction, encodable for either codec.
pub struct TestAvlRecord {
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: i16,
    pub bearing: u16,
    pub satellites: u8,
    pub speed: u16,
    pub event_id: u16,
    pub io_elements: Vec<(u16, IoValue)>,
    pub variable_elements: Vec<(u16, Vec<u8>)>,
}

/// Builder for AVL record bytes.
pub struct AvlRecordBuilder {
    record: TestAvlRecord,
}

impl AvlRecordBuilder {
    pub fn new() -> AvlRecordBuilder {
        AvlRecordBuilder {
            record: TestAvlRecord {
                timestamp: Utc::now(),
                priority: 0,
                longitude: 0.0,
                latitude: 0.0,
                altitude: 0,
                bearing: 0,
                satellites: 0,
                speed: 0,
                event_id: 0,
                io_elements: vec![],
                variable_elements: vec![],
            },
        }
    }

    pub fn build(self) -> TestAvlRecord {
        self.record
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> AvlRecordBuilder {
        self.record.timestamp = timestamp;
        return self;
    }

    pub fn with_priority(mut self, priority: u8) -> AvlRecordBuilder {
        self.record.priority = priority;
        return self;
    }

    pub fn with_longitude(mut self, longitude: f64) -> AvlRecordBuilder {
        self.record.longitude = longitude;
        return self;
    }

    pub fn with_latitude(mut self, latitude: f64) -> AvlRecordBuilder {
        self.record.latitude = latitude;
        return self;
    }

    pub fn with_bearing(mut self, bearing: u16) -> AvlRecordBuilder {
        self.record.bearing = bearing;
        return self;
    }

    pub fn with_satellites(mut self, satellites: u8) -> AvlRecordBuilder {
        self.record.satellites = satellites;
        return self;
    }

    pub fn with_speed(mut self, speed: u16) -> AvlRecordBuilder {
        self.record.speed = speed;
        return self;
    }

    pub fn with_event_id(mut self, event_id: u16) -> AvlRecordBuilder {
        self.record.event_id = event_id;
        return self;
    }

    pub fn add_io_element(mut self, id: u16, value: IoValue) -> AvlRecordBuilder {
        self.record.io_elements.push((id, value));
        return self;
    }

    pub fn with_io_elements(mut self, io_elements: Vec<(u16, IoValue)>) -> AvlRecordBuilder {
        self.record.io_elements = io_elements;
        return self;
    }

    /// Adds an element for the Codec 8E variable-width group.
    pub fn add_variable_element(mut self, id: u16, value: Vec<u8>) -> AvlRecordBuilder {
        self.record.variable_elements.push((id, value));
        return self;
    }
}

impl TestAvlRecord {
    /// Encodes the record for the given codec.
    pub fn to_bytes(&self, codec: Codec) -> Vec<u8> {
        let mut bytes = Vec::new();

        let millis = self.timestamp.timestamp_millis() as u64;
        bytes.extend_from_slice(&millis.to_be_bytes());
        bytes.push(self.priority);
        bytes.extend_from_slice(&(((self.longitude * 10_000_000.0).round() as i32).to_be_bytes()));
        bytes.extend_from_slice(&(((self.latitude * 10_000_000.0).round() as i32).to_be_bytes()));
        bytes.extend_from_slice(&self.altitude.to_be_bytes());
        bytes.extend_from_slice(&self.bearing.to_be_bytes());
        bytes.push(self.satellites);
        bytes.extend_from_slice(&self.speed.to_be_bytes());
        push_step(&mut bytes, codec, self.event_id);

        let mut grouped: [Vec<(u16, Vec<u8>)>; 4] = [vec![], vec![], vec![], vec![]];
        for (id, value) in &self.io_elements {
            let encoded = value_bytes(value);
            let group = match encoded.len() {
                1 => 0,
                2 => 1,
                4 => 2,
                _ => 3,
            };
            grouped[group].push((*id, encoded));
        }

        let variable_count = if codec == Codec::Codec8Ext {
            self.variable_elements.len()
        } else {
            0
        };
        let total = grouped.iter().map(Vec::len).sum::<usize>() + variable_count;
        push_step(&mut bytes, codec, total as u16);

        for group in &grouped {
            push_step(&mut bytes, codec, group.len() as u16);
            for (id, encoded) in group {
                push_step(&mut bytes, codec, *id);
                bytes.extend_from_slice(encoded);
            }
        }

        if codec == Codec::Codec8Ext {
            bytes.extend_from_slice(&(self.variable_elements.len() as u16).to_be_bytes());
            for (id, value) in &self.variable_elements {
                bytes.extend_from_slice(&id.to_be_bytes());
                bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
                bytes.extend_from_slice(value);
            }
        }

        return bytes;
    }
}

/// Writes a value in the codec's id/count width.
fn push_step(bytes: &mut Vec<u8>, codec: Codec, value: u16) {
    match codec {
        Codec::Codec8 => bytes.push(value as u8),
        Codec::Codec8Ext => bytes.extend_from_slice(&value.to_be_bytes()),
    }
}

/// Encodes a value in the narrowest fixed group that holds it.
fn value_bytes(value: &IoValue) -> Vec<u8> {
    match value {
        IoValue::Unsigned(raw) | IoValue::Scaled { raw, .. } => {
            if *raw <= u64::from(u8::MAX) {
                vec![*raw as u8]
            } else if *raw <= u64::from(u16::MAX) {
                (*raw as u16).to_be_bytes().to_vec()
            } else if *raw <= u64::from(u32::MAX) {
                (*raw as u32).to_be_bytes().to_vec()
            } else {
                raw.to_be_bytes().to_vec()
            }
        }
        IoValue::Signed(raw) => raw.to_be_bytes().to_vec(),
        IoValue::Identifier(hex) => str_to_bytes(hex),
    }
}
