pub mod client;
pub mod payload;

use std::collections::BTreeMap;

use serde::Serialize;

/// One upstream report item. Every value is a JSON string, numeric ones
/// included; that is the wire contract of the regulator endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct LatraItem {
    pub latitude: String,
    pub longitude: String,
    pub altitude: String,
    pub timestamp: String,
    pub horizontal_speed: String,
    pub vertical_speed: String,
    pub bearing: String,
    pub satellite_count: String,
    #[serde(rename = "HDOP")]
    pub hdop: String,
    pub d2d3: String,
    #[serde(rename = "RSSI")]
    pub rssi: String,
    #[serde(rename = "LAC")]
    pub lac: String,
    #[serde(rename = "Cell_ID")]
    pub cell_id: String,
    #[serde(rename = "MGS_ID")]
    pub mgs_id: String,
    #[serde(rename = "MCC")]
    pub mcc: String,
    pub activity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addon_info: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_info: Option<BTreeMap<String, String>>,
}

/// The POST body sent to the regulator.
#[derive(Clone, Debug, Serialize)]
pub struct LatraBatch {
    pub vehicle_reg_no: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub imei: String,
    pub items: Vec<LatraItem>,
}
