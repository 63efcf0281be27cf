mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use httpmock::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use latra_telematics_gateway::config::GatewayConfig;
use latra_telematics_gateway::listener::Listener;
use latra_telematics_gateway::teltonika::connection::GatewayConnection;
use latra_telematics_gateway::teltonika::{Codec, IoValue};
use latra_telematics_gateway::utils::avl_frame_builder::AvlFrameBuilder;
use latra_telematics_gateway::utils::avl_record_builder::AvlRecordBuilder;
use latra_telematics_gateway::utils::imei::{build_valid_imei_packet, get_random_imei};

use test_utils::recording_store::RecordingStore;

fn setup_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .target(env_logger::Target::Stdout)
        .try_init();
}

fn gateway(server: &MockServer, store: Arc<RecordingStore>) -> Arc<Listener> {
    let config = GatewayConfig {
        latra_api_url: server.url("/report"),
        latra_api_token: String::from("dGVzdDp0ZXN0"),
        listen_host: String::from("127.0.0.1"),
        listen_port: 0,
        worker_pool_size: 10,
        vehicle_cache_ttl_seconds: 300,
        fallback_latitude: -1.286389,
        fallback_longitude: 36.817223,
        avl_log_dir: None,
    };

    Arc::new(Listener::new(config, store))
}

/// Drives one device session: handshake, one data frame, both
/// acknowledgements. Returns the acknowledged record count.
async fn run_session(listener: Arc<Listener>, imei: &str, frame: Vec<u8>) -> Result<u32> {
    let (mut device, server_side) = tokio::io::duplex(8192);
    tokio::spawn(async move { GatewayConnection::handle_connection(server_side, listener).await });

    device.write_all(&build_valid_imei_packet(imei)).await?;
    let mut imei_ack = [0u8; 1];
    device.read_exact(&mut imei_ack).await?;
    assert_eq!(imei_ack, [0x01]);

    device.write_all(&frame).await?;
    let mut count = [0u8; 4];
    device.read_exact(&mut count).await?;

    Ok(u32::from_be_bytes(count))
}

/// Waits for the background pipeline to reach the upstream mock.
async fn wait_for_hits(mock: &httpmock::Mock<'_>, expected: usize) {
    for _ in 0..200 {
        if mock.hits_async().await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("upstream mock was not called {} times", expected);
}

#[tokio::test]
async fn test_movement_record_reaches_regulator() -> Result<()> {
    setup_logging();
    let server = MockServer::start_async().await;
    let imei = get_random_imei();
    // The matcher pins down the payload shape: registered vehicle, poi type,
    // activity 1, device coordinates as strings
    let expected = format!(
        r#"{{ "vehicle_reg_no": "T123ABC", "type": "poi", "imei": "{}", "items": [ {{ "activity_id": "1", "latitude": "-6.792400", "longitude": "39.208300", "vertical_speed": "0" }} ] }}"#,
        imei
    );
    let mock = server
        .mock_async(move |when, then| {
            when.method(POST)
                .path("/report")
                .header("authorization", "Basic dGVzdDp0ZXN0")
                .json_body_partial(expected);
            then.status(200).json_body(serde_json::json!({ "status": "accepted" }));
        })
        .await;

    let store = Arc::new(RecordingStore::with_registered_vehicle(7, "T123ABC", &imei));
    let listener = gateway(&server, store.clone());

    let record = AvlRecordBuilder::new()
        .with_latitude(-6.7924)
        .with_longitude(39.2083)
        .with_satellites(11)
        .with_io_elements(vec![(240, IoValue::Unsigned(1))])
        .build();
    let frame = AvlFrameBuilder::new(Codec::Codec8).add_record(record).to_bytes();

    let acked = run_session(listener, &imei, frame).await?;
    assert_eq!(acked, 1);

    wait_for_hits(&mock, 1).await;

    let audit = store.wait_for_audit().await;
    assert_eq!(audit.vehicle_id, 7);
    assert!(audit.success);
    assert_eq!(audit.response["status"], "accepted");
    // The audit keeps the decoded frame alongside the raw hex
    assert_eq!(audit.decoded["records"][0]["satellites"], 11);

    Ok(())
}

#[tokio::test]
async fn test_engine_off_report_carries_journey_addon() -> Result<()> {
    setup_logging();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/report").json_body_partial(
                r#"{ "items": [ { "activity_id": "3", "addon_info": { "journey_status": "0", "gsm_signal": "5" } } ] }"#,
            );
            then.status(200).json_body(serde_json::json!({}));
        })
        .await;

    let imei = get_random_imei();
    let store = Arc::new(RecordingStore::with_registered_vehicle(3, "T456DEF", &imei));
    let listener = gateway(&server, store.clone());

    let record = AvlRecordBuilder::new()
        .with_latitude(-3.38002)
        .with_longitude(36.683671)
        .with_io_elements(vec![(239, IoValue::Unsigned(0)), (21, IoValue::Unsigned(5))])
        .build();
    let frame = AvlFrameBuilder::new(Codec::Codec8).add_record(record).to_bytes();

    run_session(listener, &imei, frame).await?;
    wait_for_hits(&mock, 1).await;

    let audit = store.wait_for_audit().await;
    assert!(audit.success);

    Ok(())
}

#[tokio::test]
async fn test_unknown_imei_still_reports_but_skips_audit() -> Result<()> {
    setup_logging();
    let server = MockServer::start_async().await;
    let imei = get_random_imei();
    // The transient registration is the last six digits of the IMEI
    let expected = format!(
        r#"{{ "vehicle_reg_no": "{}", "imei": "{}", "items": [ {{ "activity_id": "2" }} ] }}"#,
        &imei[imei.len() - 6..],
        imei
    );
    let mock = server
        .mock_async(move |when, then| {
            when.method(POST).path("/report").json_body_partial(expected);
            then.status(200).json_body(serde_json::json!({}));
        })
        .await;

    let store = Arc::new(RecordingStore::default());
    let listener = gateway(&server, store.clone());

    let record = AvlRecordBuilder::new()
        .with_latitude(-6.7924)
        .with_longitude(39.2083)
        .with_io_elements(vec![(239, IoValue::Unsigned(1))])
        .build();
    let frame = AvlFrameBuilder::new(Codec::Codec8).add_record(record).to_bytes();

    run_session(listener, &imei, frame).await?;
    wait_for_hits(&mock, 1).await;

    // Unregistered vehicles never produce audit rows
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.audits().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_failed_upstream_is_audited_after_bounded_retries() -> Result<()> {
    setup_logging();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/report");
            then.status(502).json_body(serde_json::json!({ "message": "gateway down" }));
        })
        .await;

    let imei = get_random_imei();
    let store = Arc::new(RecordingStore::with_registered_vehicle(9, "T789GHI", &imei));
    let listener = gateway(&server, store.clone());

    let record = AvlRecordBuilder::new()
        .with_io_elements(vec![(240, IoValue::Unsigned(1))])
        .build();
    let frame = AvlFrameBuilder::new(Codec::Codec8).add_record(record).to_bytes();

    let acked = run_session(listener, &imei, frame).await?;
    // The device is acknowledged before upstream transmission even starts
    assert_eq!(acked, 1);

    let audit = store.wait_for_audit().await;
    assert_eq!(audit.vehicle_id, 9);
    assert!(!audit.success);
    assert_eq!(audit.response["error"], "LATRA API returned status 502");
    assert_eq!(audit.response["detail"]["message"], "gateway down");
    // Bounded retry: exactly three attempts for the batch
    assert_eq!(mock.hits_async().await, 3);

    Ok(())
}

#[tokio::test]
async fn test_codec8e_tampering_report() -> Result<()> {
    setup_logging();
    let server = MockServer::start_async().await;
    // External power lost at 25 km/h: device tampering, with the RSSI raw
    // value multiplied by six
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/report").json_body_partial(
                r#"{ "items": [ { "activity_id": "14", "RSSI": "24", "addon_info": { "ext_power_voltage": "0" } } ] }"#,
            );
            then.status(200).json_body(serde_json::json!({}));
        })
        .await;

    let imei = get_random_imei();
    let store = Arc::new(RecordingStore::default());
    let listener = gateway(&server, store.clone());

    let record = AvlRecordBuilder::new()
        .with_speed(25)
        .with_latitude(-6.7924)
        .with_longitude(39.2083)
        .with_io_elements(vec![
            (66, IoValue::Scaled { raw: 0, places: 2 }),
            (21, IoValue::Unsigned(4)),
        ])
        .build();
    let frame = AvlFrameBuilder::new(Codec::Codec8Ext).add_record(record).to_bytes();

    run_session(listener, &imei, frame).await?;
    wait_for_hits(&mock, 1).await;

    Ok(())
}

#[tokio::test]
async fn test_multiple_records_are_acked_and_sent_in_device_order() -> Result<()> {
    setup_logging();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/report").json_body_partial(
                r#"{ "items": [ { "activity_id": "2" }, { "activity_id": "3" } ] }"#,
            );
            then.status(200).json_body(serde_json::json!({}));
        })
        .await;

    let imei = get_random_imei();
    let store = Arc::new(RecordingStore::with_registered_vehicle(5, "T321JKL", &imei));
    let listener = gateway(&server, store.clone());

    let ignition_on = AvlRecordBuilder::new()
        .with_io_elements(vec![(239, IoValue::Unsigned(1))])
        .build();
    let ignition_off = AvlRecordBuilder::new()
        .with_io_elements(vec![(239, IoValue::Unsigned(0))])
        .build();
    let frame = AvlFrameBuilder::new(Codec::Codec8)
        .with_records(vec![ignition_on, ignition_off])
        .to_bytes();

    let acked = run_session(listener, &imei, frame).await?;
    assert_eq!(acked, 2);
    wait_for_hits(&mock, 1).await;

    Ok(())
}
