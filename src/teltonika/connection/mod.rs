use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use super::frame::{recognize, InboundFrame};
use super::parser::parse_data_frame;
use crate::listener::Listener;

/// A connection is dropped after this much read inactivity.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Handshake acknowledgement byte.
const IMEI_ACCEPT: [u8; 1] = [0x01];

/// Per-connection state machine: IMEI handshake, then data frames, each
/// acknowledged with the decoded record count as soon as decoding succeeds.
///
/// Decoded frames are handed to the ingestion pool; this task goes straight
/// back to reading so the device is never blocked on upstream I/O.
pub struct GatewayConnection<S> {
    stream: S,
    listener: Arc<Listener>,
    imei: Option<String>,
    buffer: Vec<u8>,
    capture_file: Option<File>,
    capture_day: Option<String>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> GatewayConnection<S> {
    pub fn new(stream: S, listener: Arc<Listener>) -> Self {
        GatewayConnection {
            stream,
            listener,
            imei: None,
            buffer: Vec::new(),
            capture_file: None,
            capture_day: None,
        }
    }

    /// Handles one device connection from first byte to close.
    pub async fn handle_connection(stream: S, listener: Arc<Listener>) -> std::io::Result<()> {
        let mut connection = Self::new(stream, listener);
        connection.run().await
    }

    fn log_target(&self) -> &str {
        self.imei.as_deref().unwrap_or("unidentified")
    }

    async fn run(&mut self) -> std::io::Result<()> {
        let mut chunk = [0u8; 4096];

        loop {
            self.drain_frames().await?;

            match timeout(IDLE_TIMEOUT, self.stream.read(&mut chunk)).await {
                Err(_) => {
                    info!(target: self.log_target(), "Connection timed out after {}s of inactivity", IDLE_TIMEOUT.as_secs());
                    break;
                }
                Ok(Ok(0)) => {
                    info!(target: self.log_target(), "Client disconnected");
                    break;
                }
                Ok(Ok(read)) => self.buffer.extend_from_slice(&chunk[..read]),
                Ok(Err(error)) if error.kind() == std::io::ErrorKind::ConnectionReset => {
                    info!(target: self.log_target(), "Client disconnected");
                    break;
                }
                Ok(Err(error)) => return Err(error),
            }
        }

        Ok(())
    }

    /// Processes every complete frame currently in the buffer.
    async fn drain_frames(&mut self) -> std::io::Result<()> {
        loop {
            let (frame, consumed) = recognize(&self.buffer);
            match frame {
                InboundFrame::Incomplete => return Ok(()),
                InboundFrame::Malformed => {
                    error!(target: self.log_target(), "Malformed frame, closing connection");
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "malformed frame",
                    ));
                }
                InboundFrame::Imei(imei) => {
                    self.buffer.drain(..consumed);
                    self.handle_imei(imei).await?;
                }
                InboundFrame::Data(data) => {
                    self.buffer.drain(..consumed);
                    self.handle_data(data).await?;
                }
            }
        }
    }

    /// Accepts the IMEI handshake.
    ///
    /// A checksum failure is only warned about: the wire contract
    /// acknowledges any length-consistent IMEI. An empty handshake is the
    /// probe health checks send and closes quietly.
    async fn handle_imei(&mut self, imei: String) -> std::io::Result<()> {
        if imei.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "empty handshake",
            ));
        }
        if !imei::valid(&imei) {
            warn!(target: &imei, "IMEI failed checksum validation, accepting anyway");
        }

        info!(target: &imei, "New client connected");
        self.stream.write_all(&IMEI_ACCEPT).await?;
        self.imei = Some(imei);

        Ok(())
    }

    /// Decodes one data frame, acknowledges the record count immediately and
    /// dispatches the pipeline.
    async fn handle_data(&mut self, data: Vec<u8>) -> std::io::Result<()> {
        let Some(imei) = self.imei.clone() else {
            // Ambiguity rule: without a handshake a data-shaped frame is
            // dropped, not trusted.
            debug!(target: self.log_target(), "Discarding data frame received before IMEI handshake");
            return Ok(());
        };

        let frame = match parse_data_frame(&data) {
            Ok(frame) => frame,
            Err(error) => {
                error!(target: &imei, "Failed to parse frame: {}", error);
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "unparseable frame"));
            }
        };

        for record_error in frame.records.iter().flat_map(|record| &record.parse_errors) {
            warn!(target: &imei, "Record parse error: {}", record_error);
        }
        for frame_error in &frame.parse_errors {
            warn!(target: &imei, "Frame parse error: {}", frame_error);
        }

        debug!(target: &imei, "Received {:?} frame with {} records", frame.codec, frame.records.len());

        // Ack before upstream work so the device can advance its buffer
        let count = frame.records.len() as u32;
        self.stream.write_all(&count.to_be_bytes()).await?;

        self.append_frame_capture(&data);

        self.listener
            .pool()
            .dispatch(self.listener.clone(), imei, data, frame);

        Ok(())
    }

    /// Appends the raw frame, base64 encoded, to the per-IMEI daily capture
    /// file when capture is configured. Rotates when the UTC day changes.
    fn append_frame_capture(&mut self, data: &[u8]) {
        let Some(base_dir) = self.listener.config().avl_log_dir.clone() else {
            return;
        };
        let Some(imei) = &self.imei else {
            return;
        };

        let today = Utc::now().format("%Y-%m-%d").to_string();
        if self.capture_day.as_deref() != Some(today.as_str()) {
            let directory = base_dir.join(imei);
            self.capture_file = match create_dir_all(&directory)
                .and_then(|_| OpenOptions::new().create(true).append(true).open(directory.join(format!("{}.txt", today))))
            {
                Ok(file) => Some(file),
                Err(error) => {
                    warn!(target: imei, "Failed to open frame capture file: {}", error);
                    None
                }
            };
            self.capture_day = Some(today);
        }

        if let Some(file) = &mut self.capture_file {
            let encoded = base64::prelude::BASE64_STANDARD.encode(data);
            if let Err(error) = writeln!(file, "{}", encoded) {
                warn!(target: imei, "Failed to write frame capture: {}", error);
            }
        }
    }
}
