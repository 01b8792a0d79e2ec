//! # Serial Communication Module
//!
//! Handles the text link to an ELM327-style OBD-II adapter.
//!
//! This module handles:
//! - Opening the adapter's serial port
//! - Writing request telegrams terminated by `\r`
//! - Splitting inbound bytes into response lines at `\r` and the `>` prompt
//! - Routing responses to waiting requests via [`ResponseCorrelator`]

pub mod correlator;
pub mod port_trait;
pub mod transport;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{ObdLoggerError, Result};
use crate::obd::decoder::normalize_response;
use correlator::ResponseCorrelator;
use port_trait::{SerialPortIO, TokioSerialPort};
use transport::Transport;

/// Common ELM327 adapter paths tried after the configured one
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters (most common)
    "/dev/rfcomm0", // Bluetooth serial
];

/// Adapter line terminator for requests
const REQUEST_TERMINATOR: &[u8] = b"\r";

/// Adapter status lines that are not responses
const STATUS_LINES: &[&str] = &["SEARCHING...", "OK", "?"];

/// Unterminated input beyond this many bytes is discarded
const MAX_PENDING_BYTES: usize = 4096;

/// ELM327-style adapter link
///
/// Generic over the write side so tests can substitute a mock port.
pub struct ElmLink<P: SerialPortIO> {
    port: tokio::sync::Mutex<P>,
    correlator: Arc<ResponseCorrelator>,
    inbound: Mutex<Inbound>,
    device_path: String,
}

#[derive(Default)]
struct Inbound {
    buffer: BytesMut,
    last_response: Option<String>,
    last_request: Option<String>,
}

impl<P: SerialPortIO> std::fmt::Debug for ElmLink<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElmLink")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl<P: SerialPortIO> ElmLink<P> {
    /// Link over an already-open port
    pub fn new(port: P, correlator: Arc<ResponseCorrelator>, device_path: impl Into<String>) -> Self {
        Self {
            port: tokio::sync::Mutex::new(port),
            correlator,
            inbound: Mutex::new(Inbound::default()),
            device_path: device_path.into(),
        }
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Feed raw bytes received from the adapter
    ///
    /// Complete lines are normalized; echoes of the last request and status
    /// lines are dropped, everything else becomes the last response and is
    /// offered to the correlator.
    pub fn ingest(&self, data: &[u8]) {
        let lines = {
            let mut inbound = self.inbound.lock().unwrap_or_else(PoisonError::into_inner);
            inbound.buffer.extend_from_slice(data);

            let mut lines = Vec::new();
            while let Some(pos) = inbound.buffer.iter().position(|&b| matches!(b, b'\r' | b'\n' | b'>')) {
                let chunk = inbound.buffer.split_to(pos + 1);
                let line = normalize_response(&String::from_utf8_lossy(&chunk[..pos]));
                if line.is_empty() || STATUS_LINES.contains(&line.as_str()) {
                    continue;
                }
                if inbound.last_request.as_deref() == Some(line.as_str()) {
                    debug!("Dropping echo: {}", line);
                    continue;
                }
                inbound.last_response = Some(line.clone());
                lines.push(line);
            }

            if inbound.buffer.len() > MAX_PENDING_BYTES {
                warn!(
                    "Discarding {} bytes without a line terminator from {}",
                    inbound.buffer.len(),
                    self.device_path
                );
                inbound.buffer.clear();
            }
            lines
        };

        for line in lines {
            debug!("Received: {}", line);
            self.correlator.deliver(&line);
        }
    }
}

#[async_trait]
impl<P: SerialPortIO> Transport for ElmLink<P> {
    async fn send(&self, telegram: &str) -> Result<()> {
        {
            let mut inbound = self.inbound.lock().unwrap_or_else(PoisonError::into_inner);
            inbound.last_request = Some(normalize_response(telegram));
        }

        let mut port = self.port.lock().await;
        port.write_line(telegram.as_bytes(), REQUEST_TERMINATOR)
            .await
            .map_err(|e| ObdLoggerError::Serial(format!("Failed to write telegram {}: {}", telegram, e)))?;

        debug!("Sent telegram {}", telegram);
        Ok(())
    }

    fn last_response(&self) -> Option<String> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_response
            .clone()
    }
}

impl ElmLink<TokioSerialPort> {
    /// Open the configured adapter, falling back to common device paths
    ///
    /// Spawns a reader task feeding [`ElmLink::ingest`]; must be called
    /// from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if no path could be opened.
    pub fn open(config: &SerialConfig, correlator: Arc<ResponseCorrelator>) -> Result<Arc<Self>> {
        let mut paths = vec![config.port.as_str()];
        paths.extend(DEFAULT_DEVICE_PATHS.iter().copied().filter(|p| *p != config.port));
        let timeout = Duration::from_millis(config.timeout_ms);
        Self::open_with_paths(&paths, config.baud_rate, timeout, correlator)
    }

    /// Open the first usable path in `paths`
    pub fn open_with_paths(
        paths: &[&str],
        baud_rate: u32,
        timeout: Duration,
        correlator: Arc<ResponseCorrelator>,
    ) -> Result<Arc<Self>> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate, timeout) {
                Ok(stream) => {
                    info!("Successfully opened OBD adapter at {}", path);
                    let (mut reader, writer) = tokio::io::split(stream);
                    let link = Arc::new(Self::new(TokioSerialPort::new(writer), correlator, *path));

                    let inbound = Arc::clone(&link);
                    tokio::spawn(async move {
                        let mut buf = [0u8; 256];
                        loop {
                            match reader.read(&mut buf).await {
                                Ok(0) => {
                                    warn!("Serial port {} closed", inbound.device_path());
                                    break;
                                }
                                Ok(n) => inbound.ingest(&buf[..n]),
                                Err(e) => {
                                    warn!("Serial read failed on {}: {}", inbound.device_path(), e);
                                    break;
                                }
                            }
                        }
                    });

                    return Ok(link);
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(ObdLoggerError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32, timeout: Duration) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .timeout(timeout)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| ObdLoggerError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obd::protocol::ParameterId;
    use port_trait::mocks::MockSerialPort;

    fn link() -> (ElmLink<MockSerialPort>, MockSerialPort, Arc<ResponseCorrelator>) {
        let port = MockSerialPort::new();
        let correlator = Arc::new(ResponseCorrelator::new());
        let link = ElmLink::new(port.clone(), Arc::clone(&correlator), "/dev/mock");
        (link, port, correlator)
    }

    #[tokio::test]
    async fn test_send_writes_terminated_telegram() {
        let (link, port, _) = link();
        link.send("010D").await.unwrap();

        assert_eq!(port.written_text(), "010D\r");
        assert_eq!(port.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_send_error_is_serial_error() {
        let (link, port, _) = link();
        port.set_write_error(std::io::ErrorKind::BrokenPipe);

        match link.send("010D").await {
            Err(ObdLoggerError::Serial(msg)) => assert!(msg.contains("Failed to write")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ingest_routes_response() {
        let (link, _, correlator) = link();
        let rx = correlator.expect(ParameterId::VehicleSpeed);

        link.send("010D").await.unwrap();
        link.ingest(b"010D\r41 0D 1A \r\r>");

        assert_eq!(rx.await.unwrap(), "410D1A");
        assert_eq!(link.last_response().as_deref(), Some("410D1A"));
    }

    #[test]
    fn test_ingest_reassembles_split_lines() {
        let (link, _, _) = link();
        link.ingest(b"41 0C 0B");
        assert_eq!(link.last_response(), None);

        link.ingest(b" B8\r>");
        assert_eq!(link.last_response().as_deref(), Some("410C0BB8"));
    }

    #[test]
    fn test_ingest_skips_status_lines() {
        let (link, _, _) = link();
        link.ingest(b"SEARCHING...\r");
        assert_eq!(link.last_response(), None);

        link.ingest(b"NO DATA\r>");
        assert_eq!(link.last_response().as_deref(), Some("NODATA"));
    }

    #[test]
    fn test_ingest_discards_unterminated_flood() {
        let (link, _, _) = link();
        link.ingest(&vec![b'A'; MAX_PENDING_BYTES + 1]);
        assert_eq!(link.last_response(), None);

        // The next complete line is not glued to the discarded bytes
        link.ingest(b"41 0D 1A\r>");
        assert_eq!(link.last_response().as_deref(), Some("410D1A"));
    }

    #[test]
    fn test_default_device_paths() {
        assert_eq!(DEFAULT_DEVICE_PATHS[0], "/dev/ttyUSB0");
        assert_eq!(DEFAULT_DEVICE_PATHS.len(), 2);
    }

    #[tokio::test]
    async fn test_open_with_invalid_paths_returns_error() {
        let correlator = Arc::new(ResponseCorrelator::new());
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = ElmLink::open_with_paths(invalid_paths, 38400, Duration::from_millis(100), correlator);

        match result {
            Err(ObdLoggerError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    // Integration test - only runs if an OBD adapter is connected
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_request_with_real_hardware() {
        let correlator = Arc::new(ResponseCorrelator::new());
        let config = crate::config::SerialConfig {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 38400,
            timeout_ms: 1000,
        };

        if let Ok(link) = ElmLink::open(&config, Arc::clone(&correlator)) {
            let rx = correlator.expect(ParameterId::VehicleSpeed);
            link.send("010D").await.unwrap();
            let response = tokio::time::timeout(Duration::from_secs(2), rx).await;
            println!("Adapter response: {:?}", response);
        } else {
            println!("No OBD adapter detected (skipping)");
        }
    }
}
