//! Trait abstraction for the adapter's write side to enable testing

use async_trait::async_trait;
use std::io;
use tokio::io::WriteHalf;

/// Trait for serial port write operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Write one request line and its terminator, then flush
    async fn write_line(&mut self, line: &[u8], terminator: &[u8]) -> io::Result<()> {
        self.write_all(line).await?;
        self.write_all(terminator).await?;
        self.flush().await
    }
}

/// Write half of a `tokio_serial::SerialStream`
///
/// The read half is owned by the link's reader task.
pub struct TokioSerialPort {
    port: WriteHalf<tokio_serial::SerialStream>,
}

impl TokioSerialPort {
    pub fn new(port: WriteHalf<tokio_serial::SerialStream>) -> Self {
        Self { port }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }
}
