//! Transport seam between the acquisition cycle and the diagnostic adapter

use async_trait::async_trait;

use crate::error::Result;

/// Moves request telegrams to the adapter and exposes what came back.
///
/// Implementations also feed every inbound response to the shared
/// [`ResponseCorrelator`](super::correlator::ResponseCorrelator).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request telegram (without line terminator)
    async fn send(&self, telegram: &str) -> Result<()>;

    /// Most recent inbound response, if any
    fn last_response(&self) -> Option<String>;
}
