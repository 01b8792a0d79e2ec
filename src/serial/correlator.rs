//! # Response Correlation
//!
//! Matches inbound responses to the request that asked for them.
//!
//! A request registers a pending slot keyed by its parameter before the
//! telegram is sent. Responses are routed by the PID they echo (characters
//! 2-4 of `"41 0D 1A"`), so a late answer to an earlier request can never
//! be taken as the answer to the current one.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use crate::obd::decoder::normalize_response;
use crate::obd::protocol::{ParameterId, SERVICE_CURRENT_DATA, SERVICE_RESPONSE_OFFSET};

/// Pending requests awaiting their response
#[derive(Debug, Default)]
pub struct ResponseCorrelator {
    pending: Mutex<HashMap<ParameterId, oneshot::Sender<String>>>,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next response for `parameter`
    ///
    /// Replaces any earlier pending request for the same parameter; the
    /// earlier receiver then resolves with an error.
    pub fn expect(&self, parameter: ParameterId) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(parameter, tx);
        rx
    }

    /// Drop the pending request for `parameter`, if any
    pub fn cancel(&self, parameter: ParameterId) {
        self.lock().remove(&parameter);
    }

    /// Number of requests still waiting
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Route an inbound response to its pending request
    ///
    /// Returns `true` if a waiting request received it. Responses nobody
    /// is waiting for are discarded.
    pub fn deliver(&self, response: &str) -> bool {
        let text = normalize_response(response);
        let Some(parameter) = response_parameter(&text) else {
            debug!("Discarding unrecognized response: {}", text);
            return false;
        };

        match self.lock().remove(&parameter) {
            Some(tx) => tx.send(text).is_ok(),
            None => {
                debug!("Discarding unsolicited {} response: {}", parameter, text);
                false
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ParameterId, oneshot::Sender<String>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parameter echoed by a normalized service 01 response
pub fn response_parameter(text: &str) -> Option<ParameterId> {
    let service = u8::from_str_radix(text.get(0..2)?, 16).ok()?;
    if service != SERVICE_CURRENT_DATA + SERVICE_RESPONSE_OFFSET {
        return None;
    }
    let code = u8::from_str_radix(text.get(2..4)?, 16).ok()?;
    ParameterId::from_code(code).ok()
}
