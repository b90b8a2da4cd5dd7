//! Request Registry
//!
//! In-flight requests awaiting their response, in send order.
//!
//! ## Responsibilities
//! - Register a request when it is sent
//! - Match a response to the oldest registered request of the same shape
//!   (network, node, interface, method)
//! - Evict stale entries (older than the maximum request duration) and
//!   entries duplicated by a new identical call

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::config::non_negative_ms;
use crate::error::Result;
use crate::protocol::{CallRequest, DeviceInterface, NodeAddress, RequestId};

/// A request and the moment it was sent
#[derive(Debug, Clone)]
pub struct TimeRequest {
    pub id: RequestId,
    pub request: Arc<CallRequest>,
    pub sent_at: Instant,
}

/// Ordered list of unmatched, non-stale requests
#[derive(Debug)]
pub struct RequestRegistry {
    entries: Mutex<VecDeque<TimeRequest>>,
    max_request_duration: RwLock<Duration>,
}

impl RequestRegistry {
    pub fn new(max_request_duration: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_request_duration: RwLock::new(max_request_duration),
        }
    }

    pub fn max_request_duration(&self) -> Duration {
        *self.max_request_duration.read()
    }

    /// Rejects negative values, keeping the previous one
    pub fn set_max_request_duration(&self, ms: i64) -> Result<()> {
        let value = non_negative_ms("Max request duration", ms)?;
        *self.max_request_duration.write() = value;
        Ok(())
    }

    /// Drop entries older than the maximum duration or equal to `incoming`.
    ///
    /// Returns the number of evicted entries.
    pub fn evict_invalid(&self, incoming: &CallRequest) -> usize {
        let max = self.max_request_duration();
        let mut entries = self.entries.lock();
        let before = entries.len();

        entries.retain(|entry| {
            let stale = entry.sent_at.elapsed() > max;
            let duplicate = entry.request.same_call(incoming);
            if stale || duplicate {
                tracing::debug!(
                    "Evicting request {} ({}): stale={} duplicate={}",
                    entry.id,
                    entry.request,
                    stale,
                    duplicate
                );
            }
            !(stale || duplicate)
        });

        before - entries.len()
    }

    pub fn insert(&self, id: RequestId, request: Arc<CallRequest>) {
        self.entries.lock().push_back(TimeRequest {
            id,
            request,
            sent_at: Instant::now(),
        });
    }

    /// Oldest entry of the given shape, left in place
    pub fn find_match(
        &self,
        network_id: &str,
        node: NodeAddress,
        interface: DeviceInterface,
        method: &str,
    ) -> Option<TimeRequest> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.request.same_shape(network_id, node, interface, method))
            .cloned()
    }

    /// Remove and return the oldest entry of the given shape
    pub fn take_match(
        &self,
        network_id: &str,
        node: NodeAddress,
        interface: DeviceInterface,
        method: &str,
    ) -> Option<TimeRequest> {
        let mut entries = self.entries.lock();
        let index = entries
            .iter()
            .position(|e| e.request.same_shape(network_id, node, interface, method))?;
        entries.remove(index)
    }

    pub fn remove(&self, id: RequestId) -> Option<TimeRequest> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|e| e.id == id)?;
        entries.remove(index)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.lock().iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
