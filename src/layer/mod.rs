//! Protocol Layer
//!
//! Bridges typed calls to the byte transport.
//!
//! ## Responsibilities
//! - Encode requests and transmit them one at a time
//! - Drive the state machine with requests, confirmations and responses
//! - Correlate responses with registered requests
//! - Dispatch unmatched and flagged frames as asynchronous messages
//! - Turn state machine timeouts into error responses
//!
//! ## Concurrency
//! ```text
//!   caller threads ──► sender gate ──► wait for FREE_FOR_SEND ──┐
//!                                                                ▼
//!                          send lock: evict ─► transmit ─► register ─► machine
//!                                                                ▲
//!   transport thread ──► on_receive ──► send lock: match ─► machine
//!                              │
//!                              └──► delivery lock ──► MessageListener
//! ```
//! - The sender gate serializes senders across waiting and sending
//! - The send lock makes transmit + register atomic against receiving
//! - The delivery lock serializes deliveries from the receive thread and
//!   the state machine worker (timeouts)
//! - No lock is held while another thread's lock is awaited, except the
//!   send lock around state machine calls; the worker never takes it

mod signal;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{Config, TimeUnlimitedTable};
use crate::error::{DpaError, Result};
use crate::machine::{MachineListener, ProtocolStateMachine, RequestContext, State};
use crate::network::Transport;
use crate::protocol::{
    is_confirmation, AsyncMessage, CallRequest, CallResponse, Confirmation, Message, MessageCodec,
    RequestId, ResponseError, Value,
};
use crate::registry::RequestRegistry;
use crate::timing::{NetworkTiming, TimingParamsStorage};

use signal::FreeSignal;

/// Re-check interval of senders waiting for FREE_FOR_SEND
const FREE_POLL_INTERVAL: Duration = Duration::from_millis(50);

// =============================================================================
// Listener
// =============================================================================

/// Receives every response and asynchronous message
pub trait MessageListener: Send + Sync {
    fn on_message(&self, message: Message);
}

impl MessageListener for crossbeam::channel::Sender<Message> {
    fn on_message(&self, message: Message) {
        if self.send(message).is_err() {
            tracing::warn!("Message listener channel closed, message dropped");
        }
    }
}

// =============================================================================
// Shared state
// =============================================================================

/// How the last sent request is timed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timing {
    /// Fed into the state machine
    Machine,
    /// Long-running operation, caller's own timeout applies
    Unlimited,
    /// Caller supplied a processing time
    UserTimeout,
}

#[derive(Debug, Clone)]
struct InFlight {
    id: RequestId,
    request: Arc<CallRequest>,
    timing: Timing,
}

/// State reachable from both the layer and the state machine worker
struct Shared {
    registry: RequestRegistry,
    listener: Arc<dyn MessageListener>,
    last_request: Mutex<Option<InFlight>>,
    delivery_lock: Mutex<()>,
    free_signal: FreeSignal,
}

impl Shared {
    fn deliver(&self, message: Message) {
        let _guard = self.delivery_lock.lock();
        self.listener.on_message(message);
    }

    fn last_request(&self) -> Option<InFlight> {
        self.last_request.lock().clone()
    }

    /// Error response for the request the machine was timing
    fn deliver_timeout(&self, error: ResponseError) {
        let Some(last) = self.last_request() else {
            tracing::warn!("{} without a pending request", error);
            return;
        };

        self.registry.remove(last.id);
        tracing::warn!("Request {} ({}): {}", last.id, last.request, error);

        self.deliver(Message::Response(CallResponse {
            request_id: last.id,
            network_id: last.request.network_id.clone(),
            node: last.request.node,
            interface: last.request.interface,
            method: last.request.method.clone(),
            result: Err(error),
            additional: None,
        }));
    }
}

impl MachineListener for Shared {
    fn on_free_for_send(&self) {
        self.free_signal.notify();
    }

    fn on_confirmation_timeout(&self) {
        self.deliver_timeout(ResponseError::ConfirmationTimeout);
        self.free_signal.notify();
    }

    fn on_response_timeout(&self) {
        self.deliver_timeout(ResponseError::ResponseTimeout);
        self.free_signal.notify();
    }
}

// =============================================================================
// Protocol layer
// =============================================================================

/// DPA protocol layer over one transport connection
pub struct ProtocolLayer {
    codec: MessageCodec,
    transport: Arc<dyn Transport>,
    machine: ProtocolStateMachine,
    shared: Arc<Shared>,
    timing: TimingParamsStorage,
    time_unlimited: TimeUnlimitedTable,

    /// Held by one sender from waiting until the request is handed over
    sender_gate: Mutex<()>,
    /// Transmit + register vs. receive + match
    send_lock: Mutex<()>,
    next_id: AtomicU64,
}

impl ProtocolLayer {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        listener: Arc<dyn MessageListener>,
    ) -> Self {
        let shared = Arc::new(Shared {
            registry: RequestRegistry::new(config.max_request_duration()),
            listener,
            last_request: Mutex::new(None),
            delivery_lock: Mutex::new(()),
            free_signal: FreeSignal::new(),
        });
        let machine_listener: Arc<dyn MachineListener> = shared.clone();

        Self {
            codec: MessageCodec::default(),
            transport,
            machine: ProtocolStateMachine::new(config, machine_listener),
            shared,
            timing: TimingParamsStorage::new(config.default_timing, config.networks.clone()),
            time_unlimited: config.time_unlimited.clone(),
            sender_gate: Mutex::new(()),
            send_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Use a custom codec (mapping table)
    pub fn with_codec(mut self, codec: MessageCodec) -> Self {
        self.codec = codec;
        self
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn start(&self) -> Result<()> {
        self.machine.start()?;
        tracing::debug!("Protocol layer started");
        Ok(())
    }

    pub fn destroy(&self) {
        self.machine.destroy();
        self.shared.free_signal.notify();
        tracing::debug!("Protocol layer destroyed");
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Send a request; its `processing_time`, if any, exempts it from
    /// state machine timing
    pub fn send_request(&self, request: CallRequest) -> Result<RequestId> {
        self.send(request)
    }

    /// Send a request whose completion the caller times itself
    pub fn send_request_with_timeout(&self, request: CallRequest, timeout: Duration) -> Result<RequestId> {
        self.send(request.with_processing_time(timeout))
    }

    fn send(&self, request: CallRequest) -> Result<RequestId> {
        if !self.machine.is_running() {
            return Err(DpaError::NotRunning);
        }

        let frame = self.codec.encode(&request)?;
        let request = Arc::new(request);
        let timing = self.timing_of(&request);

        let _gate = self.sender_gate.lock();
        self.wait_before_send()?;

        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let _send = self.send_lock.lock();

        self.shared.registry.evict_invalid(&request);
        self.transport.send(&frame, &request.network_id)?;
        tracing::debug!("Sent request {} ({}, {:?})", id, request, timing);

        if !request.node.is_broadcast() {
            self.shared.registry.insert(id, Arc::clone(&request));
        }
        *self.shared.last_request.lock() = Some(InFlight {
            id,
            request: Arc::clone(&request),
            timing,
        });

        if timing == Timing::Machine {
            let network = self.timing.get(&request.network_id);
            if let Err(e) = self
                .machine
                .new_request(RequestContext::for_request(&request, &network))
            {
                // an untimed request would never get an outcome
                self.shared.registry.remove(id);
                *self.shared.last_request.lock() = None;
                return Err(e);
            }
        }

        Ok(id)
    }

    fn timing_of(&self, request: &CallRequest) -> Timing {
        if request.node.is_broadcast() {
            Timing::Machine
        } else if self.time_unlimited.contains(request.interface, &request.method) {
            Timing::Unlimited
        } else if request.processing_time.is_some() {
            Timing::UserTimeout
        } else {
            Timing::Machine
        }
    }

    /// Block until the machine is free; an error state is reset first
    fn wait_before_send(&self) -> Result<()> {
        loop {
            if !self.machine.is_running() {
                return Err(DpaError::NotRunning);
            }

            let state = self.machine.state();
            if state.is_free() {
                return Ok(());
            }
            if state.is_error() {
                match self.machine.reset_after_error() {
                    Ok(()) | Err(DpaError::UnexpectedEvent { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }

            self.shared.free_signal.wait_timeout(FREE_POLL_INTERVAL);
        }
    }

    // =========================================================================
    // Receiving
    // =========================================================================

    /// Handle one inbound frame from the transport
    pub fn on_receive(&self, frame: &[u8], network_id: &str) {
        if is_confirmation(frame) {
            self.handle_confirmation(frame, network_id);
        } else {
            self.handle_response(frame, network_id);
        }
    }

    fn handle_confirmation(&self, frame: &[u8], network_id: &str) {
        let confirmation = match Confirmation::decode(frame) {
            Ok(confirmation) => confirmation,
            Err(e) => {
                tracing::warn!("Dropping confirmation from network {}: {}", network_id, e);
                return;
            }
        };

        let broadcast_response = {
            let _send = self.send_lock.lock();

            let Some(last) = self.shared.last_request() else {
                tracing::warn!("Confirmation from network {} without a pending request", network_id);
                return;
            };

            if last.timing == Timing::Machine {
                if let Err(e) = self.machine.confirmation_received(confirmation) {
                    tracing::warn!("Confirmation for request {} rejected: {}", last.id, e);
                    return;
                }
            }

            // broadcasts have no real response
            last.request.node.is_broadcast().then(|| CallResponse {
                request_id: last.id,
                network_id: last.request.network_id.clone(),
                node: last.request.node,
                interface: last.request.interface,
                method: last.request.method.clone(),
                result: Ok(Value::Void),
                additional: None,
            })
        };

        if let Some(response) = broadcast_response {
            self.shared.deliver(Message::Response(response));
        }
    }

    fn handle_response(&self, frame: &[u8], network_id: &str) {
        let decoded = match self.codec.decode_response(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Dropping frame from network {}: {}", network_id, e);
                return;
            }
        };

        let matched = if decoded.is_async {
            None
        } else {
            let _send = self.send_lock.lock();

            let entry = self.shared.registry.find_match(
                network_id,
                decoded.node,
                decoded.interface,
                decoded.method,
            );
            if let Some(entry) = &entry {
                let drives_machine = self
                    .shared
                    .last_request()
                    .map(|last| last.id == entry.id && last.timing == Timing::Machine)
                    .unwrap_or(false);

                // a rejected response leaves the request to the machine's timeout
                if drives_machine {
                    if let Err(e) = self.machine.response_received(decoded.frame_len) {
                        tracing::warn!("Dropping response for request {}: {}", entry.id, e);
                        return;
                    }
                }

                self.shared.registry.remove(entry.id);
                if let Ok(value) = &decoded.result {
                    self.timing.apply_response(&entry.request, value);
                }
            }
            entry
        };

        let message = match matched {
            Some(entry) => Message::Response(CallResponse {
                request_id: entry.id,
                network_id: network_id.to_string(),
                node: decoded.node,
                interface: decoded.interface,
                method: entry.request.method.clone(),
                result: decoded.result,
                additional: Some(decoded.additional),
            }),
            None => {
                tracing::debug!(
                    "Asynchronous message from {} peripheral 0x{:02x} ({}.{})",
                    decoded.node,
                    decoded.pnum,
                    decoded.interface,
                    decoded.method
                );
                Message::Async(AsyncMessage {
                    network_id: network_id.to_string(),
                    node: decoded.node,
                    interface: decoded.interface,
                    peripheral: decoded.pnum,
                    method: decoded.method,
                    result: decoded.result,
                    additional: decoded.additional,
                })
            }
        };

        self.shared.deliver(message);
    }

    // =========================================================================
    // Introspection / tunables
    // =========================================================================

    pub fn state(&self) -> State {
        self.machine.state()
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.shared.registry.contains(id)
    }

    pub fn network_timing(&self, network_id: &str) -> NetworkTiming {
        self.timing.get(network_id)
    }

    pub fn time_to_wait_for_confirmation(&self) -> Duration {
        self.machine.time_to_wait_for_confirmation()
    }

    pub fn set_time_to_wait_for_confirmation(&self, ms: i64) -> Result<()> {
        self.machine.set_time_to_wait_for_confirmation(ms)
    }

    pub fn base_time_to_wait_for_response(&self) -> Duration {
        self.machine.base_time_to_wait_for_response()
    }

    pub fn set_base_time_to_wait_for_response(&self, ms: i64) -> Result<()> {
        self.machine.set_base_time_to_wait_for_response(ms)
    }

    pub fn max_request_duration(&self) -> Duration {
        self.shared.registry.max_request_duration()
    }

    pub fn set_max_request_duration(&self, ms: i64) -> Result<()> {
        self.shared.registry.set_max_request_duration(ms)
    }
}

impl Drop for ProtocolLayer {
    fn drop(&mut self) {
        self.destroy();
    }
}
