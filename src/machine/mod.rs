//! Protocol State Machine
//!
//! Tracks the single in-flight request of a connection through its
//! confirmation / response / pause cycle.
//!
//! ```text
//! FREE_FOR_SEND             ──new_request───►  WAITING_FOR_CONFIRMATION
//! FREE_FOR_SEND             ──new_request───►  WAITING_FOR_RESPONSE         (coordinator)
//! WAITING_FOR_CONFIRMATION  ──confirmation──►  WAITING_FOR_RESPONSE         (unicast)
//! WAITING_FOR_CONFIRMATION  ──confirmation──►  WAITING_AFTER_CONFIRMATION   (broadcast)
//! WAITING_FOR_CONFIRMATION  ──timeout───────►  WAITING_FOR_CONFIRMATION_ERROR
//! WAITING_FOR_RESPONSE      ──response──────►  WAITING_AFTER_RESPONSE
//! WAITING_FOR_RESPONSE      ──timeout───────►  WAITING_FOR_RESPONSE_ERROR
//! WAITING_AFTER_*           ──pause elapsed─►  FREE_FOR_SEND
//! *_ERROR                   ──reset─────────►  FREE_FOR_SEND
//! ```
//!
//! ## Concurrency
//! - One worker thread owns the state and every timing field
//! - Mutators post an event and block until the worker acknowledges it,
//!   at most `state_change_timeout` (then `ConsistencyTimeout`)
//! - The current state is published through a RwLock written only by the worker
//! - Listener callbacks run on the worker thread

mod worker;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::{non_negative_ms, Config};
use crate::error::{DpaError, Result};
use crate::protocol::{CallRequest, Confirmation, DeviceInterface, NodeAddress};
use crate::timing::{NetworkTiming, RfMode, TrSeries, WaitStrategy};

use worker::Worker;

// =============================================================================
// States
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    FreeForSend,
    WaitingForConfirmation,
    WaitingForConfirmationError,
    WaitingAfterConfirmation,
    WaitingForResponse,
    WaitingForResponseError,
    WaitingAfterResponse,
}

impl State {
    pub fn is_free(self) -> bool {
        self == State::FreeForSend
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            State::WaitingForConfirmationError | State::WaitingForResponseError
        )
    }
}

// =============================================================================
// Listener
// =============================================================================

/// Receives state machine notifications (on the worker thread)
pub trait MachineListener: Send + Sync {
    /// A new request may be sent
    fn on_free_for_send(&self);

    /// No confirmation arrived in time
    fn on_confirmation_timeout(&self);

    /// No response arrived in time
    fn on_response_timeout(&self);

    /// Every state change
    fn on_transition(&self, _from: State, _to: State) {}
}

// =============================================================================
// Request context
// =============================================================================

/// What the machine needs to know about a request to time it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub node: NodeAddress,
    pub interface: DeviceInterface,
    pub strategy: WaitStrategy,
    pub rf_mode: RfMode,
    pub tr_series: TrSeries,
}

impl RequestContext {
    pub fn new(node: NodeAddress, interface: DeviceInterface) -> Self {
        let timing = NetworkTiming::default();
        Self {
            node,
            interface,
            strategy: WaitStrategy::Default,
            rf_mode: timing.rf_mode,
            tr_series: timing.tr_series,
        }
    }

    /// Context of a request on a network with the given timing
    pub fn for_request(request: &CallRequest, timing: &NetworkTiming) -> Self {
        Self {
            node: request.node,
            interface: request.interface,
            strategy: WaitStrategy::select(request, timing),
            rf_mode: timing.rf_mode,
            tr_series: timing.tr_series,
        }
    }

    pub fn with_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_link(mut self, rf_mode: RfMode, tr_series: TrSeries) -> Self {
        self.rf_mode = rf_mode;
        self.tr_series = tr_series;
        self
    }
}

// =============================================================================
// Events
// =============================================================================

pub(crate) enum Event {
    NewRequest(RequestContext),
    Confirmation { confirmation: Confirmation, received: Instant },
    Response { frame_len: usize, received: Instant },
    Reset,
    Shutdown,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::NewRequest(_) => "new request",
            Event::Confirmation { .. } => "confirmation",
            Event::Response { .. } => "response",
            Event::Reset => "reset",
            Event::Shutdown => "shutdown",
        }
    }
}

pub(crate) struct Envelope {
    event: Event,
    reply: Sender<Result<()>>,
}

/// Waiting times adjustable while running
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timeouts {
    pub confirmation: Duration,
    pub base_response: Duration,
}

// =============================================================================
// State machine handle
// =============================================================================

/// Handle to the state machine worker
pub struct ProtocolStateMachine {
    state: Arc<RwLock<State>>,
    timeouts: Arc<RwLock<Timeouts>>,
    state_change_timeout: Duration,
    listener: Arc<dyn MachineListener>,

    /// Present while the worker runs
    events: Mutex<Option<Sender<Envelope>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProtocolStateMachine {
    /// Create a stopped state machine
    pub fn new(config: &Config, listener: Arc<dyn MachineListener>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::FreeForSend)),
            timeouts: Arc::new(RwLock::new(Timeouts {
                confirmation: config.time_to_wait_for_confirmation(),
                base_response: config.base_time_to_wait_for_response(),
            })),
            state_change_timeout: config.state_change_timeout(),
            listener,
            events: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the worker thread. Starting a running machine does nothing.
    pub fn start(&self) -> Result<()> {
        let mut events = self.events.lock();
        if events.is_some() {
            return Ok(());
        }

        let (tx, rx) = channel::unbounded();
        let worker = Worker::new(
            rx,
            Arc::clone(&self.state),
            Arc::clone(&self.timeouts),
            Arc::clone(&self.listener),
        );
        let handle = std::thread::Builder::new()
            .name("dpa-state-machine".to_string())
            .spawn(move || worker.run())?;

        *events = Some(tx);
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Stop the worker and wait for it to exit
    pub fn destroy(&self) {
        let Some(sender) = self.events.lock().take() else {
            return;
        };

        let (reply_tx, _reply_rx) = channel::bounded(1);
        let _ = sender.send(Envelope { event: Event::Shutdown, reply: reply_tx });
        drop(sender);

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!("State machine worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.events.lock().is_some()
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn state(&self) -> State {
        *self.state.read()
    }

    pub fn is_free_for_send(&self) -> bool {
        self.state().is_free()
    }

    pub fn is_in_error_state(&self) -> bool {
        self.state().is_error()
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    /// Start timing a new request. Only valid in FREE_FOR_SEND.
    pub fn new_request(&self, context: RequestContext) -> Result<()> {
        self.submit(Event::NewRequest(context))
    }

    /// Confirmation of the current request arrived
    pub fn confirmation_received(&self, confirmation: Confirmation) -> Result<()> {
        self.submit(Event::Confirmation { confirmation, received: Instant::now() })
    }

    /// Response of the current request arrived; `frame_len` is its full length
    pub fn response_received(&self, frame_len: usize) -> Result<()> {
        self.submit(Event::Response { frame_len, received: Instant::now() })
    }

    /// Leave an error state
    pub fn reset_after_error(&self) -> Result<()> {
        self.submit(Event::Reset)
    }

    fn submit(&self, event: Event) -> Result<()> {
        let sender = self.events.lock().clone().ok_or(DpaError::NotRunning)?;
        let name = event.name();

        let (reply_tx, reply_rx) = channel::bounded(1);
        sender
            .send(Envelope { event, reply: reply_tx })
            .map_err(|_| DpaError::NotRunning)?;

        match reply_rx.recv_timeout(self.state_change_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(DpaError::ConsistencyTimeout(format!(
                "{} not processed within {:?}",
                name, self.state_change_timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(DpaError::NotRunning),
        }
    }

    // =========================================================================
    // Tunables
    // =========================================================================

    pub fn time_to_wait_for_confirmation(&self) -> Duration {
        self.timeouts.read().confirmation
    }

    /// Rejects negative values, keeping the previous one
    pub fn set_time_to_wait_for_confirmation(&self, ms: i64) -> Result<()> {
        let value = non_negative_ms("Time to wait for confirmation", ms)?;
        self.timeouts.write().confirmation = value;
        Ok(())
    }

    pub fn base_time_to_wait_for_response(&self) -> Duration {
        self.timeouts.read().base_response
    }

    /// Rejects negative values, keeping the previous one
    pub fn set_base_time_to_wait_for_response(&self, ms: i64) -> Result<()> {
        let value = non_negative_ms("Base time to wait for response", ms)?;
        self.timeouts.write().base_response = value;
        Ok(())
    }
}

impl Drop for ProtocolStateMachine {
    fn drop(&mut self) {
        self.destroy();
    }
}
