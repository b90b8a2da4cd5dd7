//! State machine worker
//!
//! The only owner and writer of the machine state. Waits for the next event
//! until the deadline of the current state; a missed deadline is a timeout
//! (waiting states) or the end of a mandatory pause (after-states).

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError};
use parking_lot::RwLock;

use crate::error::{DpaError, Result};
use crate::protocol::Confirmation;
use crate::timing::{after_confirmation_wait, after_response_wait, response_wait};

use super::{Envelope, Event, MachineListener, RequestContext, State, Timeouts};

/// Listener callbacks deferred until the current event is acknowledged
#[derive(Debug, Clone, Copy)]
enum Notification {
    FreeForSend,
    ConfirmationTimeout,
    ResponseTimeout,
}

pub(super) struct Worker {
    events: Receiver<Envelope>,
    shared_state: Arc<RwLock<State>>,
    timeouts: Arc<RwLock<Timeouts>>,
    listener: Arc<dyn MachineListener>,

    state: State,
    /// End of the current waiting state or pause
    deadline: Option<Instant>,
    pending: Vec<Notification>,

    // --- current session ---
    request: Option<RequestContext>,
    confirmation: Option<Confirmation>,
    confirmation_received: Option<Instant>,
    response_received: Option<Instant>,
    response_len: usize,
}

impl Worker {
    pub(super) fn new(
        events: Receiver<Envelope>,
        shared_state: Arc<RwLock<State>>,
        timeouts: Arc<RwLock<Timeouts>>,
        listener: Arc<dyn MachineListener>,
    ) -> Self {
        let state = *shared_state.read();
        Self {
            events,
            shared_state,
            timeouts,
            listener,
            state,
            deadline: None,
            pending: Vec::new(),
            request: None,
            confirmation: None,
            confirmation_received: None,
            response_received: None,
            response_len: 0,
        }
    }

    pub(super) fn run(mut self) {
        tracing::debug!("State machine worker started in {:?}", self.state);

        loop {
            let received = match self.deadline {
                None => self.events.recv().map_err(|_| RecvTimeoutError::Disconnected),
                Some(deadline) => self.events.recv_deadline(deadline),
            };

            let envelope = match received {
                Ok(envelope) => envelope,
                Err(RecvTimeoutError::Timeout) => {
                    self.on_deadline();
                    self.flush_notifications();
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            if let Event::Shutdown = envelope.event {
                let _ = envelope.reply.send(Ok(()));
                break;
            }

            let result = self.handle(envelope.event);
            let _ = envelope.reply.send(result);
            self.flush_notifications();
        }

        tracing::debug!("State machine worker stopped in {:?}", self.state);
    }

    // =========================================================================
    // Events
    // =========================================================================

    fn handle(&mut self, event: Event) -> Result<()> {
        match event {
            Event::NewRequest(context) => {
                self.expect(State::FreeForSend, None, "new request")?;

                self.request = Some(context);
                self.confirmation = None;
                self.confirmation_received = None;
                self.response_received = None;
                self.response_len = 0;

                if context.node.is_coordinator() {
                    self.enter(State::WaitingForResponse);
                } else {
                    self.enter(State::WaitingForConfirmation);
                }
                Ok(())
            }

            Event::Confirmation { confirmation, received } => {
                self.expect(
                    State::WaitingForConfirmation,
                    Some(State::WaitingForConfirmationError),
                    "confirmation",
                )?;

                self.confirmation = Some(confirmation);
                self.confirmation_received = Some(received);

                let broadcast = self.request.map(|r| r.node.is_broadcast()).unwrap_or(false);
                if broadcast {
                    self.enter(State::WaitingAfterConfirmation);
                } else {
                    self.enter(State::WaitingForResponse);
                }
                Ok(())
            }

            Event::Response { frame_len, received } => {
                self.expect(
                    State::WaitingForResponse,
                    Some(State::WaitingForResponseError),
                    "response",
                )?;

                self.response_len = frame_len;
                self.response_received = Some(received);
                self.enter(State::WaitingAfterResponse);
                Ok(())
            }

            Event::Reset => {
                if !self.state.is_error() {
                    return Err(DpaError::UnexpectedEvent { event: "reset", state: self.state });
                }
                self.enter(State::FreeForSend);
                self.pending.push(Notification::FreeForSend);
                Ok(())
            }

            // handled by the run loop
            Event::Shutdown => Ok(()),
        }
    }

    /// Check that the machine is in `expected`; the event is late if it
    /// already timed out into `timed_out`
    fn expect(&self, expected: State, timed_out: Option<State>, event: &'static str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        if Some(self.state) == timed_out {
            return Err(DpaError::StateTimedOut(self.state));
        }
        Err(DpaError::UnexpectedEvent { event, state: self.state })
    }

    fn on_deadline(&mut self) {
        match self.state {
            State::WaitingForConfirmation => {
                tracing::warn!("Confirmation not received in time");
                self.enter(State::WaitingForConfirmationError);
                self.pending.push(Notification::ConfirmationTimeout);
            }
            State::WaitingForResponse => {
                tracing::warn!("Response not received in time");
                self.enter(State::WaitingForResponseError);
                self.pending.push(Notification::ResponseTimeout);
            }
            State::WaitingAfterConfirmation | State::WaitingAfterResponse => {
                self.enter(State::FreeForSend);
                self.pending.push(Notification::FreeForSend);
            }
            _ => self.deadline = None,
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    fn enter(&mut self, to: State) {
        let from = self.state;
        self.state = to;
        *self.shared_state.write() = to;

        let wait = self.wait_in(to);
        self.deadline = wait.map(|w| Instant::now() + w);

        tracing::debug!("State {:?} -> {:?} (wait {:?})", from, to, wait);
        self.listener.on_transition(from, to);
    }

    /// How long the machine stays in `state` without events
    fn wait_in(&self, state: State) -> Option<Duration> {
        let timeouts = *self.timeouts.read();

        match state {
            State::FreeForSend
            | State::WaitingForConfirmationError
            | State::WaitingForResponseError => None,

            State::WaitingForConfirmation => Some(timeouts.confirmation),

            State::WaitingForResponse => {
                let request = self.request?;
                Some(response_wait(
                    timeouts.base_response,
                    &request.strategy,
                    self.confirmation.as_ref(),
                ))
            }

            State::WaitingAfterConfirmation => {
                let confirmation = self.confirmation.as_ref()?;
                let elapsed = elapsed_since(self.confirmation_received);
                Some(after_confirmation_wait(confirmation, elapsed))
            }

            State::WaitingAfterResponse => {
                let request = self.request?;
                let elapsed = match self.confirmation {
                    Some(_) => elapsed_since(self.confirmation_received),
                    None => elapsed_since(self.response_received),
                };
                Some(after_response_wait(
                    request.rf_mode,
                    request.tr_series,
                    self.response_len,
                    self.confirmation.as_ref(),
                    elapsed,
                ))
            }
        }
    }

    fn flush_notifications(&mut self) {
        for notification in std::mem::take(&mut self.pending) {
            match notification {
                Notification::FreeForSend => self.listener.on_free_for_send(),
                Notification::ConfirmationTimeout => self.listener.on_confirmation_timeout(),
                Notification::ResponseTimeout => self.listener.on_response_timeout(),
            }
        }
    }
}

fn elapsed_since(instant: Option<Instant>) -> Duration {
    instant.map(|i| i.elapsed()).unwrap_or(Duration::ZERO)
}
