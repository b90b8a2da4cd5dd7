//! Tests for ProtocolStateMachine
//!
//! These tests verify:
//! - Transitions for coordinator, unicast and broadcast requests
//! - Confirmation and response timeouts and their notifications
//! - Late and unexpected events
//! - Acknowledgement bound (consistency timeout)
//! - Lifecycle and tunables

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use iqrf_dpa::config::Config;
use iqrf_dpa::machine::{MachineListener, ProtocolStateMachine, RequestContext, State};
use iqrf_dpa::protocol::{Confirmation, DeviceInterface, NodeAddress};
use iqrf_dpa::DpaError;

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Note {
    Free,
    ConfirmationTimeout,
    ResponseTimeout,
}

struct Recorder {
    transitions: Mutex<Vec<(State, State)>>,
    notes: Sender<Note>,
    /// Delay inside every transition callback
    stall: Duration,
}

impl MachineListener for Recorder {
    fn on_free_for_send(&self) {
        let _ = self.notes.send(Note::Free);
    }

    fn on_confirmation_timeout(&self) {
        let _ = self.notes.send(Note::ConfirmationTimeout);
    }

    fn on_response_timeout(&self) {
        let _ = self.notes.send(Note::ResponseTimeout);
    }

    fn on_transition(&self, from: State, to: State) {
        if !self.stall.is_zero() {
            std::thread::sleep(self.stall);
        }
        self.transitions.lock().push((from, to));
    }
}

fn setup_machine(config: &Config) -> (ProtocolStateMachine, Arc<Recorder>, Receiver<Note>) {
    setup_stalling_machine(config, Duration::ZERO)
}

fn setup_stalling_machine(config: &Config, stall: Duration) -> (ProtocolStateMachine, Arc<Recorder>, Receiver<Note>) {
    let (tx, rx) = channel::unbounded();
    let recorder = Arc::new(Recorder {
        transitions: Mutex::new(Vec::new()),
        notes: tx,
        stall,
    });
    let machine = ProtocolStateMachine::new(config, recorder.clone());
    machine.start().unwrap();
    (machine, recorder, rx)
}

fn confirmation() -> Confirmation {
    Confirmation { dpa_value: 0, hops: 1, timeslot_length: 3, hops_response: 1 }
}

fn expect_note(notes: &Receiver<Note>, expected: Note) {
    match notes.recv_timeout(Duration::from_secs(3)) {
        Ok(note) => assert_eq!(note, expected),
        Err(_) => panic!("Expected {:?} notification", expected),
    }
}

// =============================================================================
// Transition Tests
// =============================================================================

#[test]
fn test_initial_state() {
    let (machine, _, _) = setup_machine(&Config::default());
    assert_eq!(machine.state(), State::FreeForSend);
    assert!(machine.is_free_for_send());
    assert!(!machine.is_in_error_state());
}

#[test]
fn test_coordinator_request_skips_confirmation() {
    let (machine, recorder, notes) = setup_machine(&Config::default());

    machine
        .new_request(RequestContext::new(NodeAddress::Coordinator, DeviceInterface::Coordinator))
        .unwrap();
    assert_eq!(machine.state(), State::WaitingForResponse);

    machine.response_received(40).unwrap();
    assert_eq!(machine.state(), State::WaitingAfterResponse);

    expect_note(&notes, Note::Free);
    assert_eq!(machine.state(), State::FreeForSend);

    let transitions = recorder.transitions.lock().clone();
    assert_eq!(
        transitions,
        vec![
            (State::FreeForSend, State::WaitingForResponse),
            (State::WaitingForResponse, State::WaitingAfterResponse),
            (State::WaitingAfterResponse, State::FreeForSend),
        ]
    );
}

#[test]
fn test_unicast_request_cycle() {
    let (machine, recorder, notes) = setup_machine(&Config::default());

    machine
        .new_request(RequestContext::new(NodeAddress::Node(3), DeviceInterface::Os))
        .unwrap();
    assert_eq!(machine.state(), State::WaitingForConfirmation);

    machine.confirmation_received(confirmation()).unwrap();
    assert_eq!(machine.state(), State::WaitingForResponse);

    machine.response_received(19).unwrap();
    expect_note(&notes, Note::Free);

    let states: Vec<State> = recorder.transitions.lock().iter().map(|(_, to)| *to).collect();
    assert_eq!(
        states,
        vec![
            State::WaitingForConfirmation,
            State::WaitingForResponse,
            State::WaitingAfterResponse,
            State::FreeForSend,
        ]
    );
}

#[test]
fn test_broadcast_never_waits_for_response() {
    let (machine, recorder, notes) = setup_machine(&Config::default());

    machine
        .new_request(RequestContext::new(NodeAddress::Broadcast, DeviceInterface::Ledr))
        .unwrap();
    machine.confirmation_received(confirmation()).unwrap();
    assert_eq!(machine.state(), State::WaitingAfterConfirmation);

    expect_note(&notes, Note::Free);
    assert!(machine.is_free_for_send());

    let transitions = recorder.transitions.lock().clone();
    assert!(transitions.iter().all(|(_, to)| *to != State::WaitingForResponse));
}

// =============================================================================
// Timeout Tests
// =============================================================================

#[test]
fn test_confirmation_timeout_and_reset() {
    let config = Config::builder().time_to_wait_for_confirmation_ms(50).build();
    let (machine, _, notes) = setup_machine(&config);

    machine
        .new_request(RequestContext::new(NodeAddress::Node(1), DeviceInterface::Os))
        .unwrap();
    expect_note(&notes, Note::ConfirmationTimeout);
    assert_eq!(machine.state(), State::WaitingForConfirmationError);
    assert!(machine.is_in_error_state());

    // notified once, no further transitions on their own
    assert!(notes.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(machine.state(), State::WaitingForConfirmationError);

    match machine.confirmation_received(confirmation()) {
        Err(DpaError::StateTimedOut(State::WaitingForConfirmationError)) => {}
        other => panic!("Expected StateTimedOut, got {:?}", other),
    }

    machine.reset_after_error().unwrap();
    expect_note(&notes, Note::Free);
    assert!(machine.is_free_for_send());

    machine
        .new_request(RequestContext::new(NodeAddress::Node(1), DeviceInterface::Os))
        .unwrap();
    assert_eq!(machine.state(), State::WaitingForConfirmation);
}

#[test]
fn test_response_timeout() {
    let config = Config::builder().base_time_to_wait_for_response_ms(50).build();
    let (machine, _, notes) = setup_machine(&config);

    machine
        .new_request(RequestContext::new(NodeAddress::Coordinator, DeviceInterface::Coordinator))
        .unwrap();
    expect_note(&notes, Note::ResponseTimeout);
    assert_eq!(machine.state(), State::WaitingForResponseError);

    match machine.response_received(20) {
        Err(DpaError::StateTimedOut(State::WaitingForResponseError)) => {}
        other => panic!("Expected StateTimedOut, got {:?}", other),
    }
}

// =============================================================================
// Invalid Event Tests
// =============================================================================

#[test]
fn test_unexpected_events_in_free_state() {
    let (machine, _, _) = setup_machine(&Config::default());

    match machine.confirmation_received(confirmation()) {
        Err(DpaError::UnexpectedEvent { state: State::FreeForSend, .. }) => {}
        other => panic!("Expected UnexpectedEvent, got {:?}", other),
    }
    assert!(matches!(machine.response_received(10), Err(DpaError::UnexpectedEvent { .. })));
    assert!(matches!(machine.reset_after_error(), Err(DpaError::UnexpectedEvent { .. })));
    assert!(machine.is_free_for_send());
}

#[test]
fn test_second_request_rejected_while_busy() {
    let (machine, _, _) = setup_machine(&Config::default());
    let context = RequestContext::new(NodeAddress::Node(2), DeviceInterface::Io);

    machine.new_request(context).unwrap();
    match machine.new_request(context) {
        Err(DpaError::UnexpectedEvent { state: State::WaitingForConfirmation, .. }) => {}
        other => panic!("Expected UnexpectedEvent, got {:?}", other),
    }
}

#[test]
fn test_response_while_waiting_for_confirmation() {
    let (machine, _, _) = setup_machine(&Config::default());

    machine
        .new_request(RequestContext::new(NodeAddress::Node(2), DeviceInterface::Io))
        .unwrap();
    assert!(matches!(machine.response_received(10), Err(DpaError::UnexpectedEvent { .. })));
    assert_eq!(machine.state(), State::WaitingForConfirmation);
}

// =============================================================================
// Consistency / Lifecycle Tests
// =============================================================================

#[test]
fn test_consistency_timeout() {
    let config = Config::builder().state_change_timeout_ms(20).build();
    let (machine, _, _) = setup_stalling_machine(&config, Duration::from_millis(300));

    match machine.new_request(RequestContext::new(NodeAddress::Node(1), DeviceInterface::Os)) {
        Err(DpaError::ConsistencyTimeout(_)) => {}
        other => panic!("Expected ConsistencyTimeout, got {:?}", other),
    }
}

#[test]
fn test_not_running() {
    let (tx, _rx) = channel::unbounded();
    let recorder = Arc::new(Recorder {
        transitions: Mutex::new(Vec::new()),
        notes: tx,
        stall: Duration::ZERO,
    });
    let machine = ProtocolStateMachine::new(&Config::default(), recorder);
    assert!(!machine.is_running());

    let context = RequestContext::new(NodeAddress::Node(1), DeviceInterface::Os);
    assert!(matches!(machine.new_request(context), Err(DpaError::NotRunning)));

    machine.start().unwrap();
    machine.start().unwrap();
    assert!(machine.is_running());

    machine.destroy();
    assert!(!machine.is_running());
    assert!(matches!(machine.new_request(context), Err(DpaError::NotRunning)));
}

#[test]
fn test_negative_tunables_rejected() {
    let (machine, _, _) = setup_machine(&Config::default());

    assert!(matches!(
        machine.set_time_to_wait_for_confirmation(-1),
        Err(DpaError::InvalidArgument(_))
    ));
    assert_eq!(machine.time_to_wait_for_confirmation(), Duration::from_millis(2000));

    assert!(matches!(
        machine.set_base_time_to_wait_for_response(-100),
        Err(DpaError::InvalidArgument(_))
    ));
    assert_eq!(machine.base_time_to_wait_for_response(), Duration::from_millis(2000));

    machine.set_time_to_wait_for_confirmation(0).unwrap();
    machine.set_base_time_to_wait_for_response(750).unwrap();
    assert_eq!(machine.time_to_wait_for_confirmation(), Duration::ZERO);
    assert_eq!(machine.base_time_to_wait_for_response(), Duration::from_millis(750));
}
