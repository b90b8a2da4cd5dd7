//! Request Registry Tests
//!
//! Tests for request registration, response matching and eviction, both on
//! the registry itself and through the protocol layer.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver};
use parking_lot::Mutex;

use iqrf_dpa::config::Config;
use iqrf_dpa::network::Transport;
use iqrf_dpa::protocol::{
    CallRequest, DeviceInterface, Message, MessageCodec, NodeAddress, RequestId, ResponseCode, Value,
};
use iqrf_dpa::registry::RequestRegistry;
use iqrf_dpa::{DpaError, ProtocolLayer};

// =============================================================================
// Helper Functions
// =============================================================================

fn eeprom_read(address: u8) -> CallRequest {
    CallRequest::new("net", NodeAddress::Coordinator, DeviceInterface::Eeprom, "read")
        .with_args(vec![Value::U8(address), Value::U8(4)])
}

#[derive(Default)]
struct RecordingTransport {
    frames: Mutex<Vec<Vec<u8>>>,
}

impl Transport for RecordingTransport {
    fn send(&self, frame: &[u8], _network_id: &str) -> iqrf_dpa::Result<()> {
        self.frames.lock().push(frame.to_vec());
        Ok(())
    }
}

fn setup_layer(config: &Config) -> (ProtocolLayer, Arc<RecordingTransport>, Receiver<Message>) {
    let transport = Arc::new(RecordingTransport::default());
    let (tx, rx) = channel::unbounded();
    let layer = ProtocolLayer::new(config, transport.clone(), Arc::new(tx));
    layer.start().unwrap();
    (layer, transport, rx)
}

fn response_to(frame: &[u8]) -> Vec<u8> {
    MessageCodec::encode_response(frame, ResponseCode::NoError, 0, &[0xDE, 0xAD, 0xBE, 0xEF])
        .unwrap()
        .to_vec()
}

fn matched_request_id(messages: &Receiver<Message>) -> RequestId {
    match messages.recv_timeout(Duration::from_secs(2)) {
        Ok(Message::Response(response)) => {
            assert!(response.is_ok());
            response.request_id
        }
        other => panic!("Expected response, got {:?}", other),
    }
}

// =============================================================================
// Registry Tests
// =============================================================================

#[test]
fn test_take_match_returns_oldest() {
    let registry = RequestRegistry::new(Duration::from_secs(10));
    registry.insert(RequestId(1), Arc::new(eeprom_read(0)));
    registry.insert(RequestId(2), Arc::new(eeprom_read(8)));
    assert_eq!(registry.len(), 2);

    let entry = registry
        .take_match("net", NodeAddress::Coordinator, DeviceInterface::Eeprom, "read")
        .unwrap();
    assert_eq!(entry.id, RequestId(1));
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(RequestId(2)));
}

#[test]
fn test_find_match_leaves_entry() {
    let registry = RequestRegistry::new(Duration::from_secs(10));
    registry.insert(RequestId(1), Arc::new(eeprom_read(0)));
    registry.insert(RequestId(2), Arc::new(eeprom_read(8)));

    let entry = registry
        .find_match("net", NodeAddress::Coordinator, DeviceInterface::Eeprom, "read")
        .unwrap();
    assert_eq!(entry.id, RequestId(1));
    assert_eq!(registry.len(), 2);

    assert!(registry.remove(entry.id).is_some());
    assert!(!registry.contains(RequestId(1)));
    assert!(registry
        .find_match("net", NodeAddress::Coordinator, DeviceInterface::Ram, "read")
        .is_none());
}

#[test]
fn test_take_match_requires_same_shape() {
    let registry = RequestRegistry::new(Duration::from_secs(10));
    registry.insert(RequestId(1), Arc::new(eeprom_read(0)));

    assert!(registry
        .take_match("other", NodeAddress::Coordinator, DeviceInterface::Eeprom, "read")
        .is_none());
    assert!(registry
        .take_match("net", NodeAddress::Node(1), DeviceInterface::Eeprom, "read")
        .is_none());
    assert!(registry
        .take_match("net", NodeAddress::Coordinator, DeviceInterface::Ram, "read")
        .is_none());
    assert!(registry
        .take_match("net", NodeAddress::Coordinator, DeviceInterface::Eeprom, "write")
        .is_none());
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_evict_duplicate_call() {
    let registry = RequestRegistry::new(Duration::from_secs(10));
    registry.insert(RequestId(1), Arc::new(eeprom_read(0)));
    registry.insert(RequestId(2), Arc::new(eeprom_read(8)));

    assert_eq!(registry.evict_invalid(&eeprom_read(0)), 1);
    assert!(!registry.contains(RequestId(1)));
    assert!(registry.contains(RequestId(2)));
}

#[test]
fn test_evict_stale_entries() {
    let registry = RequestRegistry::new(Duration::from_millis(0));
    registry.insert(RequestId(1), Arc::new(eeprom_read(0)));
    std::thread::sleep(Duration::from_millis(5));

    assert_eq!(registry.evict_invalid(&eeprom_read(8)), 1);
    assert!(registry.is_empty());
}

#[test]
fn test_fresh_entries_survive() {
    let registry = RequestRegistry::new(Duration::from_secs(10));
    registry.insert(RequestId(1), Arc::new(eeprom_read(0)));

    assert_eq!(registry.evict_invalid(&eeprom_read(8)), 0);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_remove_by_id() {
    let registry = RequestRegistry::new(Duration::from_secs(10));
    registry.insert(RequestId(7), Arc::new(eeprom_read(0)));

    assert_eq!(registry.remove(RequestId(7)).map(|e| e.id), Some(RequestId(7)));
    assert!(registry.remove(RequestId(7)).is_none());
}

#[test]
fn test_negative_max_duration_rejected() {
    let registry = RequestRegistry::new(Duration::from_secs(10));

    assert!(matches!(registry.set_max_request_duration(-5), Err(DpaError::InvalidArgument(_))));
    assert_eq!(registry.max_request_duration(), Duration::from_secs(10));

    registry.set_max_request_duration(250).unwrap();
    assert_eq!(registry.max_request_duration(), Duration::from_millis(250));
}

// =============================================================================
// Matching Through the Layer
// =============================================================================

#[test]
fn test_response_matches_oldest_request() {
    let (layer, transport, messages) = setup_layer(&Config::default());

    let first = layer
        .send_request_with_timeout(eeprom_read(0), Duration::from_secs(5))
        .unwrap();
    let second = layer
        .send_request_with_timeout(eeprom_read(8), Duration::from_secs(5))
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(layer.pending_requests(), 2);

    let frame = transport.frames.lock()[0].clone();
    layer.on_receive(&response_to(&frame), "net");

    assert_eq!(matched_request_id(&messages), first);
    assert!(layer.is_pending(second));
}

#[test]
fn test_zero_max_duration_evicts_older_request() {
    let (layer, transport, messages) = setup_layer(&Config::default());
    layer.set_max_request_duration(0).unwrap();

    let first = layer
        .send_request_with_timeout(eeprom_read(0), Duration::from_secs(5))
        .unwrap();
    std::thread::sleep(Duration::from_millis(5));
    let second = layer
        .send_request_with_timeout(eeprom_read(8), Duration::from_secs(5))
        .unwrap();
    assert!(!layer.is_pending(first));

    let frame = transport.frames.lock()[0].clone();
    layer.on_receive(&response_to(&frame), "net");

    assert_eq!(matched_request_id(&messages), second);
    assert_eq!(layer.pending_requests(), 0);
}

#[test]
fn test_identical_call_replaces_pending_one() {
    let (layer, transport, messages) = setup_layer(&Config::default());

    let first = layer
        .send_request_with_timeout(eeprom_read(0), Duration::from_secs(5))
        .unwrap();
    let second = layer
        .send_request_with_timeout(eeprom_read(0), Duration::from_secs(5))
        .unwrap();
    assert!(!layer.is_pending(first));
    assert_eq!(layer.pending_requests(), 1);

    let frame = transport.frames.lock()[1].clone();
    layer.on_receive(&response_to(&frame), "net");
    assert_eq!(matched_request_id(&messages), second);
}
