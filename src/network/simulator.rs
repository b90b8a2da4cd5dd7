//! Simulated IQRF network
//!
//! Answers request frames the way a coordinator and its nodes would:
//! a confirmation for frames addressed to nodes (unicast and broadcast),
//! then a response for unicast frames. Used by the CLI and the tests.

use std::collections::{HashMap, HashSet};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::Result;
use crate::protocol::{Confirmation, Header, MessageCodec, NodeAddress, ResponseCode};
use crate::timing::{timeslot_length, RfMode, TrSeries};

use super::Frame;

/// Response data used when no canned payload is registered
const DEFAULT_PAYLOAD_LEN: usize = 32;

/// Behaviour of the simulated devices
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub rf_mode: RfMode,
    pub tr_series: TrSeries,
    pub hops: u8,
    pub hops_response: u8,
    pub dpa_value: u8,
    pub confirmation_delay: Duration,
    /// Delay between confirmation (or request) and response
    pub response_delay: Duration,
    /// Nodes that never confirm
    pub silent_confirmations: HashSet<u8>,
    /// Nodes that never respond
    pub silent_responses: HashSet<u8>,
    /// Response data per (PNUM, request PCMD)
    pub payloads: HashMap<(u8, u8), Vec<u8>>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            rf_mode: RfMode::Std,
            tr_series: TrSeries::Tr72x,
            hops: 1,
            hops_response: 1,
            dpa_value: 0,
            confirmation_delay: Duration::from_millis(5),
            response_delay: Duration::from_millis(20),
            silent_confirmations: HashSet::new(),
            silent_responses: HashSet::new(),
            payloads: HashMap::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn with_payload(mut self, pnum: u8, pcmd: u8, data: Vec<u8>) -> Self {
        self.payloads.insert((pnum, pcmd), data);
        self
    }

    pub fn without_confirmation_from(mut self, node: u8) -> Self {
        self.silent_confirmations.insert(node);
        self
    }

    pub fn without_response_from(mut self, node: u8) -> Self {
        self.silent_responses.insert(node);
        self
    }
}

/// Responder thread fed by a frame channel
pub struct SimulatedNetwork {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedNetwork {
    /// Start answering frames from `frames`, handing replies to `deliver`
    pub fn spawn<F>(frames: Receiver<Frame>, config: SimulatorConfig, deliver: F) -> Result<Self>
    where
        F: Fn(&[u8], &str) + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("dpa-simulator".to_string())
            .spawn(move || {
                tracing::debug!("Simulated network started");
                loop {
                    crossbeam::select! {
                        recv(frames) -> frame => match frame {
                            Ok(frame) => answer(&frame, &config, &deliver),
                            Err(_) => break,
                        },
                        recv(stop_rx) -> _ => break,
                    }
                }
                tracing::debug!("Simulated network stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimulatedNetwork {
    fn drop(&mut self) {
        self.stop();
    }
}

fn answer<F: Fn(&[u8], &str)>(frame: &Frame, config: &SimulatorConfig, deliver: &F) {
    let header = match Header::parse(&frame.data) {
        Ok(header) => header,
        Err(e) => {
            tracing::warn!("Simulator ignoring frame: {}", e);
            return;
        }
    };

    match MessageCodec::default().decode_request(&frame.data, &frame.network_id) {
        Ok(request) => tracing::trace!("Simulator received {}", request),
        Err(e) => tracing::trace!("Simulator received unmapped request: {}", e),
    }

    let node = header.node;
    let node_byte = node.to_byte();

    if !node.is_coordinator() {
        if config.silent_confirmations.contains(&node_byte) {
            return;
        }
        std::thread::sleep(config.confirmation_delay);
        let confirmation = Confirmation {
            dpa_value: config.dpa_value,
            hops: config.hops,
            timeslot_length: timeslot_length(config.rf_mode, config.tr_series, frame.data.len()),
            hops_response: config.hops_response,
        };
        deliver(&confirmation.encode(&header), &frame.network_id);
    }

    if node == NodeAddress::Broadcast || config.silent_responses.contains(&node_byte) {
        return;
    }

    std::thread::sleep(config.response_delay);
    let data = config
        .payloads
        .get(&(header.pnum, header.pcmd))
        .cloned()
        .unwrap_or_else(|| vec![0; DEFAULT_PAYLOAD_LEN]);

    match MessageCodec::encode_response(&frame.data, ResponseCode::NoError, config.dpa_value, &data) {
        Ok(response) => deliver(&response, &frame.network_id),
        Err(e) => tracing::warn!("Simulator cannot build response: {}", e),
    }
}
