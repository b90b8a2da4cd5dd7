//! Network Module
//!
//! The byte transport below the protocol layer.
//!
//! ## Architecture
//! - `Transport`: outbound frames (`send(frame, network_id)`)
//! - Inbound frames are pushed by the transport into
//!   `ProtocolLayer::on_receive`
//! - `ChannelTransport`: forwards frames into a crossbeam channel
//! - `SimulatedNetwork`: in-process coordinator/node responder

mod simulator;

pub use simulator::{SimulatedNetwork, SimulatorConfig};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{DpaError, Result};

/// Outbound side of a connection to an IQRF gateway
pub trait Transport: Send + Sync {
    fn send(&self, frame: &[u8], network_id: &str) -> Result<()>;
}

/// A frame addressed to a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub network_id: String,
    pub data: Bytes,
}

/// Transport writing every frame into a channel
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: Sender<Frame>,
}

impl ChannelTransport {
    /// Create the transport and the receiving end of its frames
    pub fn new() -> (Self, Receiver<Frame>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: &[u8], network_id: &str) -> Result<()> {
        self.tx
            .send(Frame {
                network_id: network_id.to_string(),
                data: Bytes::copy_from_slice(frame),
            })
            .map_err(|_| DpaError::Transport("frame channel closed".to_string()))
    }
}
