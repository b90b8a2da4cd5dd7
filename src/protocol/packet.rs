//! DPA packet layout
//!
//! Fixed header offsets, peripheral numbers, node addresses, response codes
//! and the confirmation frame.
//!
//! ```text
//! ┌──────────┬────────┬────────┬──────────┬──────────────────────────────┐
//! │ NADR (2) │PNUM (1)│PCMD (1)│ HWPID (2)│ PDATA (0..56)                │
//! └──────────┴────────┴────────┴──────────┴──────────────────────────────┘
//!                                          │ response: RCODE, DPA value, data
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{DpaError, Result};

// =============================================================================
// Offsets
// =============================================================================

pub const NADR_OFFSET: usize = 0;
pub const PNUM_OFFSET: usize = 2;
pub const PCMD_OFFSET: usize = 3;
pub const HWPID_OFFSET: usize = 4;
pub const PDATA_OFFSET: usize = 6;

/// Response code position in responses and confirmations
pub const RCODE_OFFSET: usize = 6;
pub const DPA_VALUE_OFFSET: usize = 7;
/// First byte of response data
pub const RESPONSE_DATA_OFFSET: usize = 8;

/// Maximum number of PDATA bytes
pub const MAX_PDATA_LEN: usize = 56;

/// Header length (NADR + PNUM + PCMD + HWPID)
pub const HEADER_LEN: usize = PDATA_OFFSET;

/// Maximum total frame length
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PDATA_LEN;

/// Confirmation frame length (header + rcode + dpa value + hops + timeslot + hops response)
pub const CONFIRMATION_LEN: usize = 11;

// =============================================================================
// Peripheral numbers
// =============================================================================

pub mod pnum {
    pub const COORDINATOR: u8 = 0x00;
    pub const NODE: u8 = 0x01;
    pub const OS: u8 = 0x02;
    pub const EEPROM: u8 = 0x03;
    pub const EEEPROM: u8 = 0x04;
    pub const RAM: u8 = 0x05;
    pub const LEDR: u8 = 0x06;
    pub const LEDG: u8 = 0x07;
    pub const SPI: u8 = 0x08;
    pub const IO: u8 = 0x09;
    pub const THERMOMETER: u8 = 0x0A;
    pub const PWM: u8 = 0x0B;
    pub const UART: u8 = 0x0C;
    pub const FRC: u8 = 0x0D;

    pub const USER_FIRST: u8 = 0x20;
    pub const USER_LAST: u8 = 0x6F;

    /// Peripheral enumeration / "more peripherals" exploration
    pub const EXPLORATION: u8 = 0xFF;
}

/// Request command byte of peripheral information queries
pub const CMD_GET_PER_INFO: u8 = 0x3F;

/// Response command byte of peripheral information queries
pub const CMD_GET_PER_INFO_RESPONSE: u8 = 0xBF;

/// Bit set in every response PCMD
pub const RESPONSE_FLAG: u8 = 0x80;

// =============================================================================
// Node addresses
// =============================================================================

pub mod nadr {
    pub const COORDINATOR: u8 = 0x00;
    pub const NODE_FIRST: u8 = 0x01;
    pub const NODE_LAST: u8 = 0xEF;
    pub const LOCAL: u8 = 0xFC;
    pub const TEMPORARY: u8 = 0xFE;
    pub const BROADCAST: u8 = 0xFF;
}

/// Address of a device in an IQRF network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeAddress {
    Coordinator,
    Node(u8),
    Local,
    Temporary,
    Broadcast,
}

impl NodeAddress {
    /// Address byte as written into NADR
    pub fn to_byte(self) -> u8 {
        match self {
            NodeAddress::Coordinator => nadr::COORDINATOR,
            NodeAddress::Node(addr) => addr,
            NodeAddress::Local => nadr::LOCAL,
            NodeAddress::Temporary => nadr::TEMPORARY,
            NodeAddress::Broadcast => nadr::BROADCAST,
        }
    }

    pub fn from_byte(byte: u8) -> Self {
        match byte {
            nadr::COORDINATOR => NodeAddress::Coordinator,
            nadr::LOCAL => NodeAddress::Local,
            nadr::TEMPORARY => NodeAddress::Temporary,
            nadr::BROADCAST => NodeAddress::Broadcast,
            addr => NodeAddress::Node(addr),
        }
    }

    pub fn is_coordinator(self) -> bool {
        self == NodeAddress::Coordinator
    }

    pub fn is_broadcast(self) -> bool {
        self == NodeAddress::Broadcast
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeAddress::Coordinator => write!(f, "coordinator"),
            NodeAddress::Node(addr) => write!(f, "node {}", addr),
            NodeAddress::Local => write!(f, "local"),
            NodeAddress::Temporary => write!(f, "temporary"),
            NodeAddress::Broadcast => write!(f, "broadcast"),
        }
    }
}

// =============================================================================
// Response codes
// =============================================================================

/// Response code byte value of a confirmation
pub const CONFIRMATION_CODE: u8 = 0xFF;

/// Bit flagging an asynchronous (unsolicited) message
pub const ASYNC_FLAG: u8 = 0x80;

/// DPA response code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCode {
    NoError,
    Fail,
    Pcmd,
    Pnum,
    Addr,
    DataLen,
    Data,
    Hwpid,
    Nadr,
    IfaceCustomHandler,
    MissingCustomDpaHandler,
    /// User error codes 0x20..=0x3F
    User(u8),
    Other(u8),
}

impl ResponseCode {
    /// Parse the low 7 bits of a response code byte
    pub fn from_byte(byte: u8) -> Self {
        match byte & !ASYNC_FLAG {
            0 => ResponseCode::NoError,
            1 => ResponseCode::Fail,
            2 => ResponseCode::Pcmd,
            3 => ResponseCode::Pnum,
            4 => ResponseCode::Addr,
            5 => ResponseCode::DataLen,
            6 => ResponseCode::Data,
            7 => ResponseCode::Hwpid,
            8 => ResponseCode::Nadr,
            9 => ResponseCode::IfaceCustomHandler,
            10 => ResponseCode::MissingCustomDpaHandler,
            code @ 0x20..=0x3F => ResponseCode::User(code),
            code => ResponseCode::Other(code),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ResponseCode::NoError => 0,
            ResponseCode::Fail => 1,
            ResponseCode::Pcmd => 2,
            ResponseCode::Pnum => 3,
            ResponseCode::Addr => 4,
            ResponseCode::DataLen => 5,
            ResponseCode::Data => 6,
            ResponseCode::Hwpid => 7,
            ResponseCode::Nadr => 8,
            ResponseCode::IfaceCustomHandler => 9,
            ResponseCode::MissingCustomDpaHandler => 10,
            ResponseCode::User(code) | ResponseCode::Other(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ResponseCode::NoError
    }
}

// =============================================================================
// Header helpers
// =============================================================================

/// Fixed header fields of any DPA frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub node: NodeAddress,
    pub pnum: u8,
    pub pcmd: u8,
    pub hw_profile: u16,
}

impl Header {
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_LEN {
            return Err(DpaError::Decoding(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_LEN,
                frame.len()
            )));
        }

        Ok(Self {
            node: NodeAddress::from_byte(frame[NADR_OFFSET]),
            pnum: frame[PNUM_OFFSET],
            pcmd: frame[PCMD_OFFSET],
            hw_profile: u16::from_le_bytes([frame[HWPID_OFFSET], frame[HWPID_OFFSET + 1]]),
        })
    }
}

/// True if the frame carries the confirmation response code
pub fn is_confirmation(frame: &[u8]) -> bool {
    frame.len() > RCODE_OFFSET && frame[RCODE_OFFSET] == CONFIRMATION_CODE
}

// =============================================================================
// Confirmation
// =============================================================================

/// Routing metadata sent by the addressed node before its response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub dpa_value: u8,
    pub hops: u8,
    /// Timeslot length in 10 ms units
    pub timeslot_length: u8,
    pub hops_response: u8,
}

impl Confirmation {
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < CONFIRMATION_LEN {
            return Err(DpaError::Decoding(format!(
                "Confirmation too short: expected {} bytes, got {}",
                CONFIRMATION_LEN,
                frame.len()
            )));
        }
        if frame[RCODE_OFFSET] != CONFIRMATION_CODE {
            return Err(DpaError::Decoding(format!(
                "Not a confirmation: response code 0x{:02x}",
                frame[RCODE_OFFSET]
            )));
        }

        Ok(Self {
            dpa_value: frame[DPA_VALUE_OFFSET],
            hops: frame[8],
            timeslot_length: frame[9],
            hops_response: frame[10],
        })
    }

    /// Build a confirmation frame answering the given request header
    pub fn encode(&self, header: &Header) -> Vec<u8> {
        let mut frame = Vec::with_capacity(CONFIRMATION_LEN);
        frame.extend_from_slice(&(header.node.to_byte() as u16).to_le_bytes());
        frame.push(header.pnum);
        frame.push(header.pcmd);
        frame.extend_from_slice(&header.hw_profile.to_le_bytes());
        frame.push(CONFIRMATION_CODE);
        frame.push(self.dpa_value);
        frame.push(self.hops);
        frame.push(self.timeslot_length);
        frame.push(self.hops_response);
        frame
    }
}
