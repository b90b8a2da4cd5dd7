//! Argument and result values
//!
//! Typed payloads carried by requests and responses. Each structured type
//! knows its own byte layout; the mapping table decides where it goes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{DpaError, Result};
use crate::timing::{FrcResponseTime, TrSeries};

/// Argument or decoded result of a DPA call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Void,
    Bool(bool),
    U8(u8),
    U16(u16),
    Bytes(Vec<u8>),
    /// Set of node addresses (bitmap on the wire)
    Nodes(BTreeSet<u8>),

    // --- Coordinator ---
    AddressingInfo(AddressingInfo),
    BondedNode(BondedNode),
    DiscoveryParams(DiscoveryParams),

    // --- OS / exploration ---
    OsInfo(OsInfo),
    Enumeration(PeripheralEnumeration),
    PeripheralInfo(Vec<PeripheralInfo>),

    // --- Peripherals ---
    Temperature(Temperature),
    PwmParams(PwmParams),
    IoCommands(Vec<IoCommand>),

    // --- FRC ---
    FrcCommand(FrcCommand),
    FrcSelectiveCommand(FrcSelectiveCommand),
    FrcData(FrcData),
    FrcConfiguration(FrcResponseTime),
}

impl Value {
    /// Short type name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::Bytes(_) => "bytes",
            Value::Nodes(_) => "nodes",
            Value::AddressingInfo(_) => "addressing info",
            Value::BondedNode(_) => "bonded node",
            Value::DiscoveryParams(_) => "discovery params",
            Value::OsInfo(_) => "os info",
            Value::Enumeration(_) => "enumeration",
            Value::PeripheralInfo(_) => "peripheral info",
            Value::Temperature(_) => "temperature",
            Value::PwmParams(_) => "pwm params",
            Value::IoCommands(_) => "io commands",
            Value::FrcCommand(_) => "frc command",
            Value::FrcSelectiveCommand(_) => "frc selective command",
            Value::FrcData(_) => "frc data",
            Value::FrcConfiguration(_) => "frc configuration",
        }
    }
}

/// Checks that `data` holds at least `len` bytes
pub(crate) fn require(data: &[u8], len: usize, what: &str) -> Result<()> {
    if data.len() < len {
        return Err(DpaError::Decoding(format!(
            "{}: expected {} bytes, got {}",
            what,
            len,
            data.len()
        )));
    }
    Ok(())
}

// =============================================================================
// Node bitmaps
// =============================================================================

/// Decode a node bitmap (bit n of byte n/8 = node n)
pub fn nodes_from_bitmap(bitmap: &[u8]) -> BTreeSet<u8> {
    let mut nodes = BTreeSet::new();
    for (byte_index, byte) in bitmap.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                let addr = byte_index * 8 + bit;
                if addr <= u8::MAX as usize {
                    nodes.insert(addr as u8);
                }
            }
        }
    }
    nodes
}

/// Encode a node set into a bitmap of `len` bytes
pub fn nodes_to_bitmap(nodes: &BTreeSet<u8>, len: usize) -> Result<Vec<u8>> {
    let mut bitmap = vec![0u8; len];
    for &addr in nodes {
        let index = addr as usize / 8;
        if index >= len {
            return Err(DpaError::Encoding(format!(
                "Node {} does not fit into a {}-byte bitmap",
                addr, len
            )));
        }
        bitmap[index] |= 1 << (addr % 8);
    }
    Ok(bitmap)
}

// =============================================================================
// Coordinator types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressingInfo {
    /// Number of bonded devices
    pub dev_nr: u8,
    /// Discovery id
    pub did: u8,
}

impl AddressingInfo {
    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, 2, "addressing info")?;
        Ok(Self { dev_nr: data[0], did: data[1] })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondedNode {
    pub address: u8,
    pub dev_nr: u8,
}

impl BondedNode {
    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, 2, "bonded node")?;
        Ok(Self { address: data[0], dev_nr: data[1] })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryParams {
    /// 0..=7
    pub tx_power: u8,
    pub max_addr: u8,
}

impl DiscoveryParams {
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.tx_power > 7 {
            return Err(DpaError::Encoding(format!(
                "TX power out of range: {}",
                self.tx_power
            )));
        }
        Ok(vec![self.tx_power, self.max_addr])
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, 2, "discovery params")?;
        Ok(Self { tx_power: data[0], max_addr: data[1] })
    }
}

// =============================================================================
// OS info
// =============================================================================

/// Transceiver module type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrType {
    Tr52D,
    Tr58DRj,
    Tr72D,
    Tr53D,
    Tr54D,
    Tr55D,
    Tr56D,
    Tr76D,
    Unknown(u8),
}

impl TrType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => TrType::Tr52D,
            1 => TrType::Tr58DRj,
            2 => TrType::Tr72D,
            3 => TrType::Tr53D,
            8 => TrType::Tr54D,
            9 => TrType::Tr55D,
            10 => TrType::Tr56D,
            11 => TrType::Tr76D,
            other => TrType::Unknown(other),
        }
    }

    pub fn series(self) -> TrSeries {
        match self {
            TrType::Tr72D | TrType::Tr76D => TrSeries::Tr72x,
            TrType::Unknown(_) => TrSeries::Unknown,
            _ => TrSeries::Tr52x,
        }
    }
}

/// Result of OS `read`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub module_id: u32,
    pub os_version: u8,
    pub tr_type: TrType,
    /// Bits 2..0 of the TR/MCU byte
    pub mcu_type: u8,
    pub os_build: u16,
    pub rssi: u8,
    pub supply_voltage: u8,
    pub flags: u8,
}

impl OsInfo {
    pub const LEN: usize = 11;

    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, Self::LEN, "os info")?;
        Ok(Self {
            module_id: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            os_version: data[4],
            tr_type: TrType::from_code(data[5] >> 4),
            mcu_type: data[5] & 0x07,
            os_build: u16::from_le_bytes([data[6], data[7]]),
            rssi: data[8],
            supply_voltage: data[9],
            flags: data[10],
        })
    }
}

// =============================================================================
// Peripheral exploration
// =============================================================================

/// Result of peripheral enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralEnumeration {
    pub dpa_version: u16,
    pub user_peripherals: u8,
    /// Embedded peripheral numbers present on the device
    pub embedded: BTreeSet<u8>,
    pub hw_profile: u16,
    pub hw_profile_version: u16,
    pub flags: u8,
    /// User peripheral numbers, offset by the first user peripheral
    pub user: BTreeSet<u8>,
}

impl PeripheralEnumeration {
    pub const MIN_LEN: usize = 12;

    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, Self::MIN_LEN, "peripheral enumeration")?;
        Ok(Self {
            dpa_version: u16::from_le_bytes([data[0], data[1]]),
            user_peripherals: data[2],
            embedded: nodes_from_bitmap(&data[3..7]),
            hw_profile: u16::from_le_bytes([data[7], data[8]]),
            hw_profile_version: u16::from_le_bytes([data[9], data[10]]),
            flags: data[11],
            user: nodes_from_bitmap(&data[12..])
                .into_iter()
                .filter_map(|n| n.checked_add(super::packet::pnum::USER_FIRST))
                .collect(),
        })
    }

    /// True if the network runs in STD RF mode
    pub fn is_std_mode(&self) -> bool {
        self.flags & 0x01 != 0
    }
}

/// Description of one peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralInfo {
    pub per_type: u8,
    pub extended_type: u8,
    pub par1: u8,
    pub par2: u8,
}

impl PeripheralInfo {
    pub fn decode_list(data: &[u8]) -> Result<Vec<Self>> {
        require(data, 4, "peripheral info")?;
        Ok(data
            .chunks_exact(4)
            .map(|c| Self { per_type: c[0], extended_type: c[1], par1: c[2], par2: c[3] })
            .collect())
    }
}

// =============================================================================
// Peripheral types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Temperature {
    /// Whole degrees Celsius
    pub integer: i8,
    /// 1/16 degree Celsius
    pub full: i16,
}

impl Temperature {
    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, 3, "temperature")?;
        Ok(Self {
            integer: data[0] as i8,
            full: i16::from_le_bytes([data[1], data[2]]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmParams {
    pub prescaler: u8,
    pub period: u8,
    pub duty: u8,
}

impl PwmParams {
    pub fn encode(&self) -> Vec<u8> {
        vec![self.prescaler, self.period, self.duty]
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, 3, "pwm params")?;
        Ok(Self { prescaler: data[0], period: data[1], duty: data[2] })
    }
}

/// One IO triplet: port, mask, value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoCommand {
    pub port: u8,
    pub mask: u8,
    pub value: u8,
}

impl IoCommand {
    pub fn encode_all(commands: &[IoCommand]) -> Result<Vec<u8>> {
        if commands.is_empty() {
            return Err(DpaError::Encoding("Empty IO command list".to_string()));
        }
        Ok(commands.iter().flat_map(|c| [c.port, c.mask, c.value]).collect())
    }

    pub fn decode_all(data: &[u8]) -> Result<Vec<Self>> {
        if data.is_empty() || data.len() % 3 != 0 {
            return Err(DpaError::Decoding(format!(
                "IO commands: length {} is not a multiple of 3",
                data.len()
            )));
        }
        Ok(data
            .chunks_exact(3)
            .map(|c| Self { port: c[0], mask: c[1], value: c[2] })
            .collect())
    }
}

// =============================================================================
// FRC types
// =============================================================================

/// Maximum user data length of an FRC command
pub const FRC_MAX_USER_DATA: usize = 30;

/// Selected-node bitmap length of a selective FRC command
pub const FRC_SELECTED_NODES_LEN: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrcCommand {
    pub id: u8,
    pub user_data: Vec<u8>,
}

impl FrcCommand {
    pub fn encode(&self) -> Result<Vec<u8>> {
        check_frc_user_data(&self.user_data)?;
        let mut out = Vec::with_capacity(1 + self.user_data.len());
        out.push(self.id);
        out.extend_from_slice(&self.user_data);
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, 1, "frc command")?;
        Ok(Self { id: data[0], user_data: data[1..].to_vec() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrcSelectiveCommand {
    pub id: u8,
    pub selected_nodes: BTreeSet<u8>,
    pub user_data: Vec<u8>,
}

impl FrcSelectiveCommand {
    pub fn encode(&self) -> Result<Vec<u8>> {
        check_frc_user_data(&self.user_data)?;
        let mut out = Vec::with_capacity(1 + FRC_SELECTED_NODES_LEN + self.user_data.len());
        out.push(self.id);
        out.extend(nodes_to_bitmap(&self.selected_nodes, FRC_SELECTED_NODES_LEN)?);
        out.extend_from_slice(&self.user_data);
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, 1 + FRC_SELECTED_NODES_LEN, "frc selective command")?;
        Ok(Self {
            id: data[0],
            selected_nodes: nodes_from_bitmap(&data[1..1 + FRC_SELECTED_NODES_LEN]),
            user_data: data[1 + FRC_SELECTED_NODES_LEN..].to_vec(),
        })
    }
}

fn check_frc_user_data(user_data: &[u8]) -> Result<()> {
    if user_data.len() > FRC_MAX_USER_DATA {
        return Err(DpaError::Encoding(format!(
            "FRC user data too long: {} bytes (max {})",
            user_data.len(),
            FRC_MAX_USER_DATA
        )));
    }
    Ok(())
}

/// Result of an FRC sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrcData {
    pub status: u8,
    pub data: Vec<u8>,
}

impl FrcData {
    pub fn decode(data: &[u8]) -> Result<Self> {
        require(data, 1, "frc data")?;
        Ok(Self { status: data[0], data: data[1..].to_vec() })
    }
}
