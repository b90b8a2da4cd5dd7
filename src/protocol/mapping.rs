//! Protocol mapping tables
//!
//! Static descriptors of the standard peripherals: for every
//! (device interface, method) pair the PNUM/PCMD bytes, the byte offset and
//! converter of each argument, the accepted response PCMD and the converter
//! of the result.
//!
//! ```text
//!   InterfaceMapping { interface, pnum }
//!        └── MethodMapping { name, pcmd, args: [ArgSlot { offset, converter }], result }
//! ```
//!
//! The codec walks these tables in both directions; nothing here touches
//! bytes directly except the converters themselves.

use crate::error::{DpaError, Result};
use crate::timing::FrcResponseTime;

use super::packet::{self, pnum, CMD_GET_PER_INFO, CMD_GET_PER_INFO_RESPONSE, PCMD_OFFSET, PDATA_OFFSET, PNUM_OFFSET, RESPONSE_FLAG};
use super::request::DeviceInterface;
use super::types::{
    nodes_from_bitmap, require, AddressingInfo, BondedNode, DiscoveryParams, FrcCommand, FrcData,
    FrcSelectiveCommand, IoCommand, OsInfo, PeripheralEnumeration, PeripheralInfo, PwmParams,
    Temperature, Value,
};

// =============================================================================
// Converters
// =============================================================================

/// Serializes one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgConverter {
    U8,
    /// Little-endian
    U16,
    /// 0 or 1
    Bool,
    FixedBytes(usize),
    /// Variable length, must be the last slot
    Bytes { max: usize },
    DiscoveryParams,
    PwmParams,
    IoCommands,
    FrcCommand,
    FrcSelectiveCommand,
    FrcConfiguration,
}

impl ArgConverter {
    /// Byte length of fixed-size converters
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            ArgConverter::U8 | ArgConverter::Bool | ArgConverter::FrcConfiguration => Some(1),
            ArgConverter::U16 | ArgConverter::DiscoveryParams => Some(2),
            ArgConverter::PwmParams => Some(3),
            ArgConverter::FixedBytes(len) => Some(*len),
            ArgConverter::Bytes { .. }
            | ArgConverter::IoCommands
            | ArgConverter::FrcCommand
            | ArgConverter::FrcSelectiveCommand => None,
        }
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        match (self, value) {
            (ArgConverter::U8, Value::U8(v)) => Ok(vec![*v]),
            (ArgConverter::U16, Value::U16(v)) => Ok(v.to_le_bytes().to_vec()),
            (ArgConverter::Bool, Value::Bool(v)) => Ok(vec![*v as u8]),
            (ArgConverter::FixedBytes(len), Value::Bytes(bytes)) => {
                if bytes.len() != *len {
                    return Err(DpaError::Encoding(format!(
                        "Expected exactly {} bytes, got {}",
                        len,
                        bytes.len()
                    )));
                }
                Ok(bytes.clone())
            }
            (ArgConverter::Bytes { max }, Value::Bytes(bytes)) => {
                if bytes.len() > *max {
                    return Err(DpaError::Encoding(format!(
                        "Byte array too long: {} bytes (max {})",
                        bytes.len(),
                        max
                    )));
                }
                Ok(bytes.clone())
            }
            (ArgConverter::DiscoveryParams, Value::DiscoveryParams(p)) => p.encode(),
            (ArgConverter::PwmParams, Value::PwmParams(p)) => Ok(p.encode()),
            (ArgConverter::IoCommands, Value::IoCommands(cmds)) => IoCommand::encode_all(cmds),
            (ArgConverter::FrcCommand, Value::FrcCommand(cmd)) => cmd.encode(),
            (ArgConverter::FrcSelectiveCommand, Value::FrcSelectiveCommand(cmd)) => cmd.encode(),
            (ArgConverter::FrcConfiguration, Value::FrcConfiguration(rt)) => Ok(vec![rt.bits()]),
            (converter, value) => Err(DpaError::Encoding(format!(
                "Cannot convert {} argument with {:?} converter",
                value.kind(),
                converter
            ))),
        }
    }

    /// Decode from exactly the bytes belonging to this slot
    pub fn decode(&self, data: &[u8]) -> Result<Value> {
        match self {
            ArgConverter::U8 => {
                require(data, 1, "u8 argument")?;
                Ok(Value::U8(data[0]))
            }
            ArgConverter::U16 => {
                require(data, 2, "u16 argument")?;
                Ok(Value::U16(u16::from_le_bytes([data[0], data[1]])))
            }
            ArgConverter::Bool => {
                require(data, 1, "bool argument")?;
                Ok(Value::Bool(data[0] != 0))
            }
            ArgConverter::FixedBytes(_) | ArgConverter::Bytes { .. } => Ok(Value::Bytes(data.to_vec())),
            ArgConverter::DiscoveryParams => Ok(Value::DiscoveryParams(DiscoveryParams::decode(data)?)),
            ArgConverter::PwmParams => Ok(Value::PwmParams(PwmParams::decode(data)?)),
            ArgConverter::IoCommands => Ok(Value::IoCommands(IoCommand::decode_all(data)?)),
            ArgConverter::FrcCommand => Ok(Value::FrcCommand(FrcCommand::decode(data)?)),
            ArgConverter::FrcSelectiveCommand => {
                Ok(Value::FrcSelectiveCommand(FrcSelectiveCommand::decode(data)?))
            }
            ArgConverter::FrcConfiguration => {
                require(data, 1, "frc configuration")?;
                Ok(Value::FrcConfiguration(FrcResponseTime::from_bits(data[0])))
            }
        }
    }
}

/// Deserializes the response data of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultConverter {
    Void,
    Bool,
    U8,
    U16,
    Bytes,
    /// 32-byte node bitmap
    Nodes,
    AddressingInfo,
    BondedNode,
    OsInfo,
    Enumeration,
    PeripheralInfo,
    Temperature,
    FrcData,
    FrcConfiguration,
}

impl ResultConverter {
    pub fn decode(&self, data: &[u8]) -> Result<Value> {
        Ok(match self {
            ResultConverter::Void => Value::Void,
            ResultConverter::Bool => {
                require(data, 1, "bool result")?;
                Value::Bool(data[0] != 0)
            }
            ResultConverter::U8 => {
                require(data, 1, "u8 result")?;
                Value::U8(data[0])
            }
            ResultConverter::U16 => {
                require(data, 2, "u16 result")?;
                Value::U16(u16::from_le_bytes([data[0], data[1]]))
            }
            ResultConverter::Bytes => Value::Bytes(data.to_vec()),
            ResultConverter::Nodes => {
                require(data, 32, "node bitmap")?;
                Value::Nodes(nodes_from_bitmap(&data[..32]))
            }
            ResultConverter::AddressingInfo => Value::AddressingInfo(AddressingInfo::decode(data)?),
            ResultConverter::BondedNode => Value::BondedNode(BondedNode::decode(data)?),
            ResultConverter::OsInfo => Value::OsInfo(OsInfo::decode(data)?),
            ResultConverter::Enumeration => Value::Enumeration(PeripheralEnumeration::decode(data)?),
            ResultConverter::PeripheralInfo => Value::PeripheralInfo(PeripheralInfo::decode_list(data)?),
            ResultConverter::Temperature => Value::Temperature(Temperature::decode(data)?),
            ResultConverter::FrcData => Value::FrcData(FrcData::decode(data)?),
            ResultConverter::FrcConfiguration => {
                require(data, 1, "frc configuration")?;
                Value::FrcConfiguration(FrcResponseTime::from_bits(data[0]))
            }
        })
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Position and converter of one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSlot {
    pub offset: usize,
    pub converter: ArgConverter,
}

/// Where the PCMD byte of a request comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmdSpec {
    Fixed(u8),
    /// Written by an argument at offset 3; lists the accepted values, empty = any
    FromArg(&'static [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodMapping {
    pub name: &'static str,
    /// Overrides the interface PNUM
    pub pnum: Option<u8>,
    pub pcmd: PcmdSpec,
    pub args: &'static [ArgSlot],
    pub result: ResultConverter,
}

impl MethodMapping {
    const fn new(name: &'static str, pcmd: u8, args: &'static [ArgSlot], result: ResultConverter) -> Self {
        Self { name, pnum: None, pcmd: PcmdSpec::Fixed(pcmd), args, result }
    }

    fn accepts_request_pcmd(&self, pcmd: u8) -> bool {
        match self.pcmd {
            PcmdSpec::Fixed(p) => p == pcmd,
            PcmdSpec::FromArg(values) => values.is_empty() || values.contains(&pcmd),
        }
    }

    fn accepts_response_pcmd(&self, pcmd: u8) -> bool {
        pcmd & RESPONSE_FLAG != 0 && self.accepts_request_pcmd(pcmd & !RESPONSE_FLAG)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceMapping {
    pub interface: DeviceInterface,
    /// None when every method supplies its own PNUM
    pub pnum: Option<u8>,
    pub methods: &'static [MethodMapping],
}

impl InterfaceMapping {
    pub fn method(&self, name: &str) -> Option<&'static MethodMapping> {
        self.methods.iter().find(|m| m.name == name)
    }
}

macro_rules! slot {
    ($offset:expr, $converter:expr) => {
        ArgSlot { offset: $offset, converter: $converter }
    };
}

const D: usize = PDATA_OFFSET;
const NO_ARGS: &[ArgSlot] = &[];
const DATA_MAX: usize = packet::MAX_PDATA_LEN;

// =============================================================================
// Standard peripherals
// =============================================================================

use ArgConverter as A;
use ResultConverter as R;

static COORDINATOR: &[MethodMapping] = &[
    MethodMapping::new("get_addr_info", 0x00, NO_ARGS, R::AddressingInfo),
    MethodMapping::new("get_discovered_nodes", 0x01, NO_ARGS, R::Nodes),
    MethodMapping::new("get_bonded_nodes", 0x02, NO_ARGS, R::Nodes),
    MethodMapping::new("clear_all_bonds", 0x03, NO_ARGS, R::Void),
    MethodMapping::new("bond_node", 0x04, &[slot!(D, A::U8), slot!(D + 1, A::U8)], R::BondedNode),
    MethodMapping::new("remove_bonded_node", 0x05, &[slot!(D, A::U8)], R::U8),
    MethodMapping::new("rebond_node", 0x06, &[slot!(D, A::U8)], R::U8),
    MethodMapping::new("run_discovery", 0x07, &[slot!(D, A::DiscoveryParams)], R::U8),
    MethodMapping::new("set_dpa_params", 0x08, &[slot!(D, A::U8)], R::U8),
    MethodMapping::new("set_hops", 0x09, &[slot!(D, A::FixedBytes(2))], R::Bytes),
    MethodMapping::new("discovery_data", 0x0A, &[slot!(D, A::U16)], R::Bytes),
    MethodMapping::new("backup", 0x0B, &[slot!(D, A::U8)], R::Bytes),
    MethodMapping::new("restore", 0x0C, &[slot!(D, A::Bytes { max: DATA_MAX })], R::Void),
    MethodMapping::new("authorize_bond", 0x0D, &[slot!(D, A::U8), slot!(D + 1, A::FixedBytes(4))], R::BondedNode),
    MethodMapping::new("read_remotely_bonded_module_id", 0x0F, NO_ARGS, R::Bytes),
    MethodMapping::new("clear_remotely_bonded_module_id", 0x10, NO_ARGS, R::Void),
    MethodMapping::new(
        "enable_remote_bonding",
        0x11,
        &[slot!(D, A::U8), slot!(D + 1, A::U8), slot!(D + 2, A::Bytes { max: DATA_MAX - 2 })],
        R::Void,
    ),
];

static NODE: &[MethodMapping] = &[
    MethodMapping::new("read", 0x00, NO_ARGS, R::Bytes),
    MethodMapping::new("remove_bond", 0x01, NO_ARGS, R::Void),
    MethodMapping::new("read_remotely_bonded_module_id", 0x02, NO_ARGS, R::Bytes),
    MethodMapping::new("clear_remotely_bonded_module_id", 0x03, NO_ARGS, R::Void),
    MethodMapping::new(
        "enable_remote_bonding",
        0x04,
        &[slot!(D, A::U8), slot!(D + 1, A::U8), slot!(D + 2, A::Bytes { max: DATA_MAX - 2 })],
        R::Void,
    ),
    MethodMapping::new("remove_bond_address", 0x05, NO_ARGS, R::Void),
    MethodMapping::new("backup", 0x06, &[slot!(D, A::U8)], R::Bytes),
    MethodMapping::new("restore", 0x07, &[slot!(D, A::Bytes { max: DATA_MAX })], R::Void),
];

static OS: &[MethodMapping] = &[
    MethodMapping::new("read", 0x00, NO_ARGS, R::OsInfo),
    MethodMapping::new("reset", 0x01, NO_ARGS, R::Void),
    MethodMapping::new("read_hwp_configuration", 0x02, NO_ARGS, R::Bytes),
    MethodMapping::new("run_rfpgm", 0x03, NO_ARGS, R::Void),
    MethodMapping::new("sleep", 0x04, &[slot!(D, A::U16), slot!(D + 2, A::U8)], R::Void),
    MethodMapping::new("batch", 0x05, &[slot!(D, A::Bytes { max: DATA_MAX })], R::Void),
    MethodMapping::new("restart", 0x08, NO_ARGS, R::Void),
];

static MEMORY: &[MethodMapping] = &[
    MethodMapping::new("read", 0x00, &[slot!(D, A::U8), slot!(D + 1, A::U8)], R::Bytes),
    MethodMapping::new("write", 0x01, &[slot!(D, A::U8), slot!(D + 1, A::Bytes { max: DATA_MAX - 1 })], R::Void),
];

static EEEPROM: &[MethodMapping] = &[
    MethodMapping::new("read", 0x00, &[slot!(D, A::U8), slot!(D + 1, A::U8)], R::Bytes),
    MethodMapping::new("write", 0x01, &[slot!(D, A::U8), slot!(D + 1, A::Bytes { max: DATA_MAX - 1 })], R::Void),
    MethodMapping::new("extended_read", 0x02, &[slot!(D, A::U16), slot!(D + 2, A::U8)], R::Bytes),
    MethodMapping::new(
        "extended_write",
        0x03,
        &[slot!(D, A::U16), slot!(D + 2, A::Bytes { max: DATA_MAX - 2 })],
        R::Void,
    ),
];

static LED: &[MethodMapping] = &[
    MethodMapping {
        name: "set",
        pnum: None,
        pcmd: PcmdSpec::FromArg(&[0x00, 0x01]),
        args: &[slot!(PCMD_OFFSET, A::Bool)],
        result: R::Void,
    },
    MethodMapping::new("get", 0x02, NO_ARGS, R::Bool),
    MethodMapping::new("pulse", 0x03, NO_ARGS, R::Void),
];

static SPI: &[MethodMapping] = &[MethodMapping::new(
    "write_read",
    0x00,
    &[slot!(D, A::U8), slot!(D + 1, A::Bytes { max: DATA_MAX - 1 })],
    R::Bytes,
)];

static IO: &[MethodMapping] = &[
    MethodMapping::new("set_direction", 0x00, &[slot!(D, A::IoCommands)], R::Void),
    MethodMapping::new("set", 0x01, &[slot!(D, A::IoCommands)], R::Void),
    MethodMapping::new("get", 0x02, NO_ARGS, R::Bytes),
];

static THERMOMETER: &[MethodMapping] = &[MethodMapping::new("get", 0x00, NO_ARGS, R::Temperature)];

static PWM: &[MethodMapping] = &[MethodMapping::new("set", 0x00, &[slot!(D, A::PwmParams)], R::Void)];

static UART: &[MethodMapping] = &[
    MethodMapping::new("open", 0x00, &[slot!(D, A::U8)], R::Void),
    MethodMapping::new("close", 0x01, NO_ARGS, R::Void),
    MethodMapping::new(
        "write_read",
        0x02,
        &[slot!(D, A::U8), slot!(D + 1, A::Bytes { max: DATA_MAX - 1 })],
        R::Bytes,
    ),
];

static FRC: &[MethodMapping] = &[
    MethodMapping::new("send", 0x00, &[slot!(D, A::FrcCommand)], R::FrcData),
    MethodMapping::new("extra_result", 0x01, NO_ARGS, R::Bytes),
    MethodMapping::new("send_selective", 0x02, &[slot!(D, A::FrcSelectiveCommand)], R::FrcData),
    MethodMapping::new("set_params", 0x03, &[slot!(D, A::FrcConfiguration)], R::FrcConfiguration),
];

static PERIPHERAL_INFO: &[MethodMapping] = &[
    MethodMapping {
        name: "enumeration",
        pnum: Some(pnum::EXPLORATION),
        pcmd: PcmdSpec::Fixed(CMD_GET_PER_INFO),
        args: NO_ARGS,
        result: R::Enumeration,
    },
    MethodMapping {
        name: "per_info",
        pnum: None,
        pcmd: PcmdSpec::Fixed(CMD_GET_PER_INFO),
        args: &[slot!(PNUM_OFFSET, A::U8)],
        result: R::PeripheralInfo,
    },
    MethodMapping {
        name: "more_per_info",
        pnum: Some(pnum::EXPLORATION),
        pcmd: PcmdSpec::FromArg(&[]),
        args: &[slot!(PCMD_OFFSET, A::U8)],
        result: R::PeripheralInfo,
    },
];

static STANDARD: &[InterfaceMapping] = &[
    InterfaceMapping { interface: DeviceInterface::Coordinator, pnum: Some(pnum::COORDINATOR), methods: COORDINATOR },
    InterfaceMapping { interface: DeviceInterface::Node, pnum: Some(pnum::NODE), methods: NODE },
    InterfaceMapping { interface: DeviceInterface::Os, pnum: Some(pnum::OS), methods: OS },
    InterfaceMapping { interface: DeviceInterface::Eeprom, pnum: Some(pnum::EEPROM), methods: MEMORY },
    InterfaceMapping { interface: DeviceInterface::Eeeprom, pnum: Some(pnum::EEEPROM), methods: EEEPROM },
    InterfaceMapping { interface: DeviceInterface::Ram, pnum: Some(pnum::RAM), methods: MEMORY },
    InterfaceMapping { interface: DeviceInterface::Ledr, pnum: Some(pnum::LEDR), methods: LED },
    InterfaceMapping { interface: DeviceInterface::Ledg, pnum: Some(pnum::LEDG), methods: LED },
    InterfaceMapping { interface: DeviceInterface::Spi, pnum: Some(pnum::SPI), methods: SPI },
    InterfaceMapping { interface: DeviceInterface::Io, pnum: Some(pnum::IO), methods: IO },
    InterfaceMapping { interface: DeviceInterface::Thermometer, pnum: Some(pnum::THERMOMETER), methods: THERMOMETER },
    InterfaceMapping { interface: DeviceInterface::Pwm, pnum: Some(pnum::PWM), methods: PWM },
    InterfaceMapping { interface: DeviceInterface::Uart, pnum: Some(pnum::UART), methods: UART },
    InterfaceMapping { interface: DeviceInterface::Frc, pnum: Some(pnum::FRC), methods: FRC },
    InterfaceMapping { interface: DeviceInterface::PeripheralInfo, pnum: None, methods: PERIPHERAL_INFO },
];

// =============================================================================
// Lookup
// =============================================================================

/// A set of interface descriptors with forward and reverse lookup
#[derive(Debug, Clone, Copy)]
pub struct ProtocolMapping {
    interfaces: &'static [InterfaceMapping],
}

impl Default for ProtocolMapping {
    fn default() -> Self {
        Self::standard()
    }
}

impl ProtocolMapping {
    /// Mapping of the standard DPA peripherals
    pub fn standard() -> Self {
        Self { interfaces: STANDARD }
    }

    pub fn interfaces(&self) -> &'static [InterfaceMapping] {
        self.interfaces
    }

    pub fn interface(&self, interface: DeviceInterface) -> Option<&'static InterfaceMapping> {
        self.interfaces.iter().find(|i| i.interface == interface)
    }

    pub fn method(&self, interface: DeviceInterface, name: &str) -> Option<&'static MethodMapping> {
        self.interface(interface)?.method(name)
    }

    /// Resolve a request frame's PNUM/PCMD to its interface and method
    pub fn resolve_request(&self, pnum: u8, pcmd: u8) -> Option<(DeviceInterface, &'static MethodMapping)> {
        if pcmd == CMD_GET_PER_INFO || pnum == pnum::EXPLORATION {
            let name = exploration_method(pnum, pcmd | RESPONSE_FLAG);
            return self.method(DeviceInterface::PeripheralInfo, name)
                .map(|m| (DeviceInterface::PeripheralInfo, m));
        }
        self.by_pnum(pnum, |m| m.accepts_request_pcmd(pcmd))
    }

    /// Resolve a response frame's PNUM/PCMD to its interface and method.
    ///
    /// PNUM 0xFF or PCMD 0xBF is device exploration regardless of the
    /// regular tables.
    pub fn resolve_response(&self, pnum: u8, pcmd: u8) -> Option<(DeviceInterface, &'static MethodMapping)> {
        if pcmd == CMD_GET_PER_INFO_RESPONSE || pnum == pnum::EXPLORATION {
            let name = exploration_method(pnum, pcmd);
            return self.method(DeviceInterface::PeripheralInfo, name)
                .map(|m| (DeviceInterface::PeripheralInfo, m));
        }
        self.by_pnum(pnum, |m| m.accepts_response_pcmd(pcmd))
    }

    fn by_pnum(
        &self,
        pnum: u8,
        accepts: impl Fn(&MethodMapping) -> bool,
    ) -> Option<(DeviceInterface, &'static MethodMapping)> {
        self.interfaces
            .iter()
            .filter(|i| i.pnum == Some(pnum))
            .find_map(|i| i.methods.iter().find(|m| accepts(m)).map(|m| (i.interface, m)))
    }
}

fn exploration_method(pnum: u8, response_pcmd: u8) -> &'static str {
    if pnum == pnum::EXPLORATION && response_pcmd == CMD_GET_PER_INFO_RESPONSE {
        "enumeration"
    } else if response_pcmd == CMD_GET_PER_INFO_RESPONSE {
        "per_info"
    } else {
        "more_per_info"
    }
}
