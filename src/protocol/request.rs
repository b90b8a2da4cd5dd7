//! Call request definitions

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::packet::NodeAddress;
use super::types::Value;

/// Device interface (peripheral) addressed by a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceInterface {
    Coordinator,
    Node,
    Os,
    Eeprom,
    Eeeprom,
    Ram,
    Ledr,
    Ledg,
    Spi,
    Io,
    Thermometer,
    Pwm,
    Uart,
    Frc,
    /// Device exploration (enumeration, peripheral info)
    PeripheralInfo,
}

impl DeviceInterface {
    pub const ALL: [DeviceInterface; 15] = [
        DeviceInterface::Coordinator,
        DeviceInterface::Node,
        DeviceInterface::Os,
        DeviceInterface::Eeprom,
        DeviceInterface::Eeeprom,
        DeviceInterface::Ram,
        DeviceInterface::Ledr,
        DeviceInterface::Ledg,
        DeviceInterface::Spi,
        DeviceInterface::Io,
        DeviceInterface::Thermometer,
        DeviceInterface::Pwm,
        DeviceInterface::Uart,
        DeviceInterface::Frc,
        DeviceInterface::PeripheralInfo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DeviceInterface::Coordinator => "coordinator",
            DeviceInterface::Node => "node",
            DeviceInterface::Os => "os",
            DeviceInterface::Eeprom => "eeprom",
            DeviceInterface::Eeeprom => "eeeprom",
            DeviceInterface::Ram => "ram",
            DeviceInterface::Ledr => "ledr",
            DeviceInterface::Ledg => "ledg",
            DeviceInterface::Spi => "spi",
            DeviceInterface::Io => "io",
            DeviceInterface::Thermometer => "thermometer",
            DeviceInterface::Pwm => "pwm",
            DeviceInterface::Uart => "uart",
            DeviceInterface::Frc => "frc",
            DeviceInterface::PeripheralInfo => "peripheral_info",
        }
    }
}

impl std::fmt::Display for DeviceInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DeviceInterface {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|iface| iface.name() == lower)
            .ok_or_else(|| format!("unknown device interface: {}", s))
    }
}

/// Identifier assigned to a request when it is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A call of one method on one device interface of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub network_id: String,
    pub node: NodeAddress,
    pub interface: DeviceInterface,
    pub method: String,
    pub args: Vec<Value>,
    pub hw_profile: u16,
    /// Caller-supplied processing time; exempts the call from protocol timing
    pub processing_time: Option<Duration>,
}

impl CallRequest {
    /// HW profile matching any device
    pub const HWPID_ANY: u16 = 0xFFFF;

    pub fn new(
        network_id: impl Into<String>,
        node: NodeAddress,
        interface: DeviceInterface,
        method: impl Into<String>,
    ) -> Self {
        Self {
            network_id: network_id.into(),
            node,
            interface,
            method: method.into(),
            args: Vec::new(),
            hw_profile: Self::HWPID_ANY,
            processing_time: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_arg(mut self, arg: Value) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_hw_profile(mut self, hw_profile: u16) -> Self {
        self.hw_profile = hw_profile;
        self
    }

    pub fn with_processing_time(mut self, time: Duration) -> Self {
        self.processing_time = Some(time);
        self
    }

    /// Same target, interface and method: a response to one may answer the other
    pub fn same_shape(&self, network_id: &str, node: NodeAddress, interface: DeviceInterface, method: &str) -> bool {
        self.network_id == network_id
            && self.node == node
            && self.interface == interface
            && self.method == method
    }

    /// Same call including arguments
    pub fn same_call(&self, other: &CallRequest) -> bool {
        self.same_shape(&other.network_id, other.node, other.interface, &other.method)
            && self.args == other.args
    }
}

impl std::fmt::Display for CallRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} on {} [{}]", self.interface, self.method, self.node, self.network_id)
    }
}
