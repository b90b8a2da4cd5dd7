//! Response and message definitions

use super::packet::{NodeAddress, ResponseCode};
use super::request::{DeviceInterface, RequestId};
use super::types::Value;

/// Why a call produced no result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseError {
    /// Device answered with an error response code
    Code(ResponseCode),
    /// No confirmation arrived in time
    ConfirmationTimeout,
    /// No response arrived in time
    ResponseTimeout,
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseError::Code(code) => write!(f, "response code {:?}", code),
            ResponseError::ConfirmationTimeout => f.write_str("Confirmation timeouted"),
            ResponseError::ResponseTimeout => f.write_str("Response timeouted"),
        }
    }
}

/// Header information of a received response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdditionalInfo {
    pub hw_profile: u16,
    pub response_code: ResponseCode,
    pub dpa_value: u8,
}

/// Response frame decoded by the codec, not yet correlated to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    pub node: NodeAddress,
    pub interface: DeviceInterface,
    pub method: &'static str,
    /// Peripheral number as found in the frame
    pub pnum: u8,
    /// Response code carried the asynchronous flag
    pub is_async: bool,
    pub additional: AdditionalInfo,
    pub result: Result<Value, ResponseError>,
    /// Length of the whole frame in bytes
    pub frame_len: usize,
}

/// Result of a call, delivered to the message listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResponse {
    pub request_id: RequestId,
    pub network_id: String,
    pub node: NodeAddress,
    pub interface: DeviceInterface,
    pub method: String,
    pub result: Result<Value, ResponseError>,
    /// Absent for locally synthesised responses
    pub additional: Option<AdditionalInfo>,
}

impl CallResponse {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Message sent by a device without a matching request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncMessage {
    pub network_id: String,
    pub node: NodeAddress,
    pub interface: DeviceInterface,
    /// Originating peripheral number
    pub peripheral: u8,
    pub method: &'static str,
    pub result: Result<Value, ResponseError>,
    pub additional: AdditionalInfo,
}

/// Anything delivered upward by the protocol layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Response(CallResponse),
    Async(AsyncMessage),
}
