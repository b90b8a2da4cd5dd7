//! Protocol Module
//!
//! DPA packet format and the typed call model on top of it.
//!
//! ## Frame Format
//!
//! ```text
//! ┌──────────┬────────┬────────┬──────────┬─────────────────────────────┐
//! │ NADR (2) │PNUM (1)│PCMD (1)│ HWPID (2)│ PDATA (0..56)               │
//! └──────────┴────────┴────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Response Codes (PDATA[0] of responses)
//! - 0x00: no error
//! - 0x01..=0x3F: error, payload discarded
//! - bit 7: asynchronous message
//! - 0xFF: confirmation
//!
//! ## Layers
//! - `packet`: offsets, addresses, response codes, confirmation
//! - `types`: argument/result values
//! - `mapping`: per-peripheral descriptor tables
//! - `codec`: encode/decode driven by the tables

mod packet;
mod types;
mod request;
mod response;
mod mapping;
mod codec;

pub use packet::{
    is_confirmation, nadr, pnum, Confirmation, Header, NodeAddress, ResponseCode,
    CONFIRMATION_CODE, HEADER_LEN, MAX_FRAME_LEN, MAX_PDATA_LEN, RESPONSE_DATA_OFFSET,
};
pub use types::{
    nodes_from_bitmap, nodes_to_bitmap, AddressingInfo, BondedNode, DiscoveryParams, FrcCommand,
    FrcData, FrcSelectiveCommand, IoCommand, OsInfo, PeripheralEnumeration, PeripheralInfo,
    PwmParams, Temperature, TrType, Value,
};
pub use request::{CallRequest, DeviceInterface, RequestId};
pub use response::{
    AdditionalInfo, AsyncMessage, CallResponse, DecodedResponse, Message, ResponseError,
};
pub use mapping::{
    ArgConverter, ArgSlot, InterfaceMapping, MethodMapping, PcmdSpec, ProtocolMapping,
    ResultConverter,
};
pub use codec::MessageCodec;
