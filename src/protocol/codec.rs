//! Protocol codec
//!
//! Encoding and decoding between typed calls and DPA frames.
//!
//! ## Wire Format
//!
//! ### Request
//! ```text
//! ┌──────────┬────────┬────────┬──────────┬─────────────────────────────┐
//! │ NADR (2) │PNUM (1)│PCMD (1)│ HWPID (2)│ arguments at mapped offsets │
//! └──────────┴────────┴────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Response
//! ```text
//! ┌──────────┬────────┬──────────┬──────────┬─────────┬───────┬──────────┐
//! │ NADR (2) │PNUM (1)│PCMD|0x80 │ HWPID (2)│RCODE (1)│DPA (1)│ data ... │
//! └──────────┴────────┴──────────┴──────────┴─────────┴───────┴──────────┘
//! ```
//!
//! Any response code other than "no error" yields an error result and the
//! data bytes are not interpreted.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DpaError, Result};

use super::mapping::{MethodMapping, PcmdSpec, ProtocolMapping};
use super::packet::{
    Header, ResponseCode, ASYNC_FLAG, CONFIRMATION_CODE, DPA_VALUE_OFFSET, MAX_FRAME_LEN,
    RCODE_OFFSET, RESPONSE_DATA_OFFSET, RESPONSE_FLAG,
};
use super::request::CallRequest;
use super::response::{AdditionalInfo, DecodedResponse, ResponseError};
use super::types::Value;

/// Stateless encoder/decoder over a protocol mapping
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec {
    mapping: ProtocolMapping,
}

impl MessageCodec {
    pub fn new(mapping: ProtocolMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &ProtocolMapping {
        &self.mapping
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Encode a call request into a frame.
    ///
    /// Fails when no mapping exists for the (interface, method) pair, when the
    /// argument count differs from the mapping, or when an argument cannot be
    /// converted.
    pub fn encode(&self, request: &CallRequest) -> Result<Bytes> {
        let interface = self.mapping.interface(request.interface).ok_or_else(|| {
            DpaError::Encoding(format!("No mapping for interface {}", request.interface))
        })?;
        let method = interface.method(&request.method).ok_or_else(|| {
            DpaError::Encoding(format!(
                "No mapping for method {}.{}",
                request.interface, request.method
            ))
        })?;

        if request.args.len() != method.args.len() {
            return Err(DpaError::Encoding(format!(
                "{}.{} takes {} arguments, got {}",
                request.interface,
                request.method,
                method.args.len(),
                request.args.len()
            )));
        }

        let mut frame = BytesMut::with_capacity(MAX_FRAME_LEN);
        frame.put_u16_le(request.node.to_byte() as u16);
        frame.put_u8(method.pnum.or(interface.pnum).unwrap_or(0));
        frame.put_u8(match method.pcmd {
            PcmdSpec::Fixed(pcmd) => pcmd,
            PcmdSpec::FromArg(_) => 0,
        });
        frame.put_u16_le(request.hw_profile);

        for (slot, value) in method.args.iter().zip(&request.args) {
            let bytes = slot.converter.encode(value)?;
            write_at(&mut frame, slot.offset, &bytes);
        }

        if frame.len() > MAX_FRAME_LEN {
            return Err(DpaError::Encoding(format!(
                "Frame too long: {} bytes (max {})",
                frame.len(),
                MAX_FRAME_LEN
            )));
        }

        Ok(frame.freeze())
    }

    /// Decode a request frame back into a call request
    pub fn decode_request(&self, frame: &[u8], network_id: &str) -> Result<CallRequest> {
        let header = Header::parse(frame)?;
        let (interface, method) = self
            .mapping
            .resolve_request(header.pnum, header.pcmd)
            .ok_or_else(|| unknown_method(header.pnum, header.pcmd))?;

        let args = decode_args(method, frame)?;

        Ok(CallRequest::new(network_id, header.node, interface, method.name)
            .with_args(args)
            .with_hw_profile(header.hw_profile))
    }

    // =========================================================================
    // Responses
    // =========================================================================

    /// Decode a response (or asynchronous) frame.
    ///
    /// Confirmations are not responses and are rejected here.
    pub fn decode_response(&self, frame: &[u8]) -> Result<DecodedResponse> {
        let header = Header::parse(frame)?;
        if frame.len() < RESPONSE_DATA_OFFSET {
            return Err(DpaError::Decoding(format!(
                "Response too short: {} bytes",
                frame.len()
            )));
        }

        let rcode = frame[RCODE_OFFSET];
        if rcode == CONFIRMATION_CODE {
            return Err(DpaError::Decoding("Confirmation is not a response".to_string()));
        }

        let (interface, method) = self
            .mapping
            .resolve_response(header.pnum, header.pcmd)
            .ok_or_else(|| unknown_method(header.pnum, header.pcmd))?;

        let response_code = ResponseCode::from_byte(rcode);
        let result = if response_code.is_ok() {
            Ok(method.result.decode(&frame[RESPONSE_DATA_OFFSET..]).map_err(|e| {
                DpaError::Decoding(format!("{}.{} result: {}", interface, method.name, e))
            })?)
        } else {
            Err(ResponseError::Code(response_code))
        };

        Ok(DecodedResponse {
            node: header.node,
            interface,
            method: method.name,
            pnum: header.pnum,
            is_async: rcode & ASYNC_FLAG != 0,
            additional: AdditionalInfo {
                hw_profile: header.hw_profile,
                response_code,
                dpa_value: frame[DPA_VALUE_OFFSET],
            },
            result,
            frame_len: frame.len(),
        })
    }

    /// Build a response frame answering the given request frame
    pub fn encode_response(
        request_frame: &[u8],
        response_code: ResponseCode,
        dpa_value: u8,
        data: &[u8],
    ) -> Result<Bytes> {
        let header = Header::parse(request_frame)?;
        let mut frame = BytesMut::with_capacity(RESPONSE_DATA_OFFSET + data.len());
        frame.put_u16_le(header.node.to_byte() as u16);
        frame.put_u8(header.pnum);
        frame.put_u8(header.pcmd | RESPONSE_FLAG);
        frame.put_u16_le(header.hw_profile);
        frame.put_u8(response_code.to_byte());
        frame.put_u8(dpa_value);
        frame.put_slice(data);

        if frame.len() > MAX_FRAME_LEN {
            return Err(DpaError::Encoding(format!(
                "Response frame too long: {} bytes",
                frame.len()
            )));
        }
        Ok(frame.freeze())
    }
}

/// Write `bytes` at `offset`, growing the frame with zeros as needed
fn write_at(frame: &mut BytesMut, offset: usize, bytes: &[u8]) {
    let end = offset + bytes.len();
    if frame.len() < end {
        frame.resize(end, 0);
    }
    frame[offset..end].copy_from_slice(bytes);
}

fn decode_args(method: &MethodMapping, frame: &[u8]) -> Result<Vec<Value>> {
    let mut args = Vec::with_capacity(method.args.len());
    for slot in method.args {
        if slot.offset > frame.len() {
            return Err(DpaError::Decoding(format!(
                "{}: argument at offset {} missing",
                method.name, slot.offset
            )));
        }
        let data = match slot.converter.fixed_len() {
            Some(len) => frame.get(slot.offset..slot.offset + len).ok_or_else(|| {
                DpaError::Decoding(format!(
                    "{}: argument at offset {} truncated",
                    method.name, slot.offset
                ))
            })?,
            None => &frame[slot.offset..],
        };
        args.push(slot.converter.decode(data)?);
    }
    Ok(args)
}

fn unknown_method(pnum: u8, pcmd: u8) -> DpaError {
    DpaError::Decoding(format!(
        "Cannot resolve interface/method for PNUM 0x{:02x} PCMD 0x{:02x}",
        pnum, pcmd
    ))
}
