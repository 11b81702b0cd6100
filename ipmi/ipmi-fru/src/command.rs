// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Storage NetFn commands for FRU inventory access.
//!
//! Offsets and counts on the wire are expressed in the device's addressing
//! unit: bytes, or 16-bit words when the inventory area advertises word
//! access. The shift between units is applied by the engine, not here.

use crate::{
    completion::Completion,
    error::{Error, Kind},
};
use arrayvec::ArrayVec;
use ipmi_codec::{DecoderBuffer, DecoderBufferResult, DecoderValue, EncoderBuffer};

/// Storage network function, host to device.
pub const NETFN_STORAGE: u8 = 0x0a;

pub const GET_FRU_INVENTORY_AREA_INFO: u8 = 0x10;
pub const READ_FRU_DATA: u8 = 0x11;
pub const WRITE_FRU_DATA: u8 = 0x12;

/// Longest request body the engine emits: a device id, a two-byte offset,
/// and a full write payload.
pub const MAX_REQUEST_LEN: usize = 19;

/// Upper bound on one `Write FRU Data` payload.
pub const MAX_WRITE_PAYLOAD: usize = 16;

/// A command as handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub netfn: u8,
    pub cmd: u8,
    pub data: ArrayVec<u8, MAX_REQUEST_LEN>,
}

impl Request {
    #[inline]
    pub fn new(netfn: u8, cmd: u8, body: &[u8]) -> Self {
        let mut data = ArrayVec::new();
        // bodies are engine-built; the largest is a full 16-byte write
        data.extend(body.iter().copied().take(MAX_REQUEST_LEN));
        debug_assert_eq!(data.len(), body.len());
        Self { netfn, cmd, data }
    }
}

/// A response as delivered by the transport: the completion code first,
/// then the command-specific body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
}

impl Response {
    #[inline]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[inline]
    pub fn completion(&self) -> Completion {
        self.data
            .first()
            .map_or(Completion::UNKNOWN, |&code| Completion(code))
    }

    /// The bytes after the completion code.
    #[inline]
    pub fn body(&self) -> &[u8] {
        self.data.get(1..).unwrap_or(&[])
    }
}

/// Builds a `Get FRU Inventory Area Info` request.
#[inline]
pub fn area_info(device_id: u8) -> Request {
    Request::new(NETFN_STORAGE, GET_FRU_INVENTORY_AREA_INFO, &[device_id])
}

/// Builds a `Read FRU Data` request. `offset` and `count` are in the
/// device's addressing unit.
#[inline]
pub fn read_data(device_id: u8, offset: u16, count: u8) -> Request {
    let mut body = [0u8; 4];
    let mut encoder = EncoderBuffer::new(&mut body);
    encoder.encode(&device_id);
    encoder.encode(&offset);
    encoder.encode(&count);
    Request::new(NETFN_STORAGE, READ_FRU_DATA, encoder.as_slice())
}

/// Builds a `Write FRU Data` request. `offset` is in the device's
/// addressing unit; the payload is always raw bytes.
#[inline]
pub fn write_data(device_id: u8, offset: u16, payload: &[u8]) -> Request {
    debug_assert!(payload.len() <= MAX_WRITE_PAYLOAD);
    let mut body = [0u8; MAX_REQUEST_LEN];
    let mut encoder = EncoderBuffer::new(&mut body);
    encoder.encode(&device_id);
    encoder.encode(&offset);
    encoder.encode(&payload);
    Request::new(NETFN_STORAGE, WRITE_FRU_DATA, encoder.as_slice())
}

/// Parsed `Get FRU Inventory Area Info` response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(bolero_generator::TypeGenerator))]
pub struct AreaInfo {
    /// Total inventory area size in bytes.
    pub size: u16,
    /// Offsets and counts on the wire are 16-bit words.
    pub access_by_words: bool,
}

impl AreaInfo {
    pub fn parse(body: &[u8]) -> Result<Self, Error> {
        let buffer = DecoderBuffer::new(body);
        let (info, _) = buffer.decode::<Self>().map_err(|_| Kind::Invalid.err())?;
        Ok(info)
    }

    pub fn encode(&self, encoder: &mut EncoderBuffer) {
        encoder.encode(&self.size);
        encoder.encode(&u8::from(self.access_by_words));
    }
}

impl<'a> DecoderValue<'a> for AreaInfo {
    #[inline]
    fn decode(buffer: DecoderBuffer<'a>) -> DecoderBufferResult<'a, Self> {
        let (size, buffer) = buffer.decode::<u16>()?;
        let (flags, buffer) = buffer.decode::<u8>()?;
        let info = Self {
            size,
            access_by_words: flags & 0x01 != 0,
        };
        Ok((info, buffer))
    }
}

/// Parsed `Read FRU Data` response body. `count` is in the device's
/// addressing unit; `data` is raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadResponse<'a> {
    pub count: u8,
    pub data: &'a [u8],
}

impl<'a> ReadResponse<'a> {
    pub fn parse(body: &'a [u8]) -> Result<Self, Error> {
        let buffer = DecoderBuffer::new(body);
        let (count, buffer) = buffer.decode::<u8>().map_err(|_| Kind::Invalid.err())?;
        Ok(Self {
            count,
            data: buffer.into_less_safe_slice(),
        })
    }
}

/// Parsed `Write FRU Data` response body. `count` is in the device's
/// addressing unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteResponse {
    pub count: u8,
}

impl WriteResponse {
    pub fn parse(body: &[u8]) -> Result<Self, Error> {
        let buffer = DecoderBuffer::new(body);
        let (count, _) = buffer.decode::<u8>().map_err(|_| Kind::Invalid.err())?;
        Ok(Self { count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_test() {
        let request = read_data(3, 0x1234, 32);
        assert_eq!(request.netfn, NETFN_STORAGE);
        assert_eq!(request.cmd, READ_FRU_DATA);
        assert_eq!(&request.data[..], &[3, 0x34, 0x12, 32]);
    }

    #[test]
    fn write_request_test() {
        let request = write_data(7, 0x0002, &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(request.cmd, WRITE_FRU_DATA);
        assert_eq!(&request.data[..], &[7, 0x02, 0x00, 0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn area_info_round_trip_test() {
        bolero::check!().with_type::<AreaInfo>().for_each(|info| {
            let mut bytes = [0u8; 3];
            let mut encoder = EncoderBuffer::new(&mut bytes);
            info.encode(&mut encoder);
            let decoded = AreaInfo::parse(encoder.as_slice()).unwrap();
            assert_eq!(&decoded, info);
        });
    }

    #[test]
    fn area_info_short_test() {
        assert!(AreaInfo::parse(&[40, 0]).is_err());
        assert!(AreaInfo::parse(&[]).is_err());
    }

    #[test]
    fn read_response_test() {
        let parsed = ReadResponse::parse(&[2, 0xaa, 0xbb]).unwrap();
        assert_eq!(parsed.count, 2);
        assert_eq!(parsed.data, &[0xaa, 0xbb]);
        assert!(ReadResponse::parse(&[]).is_err());
    }
}
