//! Little-endian primitive reading/writing for TNFS payloads.
//!
//! TNFS packets are single, small, already-complete datagrams (never a
//! byte stream), so unlike the XDR helpers these are modeled after, there
//! is no 4-byte alignment padding and nothing here needs to operate over
//! an arbitrary `Write` sink — every response is built directly into a
//! `Vec<u8>`.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use super::{CodecError, Result};

pub fn u8(src: &mut impl Read) -> Result<u8> {
    src.read_u8().map_err(|_| CodecError::PayloadTooShort)
}

pub fn u16(src: &mut impl Read) -> Result<u16> {
    src.read_u16::<LittleEndian>()
        .map_err(|_| CodecError::PayloadTooShort)
}

pub fn u32(src: &mut impl Read) -> Result<u32> {
    src.read_u32::<LittleEndian>()
        .map_err(|_| CodecError::PayloadTooShort)
}

/// Reads a NUL-terminated string, rejecting anything longer than
/// `max_len` bytes (not counting the terminator) or not valid UTF-8.
///
/// TNFS clients are 8-bit machines that don't speak UTF-8 natively, but
/// the wire bytes that matter for this server (paths under the export
/// root) are expected to be plain ASCII in practice; non-UTF-8 payloads
/// are rejected rather than lossily repaired.
pub fn nul_string(src: &mut impl Read, max_len: usize) -> Result<String> {
    let mut buf = Vec::new();
    loop {
        let b = u8(src)?;
        if b == 0 {
            break;
        }
        buf.push(b);
        if buf.len() > max_len {
            return Err(CodecError::StringTooLong);
        }
    }
    String::from_utf8(buf).map_err(|_| CodecError::NotUtf8)
}

pub fn write_u8(dst: &mut Vec<u8>, v: u8) {
    dst.push(v);
}

pub fn write_u16(dst: &mut Vec<u8>, v: u16) {
    dst.extend_from_slice(&v.to_le_bytes());
}

pub fn write_u32(dst: &mut Vec<u8>, v: u32) {
    dst.extend_from_slice(&v.to_le_bytes());
}

pub fn write_nul_string(dst: &mut Vec<u8>, s: &str) {
    dst.extend_from_slice(s.as_bytes());
    dst.push(0);
}
