//! The fixed 4-byte request header, and response-frame assembly.
//!
//! Wire shape (little-endian throughout):
//! - request:  `[sid: u16][seq: u8][cmd: u8]`
//! - response: `[sid: u16][seq: u8][cmd: u8][status: u8]` followed by the
//!   command's payload.
//!
//! `original_source/tnfsd.py`'s `TNFSHeader` packs all four fields with
//! `struct.pack('<HBBB', sid, seqno, cmd, status)` but only *unpacks* the
//! first three (`'<HBB'`) on receipt — i.e. on the wire a request header
//! and a response header are the same 4 bytes, and `status` is purely an
//! extra byte appended when replying. That is the shape reproduced here.

use std::io::Cursor;

use super::primitive;
use super::{CodecError, Result};

pub const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub sid: u16,
    pub seq: u8,
    pub cmd: u8,
}

impl Header {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::MalformedHeader);
        }
        let mut cur = Cursor::new(bytes);
        let sid = primitive::u16(&mut cur)?;
        let seq = primitive::u8(&mut cur)?;
        let cmd = primitive::u8(&mut cur)?;
        Ok(Header { sid, seq, cmd })
    }

    /// Encodes just the 4-byte header, with no status byte or payload.
    /// Used by tests exercising [`Header::decode`] round-trip; real
    /// responses go through [`encode_response`].
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.sid.to_le_bytes());
        out[2] = self.seq;
        out[3] = self.cmd;
        out
    }
}

/// Builds a complete response frame: header, status byte, payload.
pub fn encode_response(header: &Header, status: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 1 + payload.len());
    out.extend_from_slice(&header.encode());
    out.push(status);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = Header {
            sid: 0xBEEF,
            seq: 7,
            cmd: 0x29,
        };
        assert_eq!(Header::decode(&h.encode()).unwrap(), h);
    }

    #[test]
    fn decode_rejects_short_buffers() {
        assert_eq!(Header::decode(&[1, 2, 3]), Err(CodecError::MalformedHeader));
    }

    #[test]
    fn encode_response_appends_status_then_payload() {
        let h = Header {
            sid: 1,
            seq: 2,
            cmd: 0x10,
        };
        let frame = encode_response(&h, 0x0E, &[0xAA, 0xBB]);
        assert_eq!(frame, vec![1, 0, 2, 0x10, 0x0E, 0xAA, 0xBB]);
    }
}
