//! At-most-once retransmission support.
//!
//! `original_source/tnfsd.py` sets `session.lastmsg`/`session.lastseqno`
//! after every dispatch but never reads them back — the cache is written,
//! never consulted, so a retransmitted UDP request is simply re-executed.
//! Spec §4.7/§8 requires the consult-before-execute side explicitly
//! ("on receipt of a request whose sequence number equals the cached
//! value, resend the cached response bytes without re-executing"), so
//! this is the missing half of that mechanism.

pub struct ReplyCache {
    last_seq: Option<u8>,
    last_response: Vec<u8>,
}

impl ReplyCache {
    pub fn new() -> Self {
        Self {
            last_seq: None,
            last_response: Vec::new(),
        }
    }

    pub fn lookup(&self, seq: u8) -> Option<&[u8]> {
        if self.last_seq == Some(seq) {
            Some(&self.last_response)
        } else {
            None
        }
    }

    pub fn store(&mut self, seq: u8, response: Vec<u8>) {
        self.last_seq = Some(seq);
        self.last_response = response;
    }
}

impl Default for ReplyCache {
    fn default() -> Self {
        Self::new()
    }
}
