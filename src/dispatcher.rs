//! Per-command request handling.
//!
//! One method per TNFS command (spec §4.8/§4.9), each parsing its own
//! payload and returning a complete response frame. [`Dispatcher::dispatch`]
//! is the only entry point the transport loop calls: header decode,
//! session resolution, reply-cache lookup, command routing, and
//! reply-cache update all happen there, in that order, matching spec §4.7.

use std::io::Cursor;
use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::codec::{self, header::Header, primitive};
use crate::dir_cursor::DirectoryCursor;
use crate::path_jail;
use crate::proto::{self, Command, ErrorCode};
use crate::session::{SessionManager, TransportKind};
use crate::vfs::{OpenFlags, Vfs, Whence};

fn ok_response(header: Header, payload: &[u8]) -> Vec<u8> {
    codec::encode_response(&header, ErrorCode::Success as u8, payload)
}

fn err_response(header: Header, code: ErrorCode) -> Vec<u8> {
    codec::encode_response(&header, code as u8, &[])
}

fn parse_open_flags(bits: u16) -> OpenFlags {
    let access = bits & 0x0003;
    OpenFlags {
        read: access == 0x0001 || access == 0x0003,
        write: access == 0x0002 || access == 0x0003,
        append: bits & 0x0008 != 0,
        create: bits & 0x0100 != 0,
        truncate: bits & 0x0200 != 0,
        exclusive: bits & 0x0400 != 0,
    }
}

pub struct Dispatcher {
    export_root: PathBuf,
    vfs: Box<dyn Vfs>,
    sessions: SessionManager,
    retry_timeout_ms: u16,
}

impl Dispatcher {
    pub fn new(
        export_root: PathBuf,
        vfs: Box<dyn Vfs>,
        max_sessions: usize,
        idle_timeout: std::time::Duration,
        retry_timeout_ms: u16,
    ) -> Self {
        Self {
            export_root,
            vfs,
            sessions: SessionManager::new(max_sessions, idle_timeout),
            retry_timeout_ms,
        }
    }

    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        self.sessions.sweep_expired(now).len()
    }

    fn jail(&self, path: &str) -> Result<PathBuf, ErrorCode> {
        path_jail::jail(&self.export_root, path)
    }

    /// Handles one incoming datagram, returning the bytes to send back
    /// (if any — directory/file commands with no matching session are
    /// dropped silently, per spec §4.8's closing note).
    pub fn dispatch(
        &mut self,
        raw: &[u8],
        addr: SocketAddrV4,
        transport: TransportKind,
    ) -> Option<Vec<u8>> {
        let header = match Header::decode(raw) {
            Ok(h) => h,
            Err(_) => {
                warn!(%addr, "malformed header, dropping");
                return None;
            }
        };
        let payload = &raw[codec::HEADER_LEN..];

        if header.cmd == Command::Mount as u8 {
            return Some(self.handle_mount(header, payload, addr, transport));
        }

        if header.sid == 0 || !self.sessions.contains(header.sid) {
            debug!(sid = header.sid, cmd = header.cmd, "no session, dropping");
            return None;
        }
        self.sessions.touch(header.sid);

        if let Some(cached) = self
            .sessions
            .get(header.sid)
            .and_then(|s| s.reply_cache.lookup(header.seq))
        {
            debug!(sid = header.sid, seq = header.seq, "replying from cache");
            return Some(cached.to_vec());
        }

        let response = match Command::from_u8(header.cmd) {
            Some(Command::Umount) => self.handle_umount(header),
            Some(Command::OpenDir) => self.handle_opendir(header, payload),
            Some(Command::ReadDir) => self.handle_readdir(header, payload),
            Some(Command::CloseDir) => self.handle_closedir(header, payload),
            Some(Command::MkDir) => self.handle_mkdir(header, payload),
            Some(Command::RmDir) => self.handle_rmdir(header, payload),
            Some(Command::TellDir) => self.handle_telldir(header, payload),
            Some(Command::SeekDir) => self.handle_seekdir(header, payload),
            Some(Command::OpenDirX) => self.handle_opendirx(header, payload),
            Some(Command::ReadDirX) => self.handle_readdirx(header, payload),
            Some(Command::OpenFileOld) => self.handle_openfile_old(header, payload),
            Some(Command::OpenFile) => self.handle_openfile(header, payload),
            Some(Command::ReadBlock) => self.handle_readblock(header, payload),
            Some(Command::WriteBlock) => self.handle_writeblock(header, payload),
            Some(Command::CloseFile) => self.handle_closefile(header, payload),
            Some(Command::StatFile) => self.handle_statfile(header, payload),
            Some(Command::SeekFile) => self.handle_seekfile(header, payload),
            Some(Command::UnlinkFile) => self.handle_unlinkfile(header, payload),
            Some(Command::ChmodFile) => self.handle_chmodfile(header, payload),
            Some(Command::RenameFile) => self.handle_renamefile(header, payload),
            Some(Command::Mount) | None => {
                warn!(cmd = header.cmd, "unrecognized command");
                err_response(header, ErrorCode::Enosys)
            }
        };

        if let Some(session) = self.sessions.get_mut(header.sid) {
            session.reply_cache.store(header.seq, response.clone());
        }
        Some(response)
    }

    // ---- session class ----

    fn handle_mount(
        &mut self,
        header: Header,
        payload: &[u8],
        addr: SocketAddrV4,
        transport: TransportKind,
    ) -> Vec<u8> {
        let mut cur = Cursor::new(payload);
        let parsed = (|| -> codec::Result<(u16, String, String, String)> {
            let version = primitive::u16(&mut cur)?;
            let mountpoint = primitive::nul_string(&mut cur, proto::MAX_PATH_LEN)?;
            let user = primitive::nul_string(&mut cur, proto::MAX_CRED_LEN)?;
            let password = primitive::nul_string(&mut cur, proto::MAX_CRED_LEN)?;
            Ok((version, mountpoint, user, password))
        })();

        let (_version, mountpoint, _user, _password) = match parsed {
            Ok(v) => v,
            Err(e) => {
                warn!(?e, %addr, "malformed MOUNT payload");
                return codec::encode_response(
                    &Header { sid: 0, ..header },
                    ErrorCode::Einval as u8,
                    &[],
                );
            }
        };

        match self.sessions.create(addr, transport, mountpoint) {
            Ok(session) => {
                let sid = session.sid;
                info!(sid, %addr, "session created");
                let mut resp = Vec::with_capacity(4);
                resp.push(proto::PROTOVERSION_LSB);
                resp.push(proto::PROTOVERSION_MSB);
                resp.extend_from_slice(&self.retry_timeout_ms.to_le_bytes());
                codec::encode_response(
                    &Header {
                        sid,
                        seq: header.seq,
                        cmd: header.cmd,
                    },
                    ErrorCode::Success as u8,
                    &resp,
                )
            }
            Err(code) => {
                warn!(%addr, ?code, "MOUNT refused");
                codec::encode_response(&Header { sid: 0, ..header }, code as u8, &[])
            }
        }
    }

    fn handle_umount(&mut self, header: Header) -> Vec<u8> {
        info!(sid = header.sid, "session destroyed");
        self.sessions.destroy(header.sid);
        codec::encode_response(&Header { sid: 0, ..header }, ErrorCode::Success as u8, &[])
    }

    // ---- directory class ----

    fn handle_opendir(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let mut cur = Cursor::new(payload);
        let path = match primitive::nul_string(&mut cur, proto::MAX_PATH_LEN) {
            Ok(p) => p,
            Err(_) => return err_response(header, ErrorCode::Einval),
        };
        let full = match self.jail(&path) {
            Ok(p) => p,
            Err(code) => return err_response(header, code),
        };
        match self.vfs.stat(&full) {
            Ok(meta) if !meta.is_dir => return err_response(header, ErrorCode::Enoent),
            Err(e) => return err_response(header, e.into()),
            Ok(_) => {}
        }
        let cursor = match DirectoryCursor::open(self.vfs.as_ref(), &full) {
            Ok(c) => c,
            Err(e) => return err_response(header, e.into()),
        };
        let session = self.sessions.get_mut(header.sid).expect("session resolved");
        match session.dirs.alloc(cursor) {
            Some(handle) => ok_response(header, &[handle]),
            None => err_response(header, ErrorCode::Emfile),
        }
    }

    fn handle_readdir(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let Some(&handle) = payload.first() else {
            return err_response(header, ErrorCode::Einval);
        };
        let Some(session) = self.sessions.get_mut(header.sid) else {
            return err_response(header, ErrorCode::Enoent);
        };
        let Some(cursor) = session.dirs.get_mut(handle) else {
            return err_response(header, ErrorCode::Ebadf);
        };
        match cursor.next_name() {
            Some(name) => {
                let mut body = name.into_bytes();
                body.push(0);
                ok_response(header, &body)
            }
            None => err_response(header, ErrorCode::Eof),
        }
    }

    fn handle_closedir(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let Some(&handle) = payload.first() else {
            return err_response(header, ErrorCode::Einval);
        };
        let Some(session) = self.sessions.get_mut(header.sid) else {
            return err_response(header, ErrorCode::Enoent);
        };
        match session.dirs.free(handle) {
            Some(_) => ok_response(header, &[]),
            None => err_response(header, ErrorCode::Ebadf),
        }
    }

    fn handle_mkdir(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let mut cur = Cursor::new(payload);
        let path = match primitive::nul_string(&mut cur, proto::MAX_PATH_LEN) {
            Ok(p) => p,
            Err(_) => return err_response(header, ErrorCode::Einval),
        };
        let full = match self.jail(&path) {
            Ok(p) => p,
            Err(code) => return err_response(header, code),
        };
        match self.vfs.mkdir(&full) {
            Ok(()) => ok_response(header, &[]),
            Err(e) => err_response(header, e.into()),
        }
    }

    fn handle_rmdir(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let mut cur = Cursor::new(payload);
        let path = match primitive::nul_string(&mut cur, proto::MAX_PATH_LEN) {
            Ok(p) => p,
            Err(_) => return err_response(header, ErrorCode::Einval),
        };
        let full = match self.jail(&path) {
            Ok(p) => p,
            Err(code) => return err_response(header, code),
        };
        match self.vfs.rmdir(&full) {
            Ok(()) => ok_response(header, &[]),
            Err(e) => err_response(header, e.into()),
        }
    }

    fn handle_telldir(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let Some(&handle) = payload.first() else {
            return err_response(header, ErrorCode::Einval);
        };
        let Some(session) = self.sessions.get_mut(header.sid) else {
            return err_response(header, ErrorCode::Enoent);
        };
        let Some(cursor) = session.dirs.get(handle) else {
            return err_response(header, ErrorCode::Ebadf);
        };
        ok_response(header, &cursor.tell().to_le_bytes())
    }

    fn handle_seekdir(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        if payload.len() < 5 {
            return err_response(header, ErrorCode::Einval);
        }
        let handle = payload[0];
        let pos = u32::from_le_bytes(payload[1..5].try_into().unwrap());
        let Some(session) = self.sessions.get_mut(header.sid) else {
            return err_response(header, ErrorCode::Enoent);
        };
        let Some(cursor) = session.dirs.get_mut(handle) else {
            return err_response(header, ErrorCode::Ebadf);
        };
        cursor.seek(pos);
        ok_response(header, &[])
    }

    fn handle_opendirx(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let mut cur = Cursor::new(payload);
        let parsed = (|| -> codec::Result<(u16, String, String)> {
            let _dir_opts = primitive::u8(&mut cur)?;
            let _sort_opts = primitive::u8(&mut cur)?;
            let max_results = primitive::u16(&mut cur)?;
            let pattern = primitive::nul_string(&mut cur, proto::MAX_PATTERN_LEN)?;
            let path = primitive::nul_string(&mut cur, proto::MAX_PATH_LEN)?;
            Ok((max_results, pattern, path))
        })();
        let (max_results, pattern, path) = match parsed {
            Ok(v) => v,
            Err(_) => return err_response(header, ErrorCode::Einval),
        };
        let full = match self.jail(&path) {
            Ok(p) => p,
            Err(code) => return err_response(header, code),
        };
        match self.vfs.stat(&full) {
            Ok(meta) if !meta.is_dir => return err_response(header, ErrorCode::Enoent),
            Err(e) => return err_response(header, e.into()),
            Ok(_) => {}
        }
        let cursor =
            match DirectoryCursor::open_extended(self.vfs.as_ref(), &full, &pattern, max_results) {
                Ok(c) => c,
                Err(e) => return err_response(header, e.into()),
            };
        let count = cursor.len() as u16;
        let session = self.sessions.get_mut(header.sid).expect("session resolved");
        match session.dirs.alloc(cursor) {
            Some(handle) => {
                let mut body = vec![handle];
                body.extend_from_slice(&count.to_le_bytes());
                ok_response(header, &body)
            }
            None => err_response(header, ErrorCode::Emfile),
        }
    }

    fn handle_readdirx(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        if payload.len() < 2 {
            return err_response(header, ErrorCode::Einval);
        }
        let handle = payload[0];
        let requested = payload[1];
        let Some(session) = self.sessions.get_mut(header.sid) else {
            return err_response(header, ErrorCode::Enoent);
        };
        let Some(cursor) = session.dirs.get_mut(handle) else {
            return err_response(header, ErrorCode::Ebadf);
        };

        let start_pos = cursor.tell();
        let mut count = 0u8;
        let mut body = Vec::new();
        const PREAMBLE: usize = 4; // count:1, eof:1, start_pos:2
        loop {
            if requested != 0 && count >= requested {
                break;
            }
            let Some(entry) = cursor.peek() else { break };
            let entry_size = 1 + 4 + 4 + 4 + entry.name.len() + 1;
            if PREAMBLE + body.len() + entry_size > proto::TNFS_MAX_PAYLOAD {
                break;
            }
            let entry = cursor.advance().expect("peeked entry must still be there");
            body.push(entry.meta.wire_flags());
            body.extend_from_slice(&entry.meta.size_u32().to_le_bytes());
            body.extend_from_slice(&entry.meta.mtime.to_le_bytes());
            body.extend_from_slice(&entry.meta.ctime.to_le_bytes());
            body.extend_from_slice(entry.name.as_bytes());
            body.push(0);
            count += 1;
        }
        let eof = cursor.is_done();

        let mut resp = Vec::with_capacity(PREAMBLE + body.len());
        resp.push(count);
        resp.push(if eof { proto::DIRSTATUS_EOF } else { 0 });
        resp.extend_from_slice(&(start_pos as u16).to_le_bytes());
        resp.extend_from_slice(&body);
        ok_response(header, &resp)
    }

    // ---- file class ----

    fn handle_openfile(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let mut cur = Cursor::new(payload);
        let parsed = (|| -> codec::Result<(u16, u16, String)> {
            let flags = primitive::u16(&mut cur)?;
            let mode = primitive::u16(&mut cur)?;
            let path = primitive::nul_string(&mut cur, proto::MAX_PATH_LEN)?;
            Ok((flags, mode, path))
        })();
        let (flags, mode, path) = match parsed {
            Ok(v) => v,
            Err(_) => return err_response(header, ErrorCode::Einval),
        };
        let full = match self.jail(&path) {
            Ok(p) => p,
            Err(code) => return err_response(header, code),
        };
        match self
            .vfs
            .open(&full, parse_open_flags(flags), mode as u32)
        {
            Ok(file) => {
                let session = self.sessions.get_mut(header.sid).expect("session resolved");
                match session.files.alloc(file) {
                    Some(handle) => ok_response(header, &[handle]),
                    None => err_response(header, ErrorCode::Emfile),
                }
            }
            Err(e) => err_response(header, e.into()),
        }
    }

    /// Translates a legacy `OPENFILE_OLD` payload into the current
    /// `OPENFILE` shape, matching `tnfsd.py`'s `handle_openfile_old` bit
    /// shuffle exactly: old byte 0 carries the access-mode bits (bit 0
    /// maps through to the new APPEND bit), old byte 1 right-shifted by
    /// one becomes the new flags high byte, and the mode is hardcoded to
    /// `0o644`.
    fn handle_openfile_old(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        if payload.len() < 3 {
            return err_response(header, ErrorCode::Einval);
        }
        let lo = payload[0];
        let hi = payload[1];
        let new_lo = if hi & 0x01 != 0 { lo & 0x08 } else { lo };
        let new_hi = (hi >> 1) & 0xFF;

        let mut translated = Vec::with_capacity(4 + payload.len() - 2);
        translated.push(new_lo);
        translated.push(new_hi);
        translated.extend_from_slice(&0x01A4u16.to_le_bytes());
        translated.extend_from_slice(&payload[2..]);
        self.handle_openfile(header, &translated)
    }

    fn handle_readblock(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        if payload.len() < 3 {
            return err_response(header, ErrorCode::Einval);
        }
        let fd = payload[0];
        let requested = u16::from_le_bytes([payload[1], payload[2]]) as usize;
        let Some(session) = self.sessions.get_mut(header.sid) else {
            return err_response(header, ErrorCode::Enoent);
        };
        let Some(file) = session.files.get_mut(fd) else {
            return err_response(header, ErrorCode::Ebadf);
        };
        let to_read = requested.min(proto::MAX_IOSZ);
        match file.read(to_read) {
            // A zero-length read is still SUCCESS with an empty payload
            // (spec §7's EOF-taxonomy note and its READBLOCK scenario),
            // not an EOF status.
            Ok(data) => {
                let mut resp = Vec::with_capacity(2 + data.len());
                resp.extend_from_slice(&(data.len() as u16).to_le_bytes());
                resp.extend_from_slice(&data);
                ok_response(header, &resp)
            }
            Err(e) => err_response(header, e.into()),
        }
    }

    fn handle_writeblock(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        if payload.len() < 3 {
            return err_response(header, ErrorCode::Einval);
        }
        let fd = payload[0];
        let size = u16::from_le_bytes([payload[1], payload[2]]) as usize;
        if payload.len() < 3 + size {
            return err_response(header, ErrorCode::Einval);
        }
        let data = &payload[3..3 + size];
        let Some(session) = self.sessions.get_mut(header.sid) else {
            return err_response(header, ErrorCode::Enoent);
        };
        let Some(file) = session.files.get_mut(fd) else {
            return err_response(header, ErrorCode::Ebadf);
        };
        match file.write(data) {
            Ok(written) => ok_response(header, &written.to_le_bytes()),
            Err(e) => err_response(header, e.into()),
        }
    }

    fn handle_closefile(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let Some(&fd) = payload.first() else {
            return err_response(header, ErrorCode::Einval);
        };
        let Some(session) = self.sessions.get_mut(header.sid) else {
            return err_response(header, ErrorCode::Enoent);
        };
        match session.files.free(fd) {
            Some(_) => ok_response(header, &[]),
            None => err_response(header, ErrorCode::Ebadf),
        }
    }

    fn handle_statfile(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let mut cur = Cursor::new(payload);
        let path = match primitive::nul_string(&mut cur, proto::MAX_PATH_LEN) {
            Ok(p) => p,
            Err(_) => return err_response(header, ErrorCode::Einval),
        };
        let full = match self.jail(&path) {
            Ok(p) => p,
            Err(code) => return err_response(header, code),
        };
        match self.vfs.stat(&full) {
            Ok(meta) => {
                let mut resp = Vec::with_capacity(16);
                resp.extend_from_slice(&(meta.mode as u16).to_le_bytes());
                resp.extend_from_slice(&(meta.uid as u16).to_le_bytes());
                resp.extend_from_slice(&(meta.gid as u16).to_le_bytes());
                resp.extend_from_slice(&meta.size_u32().to_le_bytes());
                resp.extend_from_slice(&meta.atime.to_le_bytes());
                resp.extend_from_slice(&meta.mtime.to_le_bytes());
                resp.extend_from_slice(&meta.ctime.to_le_bytes());
                ok_response(header, &resp)
            }
            Err(e) => err_response(header, e.into()),
        }
    }

    fn handle_seekfile(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        if payload.len() < 6 {
            return err_response(header, ErrorCode::Einval);
        }
        let fd = payload[0];
        let whence = match payload[1] {
            0 => Whence::Set,
            1 => Whence::Cur,
            2 => Whence::End,
            _ => return err_response(header, ErrorCode::Einval),
        };
        // Wire field is `uint32 offset` (spec §4.8); for SET that is an
        // absolute position and must stay unsigned so offsets >= 2^31
        // aren't misread as negative. CUR/END offsets are relative and
        // keep the signed (two's-complement) reading.
        let raw = u32::from_le_bytes(payload[2..6].try_into().unwrap());
        let offset = match whence {
            Whence::Set => raw as i64,
            Whence::Cur | Whence::End => raw as i32 as i64,
        };
        let Some(session) = self.sessions.get_mut(header.sid) else {
            return err_response(header, ErrorCode::Enoent);
        };
        let Some(file) = session.files.get_mut(fd) else {
            return err_response(header, ErrorCode::Ebadf);
        };
        match file.seek(whence, offset) {
            Ok(pos) => ok_response(header, &pos.to_le_bytes()),
            Err(e) => err_response(header, e.into()),
        }
    }

    fn handle_unlinkfile(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let mut cur = Cursor::new(payload);
        let path = match primitive::nul_string(&mut cur, proto::MAX_PATH_LEN) {
            Ok(p) => p,
            Err(_) => return err_response(header, ErrorCode::Einval),
        };
        let full = match self.jail(&path) {
            Ok(p) => p,
            Err(code) => return err_response(header, code),
        };
        match self.vfs.unlink(&full) {
            Ok(()) => ok_response(header, &[]),
            Err(e) => err_response(header, e.into()),
        }
    }

    /// `original_source`'s non-standard `ENOTSUP` becomes `ENOSYS`, per
    /// spec §9's resolution of that open question.
    fn handle_chmodfile(&mut self, header: Header, _payload: &[u8]) -> Vec<u8> {
        err_response(header, ErrorCode::Enosys)
    }

    fn handle_renamefile(&mut self, header: Header, payload: &[u8]) -> Vec<u8> {
        let mut cur = Cursor::new(payload);
        let parsed = (|| -> codec::Result<(String, String)> {
            let from = primitive::nul_string(&mut cur, proto::MAX_PATH_LEN)?;
            let to = primitive::nul_string(&mut cur, proto::MAX_PATH_LEN)?;
            Ok((from, to))
        })();
        let (from, to) = match parsed {
            Ok(v) => v,
            Err(_) => return err_response(header, ErrorCode::Einval),
        };
        let full_from = match self.jail(&from) {
            Ok(p) => p,
            Err(code) => return err_response(header, code),
        };
        let full_to = match self.jail(&to) {
            Ok(p) => p,
            Err(code) => return err_response(header, code),
        };
        match self.vfs.rename(&full_from, &full_to) {
            Ok(()) => ok_response(header, &[]),
            Err(e) => err_response(header, e.into()),
        }
    }
}
