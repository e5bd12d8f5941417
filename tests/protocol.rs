//! End-to-end scenarios driven straight against [`Dispatcher::dispatch`],
//! the same way `tests/shadow_fs/common.rs` built a `Fixture` around a
//! real temp directory rather than mocking the filesystem.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use tempfile::TempDir;

use tnfsd::dispatcher::Dispatcher;
use tnfsd::proto::{Command, ErrorCode};
use tnfsd::session::TransportKind;
use tnfsd::vfs::NativeFs;

struct Fixture {
    _dir: TempDir,
    dispatcher: Dispatcher,
    addr: SocketAddrV4,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let dispatcher = Dispatcher::new(
            root,
            Box::new(NativeFs::new()),
            4096,
            Duration::from_secs(21_600),
            1_000,
        );
        Self {
            _dir: dir,
            dispatcher,
            addr: SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 12345),
        }
    }

    fn root(&self) -> &std::path::Path {
        self._dir.path()
    }

    fn send(&mut self, sid: u16, seq: u8, cmd: Command, payload: &[u8]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(4 + payload.len());
        raw.extend_from_slice(&sid.to_le_bytes());
        raw.push(seq);
        raw.push(cmd as u8);
        raw.extend_from_slice(payload);
        self.dispatcher
            .dispatch(&raw, self.addr, TransportKind::Udp)
            .expect("expected a response")
    }

    fn mount(&mut self, seq: u8) -> (u16, Vec<u8>) {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0x0102u16.to_le_bytes());
        payload.push(0); // mountpoint
        payload.push(0); // user
        payload.push(0); // password
        let resp = self.send(0, seq, Command::Mount, &payload);
        let sid = u16::from_le_bytes([resp[0], resp[1]]);
        (sid, resp)
    }
}

fn nul_string(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}

#[test]
fn mount_returns_protocol_version_and_retry_timeout() {
    let mut fx = Fixture::new();
    let (sid, resp) = fx.mount(0);
    assert_ne!(sid, 0);
    assert_eq!(resp[4], ErrorCode::Success as u8);
    assert_eq!(&resp[5..9], &[0x02, 0x01, 0xE8, 0x03]);
}

#[test]
fn remount_from_same_address_reuses_a_fresh_session() {
    let mut fx = Fixture::new();
    let (first_sid, _) = fx.mount(0);
    let (second_sid, _) = fx.mount(1);
    assert_ne!(first_sid, second_sid);

    // the old session is gone: anything addressed to it is dropped.
    let mut raw = Vec::new();
    raw.extend_from_slice(&first_sid.to_le_bytes());
    raw.push(2);
    raw.push(Command::Umount as u8);
    assert!(fx
        .dispatcher
        .dispatch(&raw, fx.addr, TransportKind::Udp)
        .is_none());
}

#[test]
fn opendir_readdir_yields_dot_entries_then_eof() {
    let mut fx = Fixture::new();
    std::fs::write(fx.root().join("a.txt"), b"x").unwrap();
    let (sid, _) = fx.mount(0);

    let resp = fx.send(sid, 1, Command::OpenDir, &nul_string(""));
    assert_eq!(resp[4], ErrorCode::Success as u8);
    let handle = resp[5];

    let resp = fx.send(sid, 2, Command::ReadDir, &[handle]);
    assert_eq!(resp[4], ErrorCode::Success as u8);
    assert_eq!(&resp[5..7], b".\0");

    let resp = fx.send(sid, 3, Command::ReadDir, &[handle]);
    assert_eq!(&resp[5..8], b"..\0");

    let resp = fx.send(sid, 4, Command::ReadDir, &[handle]);
    assert_eq!(&resp[5..], b"a.txt\0");

    let resp = fx.send(sid, 5, Command::ReadDir, &[handle]);
    assert_eq!(resp[4], ErrorCode::Eof as u8);
}

#[test]
fn openfile_write_seek_read_round_trip() {
    let mut fx = Fixture::new();
    let (sid, _) = fx.mount(0);

    let mut open_payload = Vec::new();
    open_payload.extend_from_slice(&0x0103u16.to_le_bytes()); // read+write, create
    open_payload.extend_from_slice(&0x01A4u16.to_le_bytes()); // mode 0644
    open_payload.extend_from_slice(&nul_string("f.bin"));
    let resp = fx.send(sid, 1, Command::OpenFile, &open_payload);
    assert_eq!(resp[4], ErrorCode::Success as u8);
    let fd = resp[5];

    let mut write_payload = vec![fd];
    write_payload.extend_from_slice(&4u16.to_le_bytes());
    write_payload.extend_from_slice(b"abcd");
    let resp = fx.send(sid, 2, Command::WriteBlock, &write_payload);
    assert_eq!(resp[4], ErrorCode::Success as u8);
    assert_eq!(u32::from_le_bytes(resp[5..9].try_into().unwrap()), 4);

    let mut seek_payload = vec![fd, 0]; // SEEK_SET
    seek_payload.extend_from_slice(&0i32.to_le_bytes());
    let resp = fx.send(sid, 3, Command::SeekFile, &seek_payload);
    assert_eq!(resp[4], ErrorCode::Success as u8);

    let mut read_payload = vec![fd];
    read_payload.extend_from_slice(&512u16.to_le_bytes());
    let resp = fx.send(sid, 4, Command::ReadBlock, &read_payload);
    assert_eq!(resp[4], ErrorCode::Success as u8);
    let len = u16::from_le_bytes([resp[5], resp[6]]);
    assert_eq!(len, 4);
    assert_eq!(&resp[7..11], b"abcd");

    let resp = fx.send(sid, 5, Command::ReadBlock, &read_payload);
    assert_eq!(resp[4], ErrorCode::Success as u8);
    assert_eq!(u16::from_le_bytes([resp[5], resp[6]]), 0);
}

#[test]
fn path_escape_is_rejected() {
    let mut fx = Fixture::new();
    let (sid, _) = fx.mount(0);
    let resp = fx.send(sid, 1, Command::StatFile, &nul_string("../../etc/passwd"));
    assert_eq!(resp[4], ErrorCode::Enoent as u8);
}

#[test]
fn retransmitted_request_replays_cached_bytes_without_reexecuting() {
    let mut fx = Fixture::new();
    let (sid, _) = fx.mount(0);

    let resp1 = fx.send(sid, 1, Command::MkDir, &nul_string("once"));
    assert_eq!(resp1[4], ErrorCode::Success as u8);

    // a second MKDIR of the same directory would normally fail EEXIST;
    // retransmitting seq 1 must replay the original SUCCESS instead.
    let resp2 = fx.send(sid, 1, Command::MkDir, &nul_string("once"));
    assert_eq!(resp1, resp2);
}

#[test]
fn unmount_then_command_on_dead_session_is_dropped() {
    let mut fx = Fixture::new();
    let (sid, _) = fx.mount(0);
    let resp = fx.send(sid, 1, Command::Umount, &[]);
    assert_eq!(u16::from_le_bytes([resp[0], resp[1]]), 0);

    let mut raw = Vec::new();
    raw.extend_from_slice(&sid.to_le_bytes());
    raw.push(2);
    raw.push(Command::StatFile as u8);
    raw.extend_from_slice(&nul_string(""));
    assert!(fx
        .dispatcher
        .dispatch(&raw, fx.addr, TransportKind::Udp)
        .is_none());
}

#[test]
fn unlink_then_rmdir_then_stat_missing() {
    let mut fx = Fixture::new();
    let (sid, _) = fx.mount(0);

    fx.send(sid, 1, Command::MkDir, &nul_string("d"));
    std::fs::write(fx.root().join("d/f.txt"), b"x").unwrap();

    let resp = fx.send(sid, 2, Command::RmDir, &nul_string("d"));
    assert_eq!(resp[4], ErrorCode::Enotempty as u8);

    let resp = fx.send(sid, 3, Command::UnlinkFile, &nul_string("d/f.txt"));
    assert_eq!(resp[4], ErrorCode::Success as u8);

    let resp = fx.send(sid, 4, Command::RmDir, &nul_string("d"));
    assert_eq!(resp[4], ErrorCode::Success as u8);

    let resp = fx.send(sid, 5, Command::StatFile, &nul_string("d"));
    assert_eq!(resp[4], ErrorCode::Enoent as u8);
}

#[test]
fn chmodfile_is_enosys() {
    let mut fx = Fixture::new();
    let (sid, _) = fx.mount(0);
    let mut payload = vec![0u8, 0u8];
    payload.extend_from_slice(&nul_string("f.txt"));
    let resp = fx.send(sid, 1, Command::ChmodFile, &payload);
    assert_eq!(resp[4], ErrorCode::Enosys as u8);
}
