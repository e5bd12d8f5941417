//! Wire-level constants for the TNFS protocol: command bytes, command
//! classes, error codes, and the handful of magic numbers the dispatcher
//! and transport need (datagram size, handle-table capacities, protocol
//! version advertised on `MOUNT`).
//!
//! Values are taken from `original_source/tnfsd.py`, which in turn mirrors
//! the reference C `tnfsd` this spec distills.

use num_derive::FromPrimitive;

/// Maximum UDP datagram size, header included.
pub const MAXMSGSZ: usize = 532;
/// Size of the fixed request header (`sid`, `seq`, `cmd`).
pub const TNFS_HEADERSZ: usize = 4;
/// Largest response payload that still fits in [`MAXMSGSZ`] once the
/// response header (4 bytes) and status byte (1 byte) are accounted for.
pub const TNFS_MAX_PAYLOAD: usize = MAXMSGSZ - TNFS_HEADERSZ - 1;

/// File handle slots per session.
pub const MAX_FD_PER_CONN: usize = 16;
/// Directory handle slots per session.
pub const MAX_DHND_PER_CONN: usize = 8;
/// Live sessions allowed process-wide, by default.
pub const DEFAULT_MAX_SESSIONS: usize = 4_096;

/// Largest single READBLOCK/WRITEBLOCK transfer.
pub const MAX_IOSZ: usize = 512;

/// Longest path a client may pass to any `Vfs` call.
pub const MAX_PATH_LEN: usize = 1024;
/// Longest username/password/mountpoint string accepted on `MOUNT`.
pub const MAX_CRED_LEN: usize = 255;
/// Longest glob pattern accepted by `OPENDIRX`.
pub const MAX_PATTERN_LEN: usize = 255;

/// Protocol version advertised in the `MOUNT` success reply.
pub const PROTOVERSION_LSB: u8 = 0x02;
pub const PROTOVERSION_MSB: u8 = 0x01;

/// Recommended client retry timeout, in milliseconds, advertised on `MOUNT`.
pub const DEFAULT_RETRY_TIMEOUT_MS: u16 = 1_000;
/// Default idle-session timeout (6 hours), per spec §5.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 21_600;

/// Command-class nibble, occupying the top 4 bits of the command byte.
pub mod class {
    pub const SESSION: u8 = 0x0;
    pub const DIRECTORY: u8 = 0x1;
    pub const FILE: u8 = 0x2;

    /// Extracts the class nibble from a raw command byte.
    pub fn of(cmd: u8) -> u8 {
        cmd >> 4
    }
}

/// Directory entry flag bits (wire format of `DirectoryEntry`).
pub mod dirflags {
    pub const DIR: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SPECIAL: u8 = 0x04;
}

/// `READDIRX` status-flags bit: set when the cursor reached the end.
pub const DIRSTATUS_EOF: u8 = 0x01;

/// TNFS command bytes (spec §4.8). Discriminants are the literal wire
/// values, matching `original_source/tnfsd.py`'s `TNFS_CMD` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Command {
    Mount = 0x00,
    Umount = 0x01,

    OpenDir = 0x10,
    ReadDir = 0x11,
    CloseDir = 0x12,
    MkDir = 0x13,
    RmDir = 0x14,
    TellDir = 0x15,
    SeekDir = 0x16,
    OpenDirX = 0x17,
    ReadDirX = 0x18,

    OpenFileOld = 0x20,
    ReadBlock = 0x21,
    WriteBlock = 0x22,
    CloseFile = 0x23,
    StatFile = 0x24,
    SeekFile = 0x25,
    UnlinkFile = 0x26,
    ChmodFile = 0x27,
    RenameFile = 0x28,
    OpenFile = 0x29,
}

impl Command {
    pub fn from_u8(cmd: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(cmd)
    }
}

/// TNFS wire error codes (spec §6). `Success` (0x00) is never placed in a
/// response's payload; it is only ever a status byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ErrorCode {
    Success = 0x00,
    Eperm = 0x01,
    Enoent = 0x02,
    Eio = 0x03,
    Ebadf = 0x06,
    Eagain = 0x07,
    Eacces = 0x09,
    Eexist = 0x0B,
    Enotdir = 0x0C,
    Eisdir = 0x0D,
    Einval = 0x0E,
    Emfile = 0x10,
    Enospc = 0x12,
    Enosys = 0x16,
    Enotempty = 0x17,
    Eof = 0x21,
}

impl From<crate::vfs::VfsError> for ErrorCode {
    fn from(e: crate::vfs::VfsError) -> Self {
        use crate::vfs::VfsError;
        match e {
            VfsError::NotFound => ErrorCode::Enoent,
            VfsError::PermissionDenied => ErrorCode::Eacces,
            VfsError::Exists => ErrorCode::Eexist,
            VfsError::NotDirectory => ErrorCode::Enotdir,
            VfsError::IsDirectory => ErrorCode::Eisdir,
            VfsError::NotEmpty => ErrorCode::Enotempty,
            VfsError::InvalidArgument => ErrorCode::Einval,
            VfsError::Io => ErrorCode::Eio,
        }
    }
}
