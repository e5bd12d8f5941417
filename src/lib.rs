//! tnfsd — a TNFS (The Network File System) daemon.
//!
//! TNFS is a lightweight filesystem protocol for 8-bit client machines,
//! carried over UDP with an optional TCP fallback. This crate implements
//! the server side: a single-threaded event loop dispatching fixed-size
//! datagrams against a jailed view of one exported directory.

pub mod codec;
pub mod config;
pub mod dir_cursor;
pub mod dispatcher;
pub mod handle_table;
pub mod path_jail;
pub mod proto;
pub mod reply_cache;
pub mod session;
pub mod transport;
pub mod vfs;
