//! The event loop: one UDP socket, one TCP listener, one `tokio::select!`.
//!
//! Spec §5 calls for a single-threaded cooperative loop rather than the
//! teacher's multi-task `ReadTask`/`VfsTask`/`StreamWriter` pipeline —
//! TNFS datagrams are small and self-contained, there's no pipelining to
//! stage across tasks, and VFS calls are explicitly allowed to block this
//! loop. Run under a `current_thread` runtime (set up in `main`), this
//! keeps the dispatcher free of any synchronization primitives: it is
//! only ever touched from here, one packet at a time.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::proto::MAXMSGSZ;
use crate::session::TransportKind;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run(mut dispatcher: Dispatcher, port: u16) -> io::Result<()> {
    let udp = UdpSocket::bind(("0.0.0.0", port)).await?;
    let tcp = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "tnfsd listening");

    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    let mut buf = [0u8; MAXMSGSZ];

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                let evicted = dispatcher.sweep_expired(Instant::now());
                if evicted > 0 {
                    info!(count = evicted, "evicted idle sessions");
                }
            }
            recv = udp.recv_from(&mut buf) => {
                match recv {
                    Ok((n, SocketAddr::V4(addr))) => {
                        if let Some(resp) = dispatcher.dispatch(&buf[..n], addr, TransportKind::Udp) {
                            if let Err(e) = udp.send_to(&resp, addr).await {
                                error!(error = %e, %addr, "udp send failed");
                            }
                        }
                    }
                    Ok((_, SocketAddr::V6(addr))) => {
                        warn!(%addr, "ignoring ipv6 datagram, TNFS is v4-only here");
                    }
                    Err(e) => error!(error = %e, "udp recv failed"),
                }
            }
            accepted = tcp.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "tcp connection accepted (framing only, no session handling)");
                        tokio::spawn(drain_tcp_connection(stream));
                    }
                    Err(e) => error!(error = %e, "tcp accept failed"),
                }
            }
        }
    }
}

/// Reads length-prefixed frames off an accepted TCP connection and
/// discards them. Full TCP session handling is out of scope (spec
/// §4.9/§9 call it future work, matching `original_source`'s own
/// `# TODO: Implement TCP handling`); this only avoids silently dropping
/// the connection.
async fn drain_tcp_connection(mut stream: TcpStream) {
    let mut len_buf = [0u8; 2];
    loop {
        if stream.read_exact(&mut len_buf).await.is_err() {
            break;
        }
        let len = u16::from_le_bytes(len_buf) as usize;
        let mut msg = vec![0u8; len];
        if stream.read_exact(&mut msg).await.is_err() {
            break;
        }
        debug!(len, "discarded framed tcp message");
    }
}
