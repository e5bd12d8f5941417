//! CLI parsing and the optional TOML overlay.
//!
//! `clap`'s derive API matches spec §6's CLI exactly: a positional export
//! root, `-p/--port`, `-v/--verbose`. The `-c/--config` flag is this
//! implementation's own addition (spec §5's tunables — idle-session
//! timeout, retry hint, session cap — are otherwise hardcoded defaults);
//! it is ambient operator plumbing, not a protocol feature.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use crate::proto;

#[derive(Parser, Debug)]
#[command(name = "tnfsd", about = "TNFS (The Network File System) daemon")]
pub struct Cli {
    /// Directory to export as the TNFS root.
    pub root: PathBuf,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Raise the log level from info to debug.
    #[arg(short, long)]
    pub verbose: bool,

    /// Optional TOML file overriding session_timeout_secs, retry_timeout_ms,
    /// and max_sessions.
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

pub const DEFAULT_PORT: u16 = 16384;

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    session_timeout_secs: Option<u64>,
    retry_timeout_ms: Option<u16>,
    max_sessions: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub port: u16,
    pub session_timeout_secs: u64,
    pub retry_timeout_ms: u16,
    pub max_sessions: usize,
}

impl Config {
    pub fn load(cli: &Cli) -> io::Result<Self> {
        let file_cfg = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str::<FileConfig>(&text)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            }
            None => FileConfig::default(),
        };
        Ok(Self {
            root: cli.root.clone(),
            port: cli.port,
            session_timeout_secs: file_cfg
                .session_timeout_secs
                .unwrap_or(proto::DEFAULT_SESSION_TIMEOUT_SECS),
            retry_timeout_ms: file_cfg
                .retry_timeout_ms
                .unwrap_or(proto::DEFAULT_RETRY_TIMEOUT_MS),
            max_sessions: file_cfg.max_sessions.unwrap_or(proto::DEFAULT_MAX_SESSIONS),
        })
    }
}
