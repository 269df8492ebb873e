//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;

/// Daemon configuration. File: ~/.config/nearcast/config.toml or
/// /etc/nearcast/config.toml.
/// Env overrides: NEARCAST_PORT, NEARCAST_POLL_MS, NEARCAST_DISCOVERY_MS,
/// NEARCAST_STALL_POLLS, NEARCAST_DOWNLOAD_DIR.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// UDP port shared by every nearcast device (default 47333).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pause between loop iterations and outbound frames, in milliseconds
    /// (default 100). Doubles as the crude inter-packet rate limit.
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    /// How long to collect pong replies after a discovery ping (default 1500).
    #[serde(default = "default_discovery_ms")]
    pub discovery_ms: u64,
    /// Consecutive empty polls tolerated mid-transfer before giving up
    /// (default 20, about two seconds at the default poll pause).
    #[serde(default = "default_stall_polls")]
    pub stall_polls: u32,
    /// Directory received files land under (default "received").
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_port() -> u16 {
    47333
}
fn default_poll_ms() -> u64 {
    100
}
fn default_discovery_ms() -> u64 {
    1500
}
fn default_stall_polls() -> u32 {
    20
}
fn default_download_dir() -> PathBuf {
    PathBuf::from("received")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            poll_ms: default_poll_ms(),
            discovery_ms: default_discovery_ms(),
            stall_polls: default_stall_polls(),
            download_dir: default_download_dir(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("NEARCAST_PORT") {
        if let Ok(v) = s.parse::<u16>() {
            c.port = v;
        }
    }
    if let Ok(s) = std::env::var("NEARCAST_POLL_MS") {
        if let Ok(v) = s.parse::<u64>() {
            c.poll_ms = v;
        }
    }
    if let Ok(s) = std::env::var("NEARCAST_DISCOVERY_MS") {
        if let Ok(v) = s.parse::<u64>() {
            c.discovery_ms = v;
        }
    }
    if let Ok(s) = std::env::var("NEARCAST_STALL_POLLS") {
        if let Ok(v) = s.parse::<u32>() {
            c.stall_polls = v;
        }
    }
    if let Ok(s) = std::env::var("NEARCAST_DOWNLOAD_DIR") {
        if !s.is_empty() {
            c.download_dir = PathBuf::from(s);
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/nearcast/config.toml"));
    }
    out.push(PathBuf::from("/etc/nearcast/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}
