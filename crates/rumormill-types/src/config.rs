//! Node configuration.
//!
//! [`AppConfig`] is assembled by the daemon binary from CLI flags and
//! handed to every subsystem through the node handle. Validation
//! happens once, at startup; a bad configuration is a fatal init
//! error.

use std::path::PathBuf;

use crate::{Result, RumormillError};

/// Default route-rumor broadcasting period in seconds.
pub const DEFAULT_RTIMER_SECS: u64 = 60;

/// Default proof-of-work difficulty in leading zero bits.
pub const DEFAULT_POW_DIFFICULTY: u32 = 16;

/// Hard cap on proof-of-work difficulty.
///
/// 24 bits is already several seconds of brute force on commodity
/// hardware; anything above is a misconfiguration.
pub const MAX_POW_DIFFICULTY: u32 = 24;

/// Runtime configuration of a rumormill node.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Bind address for the gossip UDP socket (`ip:port` or `:port`).
    pub gossip_addr: String,
    /// HTTP UI port; `None` disables the HTTP front-end.
    pub ui_port: Option<u16>,
    /// Initial peers (canonical `ip:port` strings).
    pub peers: Vec<String>,
    /// Seconds between route-rumor broadcasts.
    pub rtimer_secs: u64,
    /// Disables forwarding of everything except route rumors.
    pub no_forward: bool,
    /// Disables the direct-route override rule.
    pub disable_traversal: bool,
    /// Directory holding the keypair and the message database.
    pub data_dir: PathBuf,
    /// Proof-of-work difficulty in leading zero bits.
    pub pow_difficulty: u32,
}

impl AppConfig {
    /// Checks the configuration for fatal inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns [`RumormillError::ConfigError`] if the gossip address is
    /// empty, the data directory is empty, or the PoW difficulty
    /// exceeds [`MAX_POW_DIFFICULTY`].
    pub fn validate(&self) -> Result<()> {
        if self.gossip_addr.is_empty() {
            return Err(RumormillError::ConfigError {
                reason: "gossip address must not be empty (use \":PORT\" to \
                         listen on all interfaces)"
                    .into(),
            });
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(RumormillError::ConfigError {
                reason: "data directory must not be empty".into(),
            });
        }
        if self.pow_difficulty > MAX_POW_DIFFICULTY {
            return Err(RumormillError::ConfigError {
                reason: format!(
                    "PoW difficulty {} exceeds maximum {}",
                    self.pow_difficulty, MAX_POW_DIFFICULTY,
                ),
            });
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gossip_addr: String::new(),
            ui_port: None,
            peers: Vec::new(),
            rtimer_secs: DEFAULT_RTIMER_SECS,
            no_forward: false,
            disable_traversal: false,
            data_dir: PathBuf::new(),
            pow_difficulty: DEFAULT_POW_DIFFICULTY,
        }
    }
}
