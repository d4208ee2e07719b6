//! # Link Configuration Module
//!
//! Typed configuration for one radio link. The transport core consumes
//! already-validated values; this module is where they are deserialized,
//! defaulted and range-checked.
//!
//! ## Configuration File Format
//!
//! ```toml
//! name = "dstar0"
//! mode = "full"
//! port = "/dev/ttyACM0"
//! speed = 9600
//! databits = 8
//! parity = "none"   # also accepts "n", "e", "o"
//! stopbits = 1
//!
//! [tuning]
//! turnaround_ms = 100
//! receive_idle_ms = 100
//! max_pending_sends = 32
//! ```
//!
//! Every field except `port` has a default matching the radios this was
//! written against (9600 baud 8N1). The `[tuning]` table is optional and
//! rarely needs touching; see [`LinkTuning`].
//!
//! ## Modes
//!
//! The `mode` value is policy for the host mesh stack's forwarding logic.
//! The transport stores and reports it but never branches on it.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::dstar::errors::LinkError;

/// Forwarding mode assigned to this interface by the host mesh stack.
/// Opaque to the transport; stored and reported, never interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceMode {
    #[default]
    Full,
    Gateway,
    AccessPoint,
    Roaming,
    Boundary,
}

impl fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterfaceMode::Full => "full",
            InterfaceMode::Gateway => "gateway",
            InterfaceMode::AccessPoint => "access_point",
            InterfaceMode::Roaming => "roaming",
            InterfaceMode::Boundary => "boundary",
        };
        f.write_str(s)
    }
}

impl FromStr for InterfaceMode {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(InterfaceMode::Full),
            "gateway" => Ok(InterfaceMode::Gateway),
            "access_point" => Ok(InterfaceMode::AccessPoint),
            "roaming" => Ok(InterfaceMode::Roaming),
            "boundary" => Ok(InterfaceMode::Boundary),
            other => Err(LinkError::Config(format!("unknown mode '{}'", other))),
        }
    }
}

/// Serial parity. Accepts both the full word and the single-letter form
/// radio documentation tends to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    #[serde(alias = "n")]
    None,
    #[serde(alias = "e")]
    Even,
    #[serde(alias = "o")]
    Odd,
}

/// Configuration for one serial-attached radio link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Display label, used as the log prefix for this link.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub mode: InterfaceMode,
    /// Serial device path, e.g. `/dev/ttyACM0`.
    pub port: String,
    /// Baud rate of the radio's data port.
    #[serde(default = "default_speed")]
    pub speed: u32,
    #[serde(default = "default_databits")]
    pub databits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stopbits")]
    pub stopbits: u8,
    #[serde(default)]
    pub tuning: LinkTuning,
}

fn default_name() -> String {
    "dstar0".to_string()
}
fn default_speed() -> u32 {
    9600
}
fn default_databits() -> u8 {
    8
}
fn default_stopbits() -> u8 {
    1
}

/// Link timing and queue tuning. Defaults suit a 9600 baud GMSK channel;
/// both ends of a link should run the same turnaround value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTuning {
    /// Wait after keying down before the channel counts as idle again (ms).
    #[serde(default = "default_turnaround_ms")]
    pub turnaround_ms: u64,
    /// Quiet window after which a stalled inbound frame is abandoned (ms).
    #[serde(default = "default_receive_idle_ms")]
    pub receive_idle_ms: u64,
    /// Pending send queue bound; beyond it `send()` fails with `Backpressure`.
    #[serde(default = "default_max_pending_sends")]
    pub max_pending_sends: usize,
    /// Supervisor loop tick period (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// First reconnect delay after a link failure (ms).
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    /// Reconnect backoff ceiling (ms).
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    /// Consecutive open failures tolerated before the link is declared
    /// unrecoverable.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Settle time after the port opens before traffic is expected (ms).
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_turnaround_ms() -> u64 {
    100
}
fn default_receive_idle_ms() -> u64 {
    100
}
fn default_max_pending_sends() -> usize {
    32
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_reconnect_initial_ms() -> u64 {
    500
}
fn default_reconnect_cap_ms() -> u64 {
    30_000
}
fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_settle_ms() -> u64 {
    150
}

impl Default for LinkTuning {
    fn default() -> Self {
        Self {
            turnaround_ms: default_turnaround_ms(),
            receive_idle_ms: default_receive_idle_ms(),
            max_pending_sends: default_max_pending_sends(),
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl LinkConfig {
    /// Load and validate a configuration file.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, LinkError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| LinkError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: LinkConfig = toml::from_str(&content)
            .map_err(|e| LinkError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Range-check every field. Called by `load` and by the interface
    /// adapter before anything touches the port.
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.port.trim().is_empty() {
            return Err(LinkError::Config("no port specified".to_string()));
        }
        if self.speed == 0 {
            return Err(LinkError::Config("speed must be non-zero".to_string()));
        }
        if !(5..=8).contains(&self.databits) {
            return Err(LinkError::Config(format!(
                "databits must be 5-8, got {}",
                self.databits
            )));
        }
        if !matches!(self.stopbits, 1 | 2) {
            return Err(LinkError::Config(format!(
                "stopbits must be 1 or 2, got {}",
                self.stopbits
            )));
        }
        let t = &self.tuning;
        if t.poll_interval_ms == 0 {
            return Err(LinkError::Config("poll_interval_ms must be > 0".to_string()));
        }
        if t.max_pending_sends == 0 {
            return Err(LinkError::Config(
                "max_pending_sends must be > 0".to_string(),
            ));
        }
        if t.max_reconnect_attempts == 0 {
            return Err(LinkError::Config(
                "max_reconnect_attempts must be > 0".to_string(),
            ));
        }
        if t.reconnect_cap_ms < t.reconnect_initial_ms {
            return Err(LinkError::Config(
                "reconnect_cap_ms must be >= reconnect_initial_ms".to_string(),
            ));
        }
        Ok(())
    }
}
