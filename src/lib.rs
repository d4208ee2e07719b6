//! # Dstarlink - D-star data channel transport for mesh networks
//!
//! Dstarlink turns the digital data channel of a D-star compatible GMSK
//! transceiver (Icom IC-705, ID-52 and similar, reached over their USB serial
//! port) into an MTU-bounded packet interface that a mesh routing stack can
//! drive like any other network interface: open, send, receive callback, close.
//!
//! ## Features
//!
//! - **Serial Transport**: Exclusive ownership of the radio's serial data port
//!   with configurable baud/data-bits/parity/stop-bits.
//! - **Frame Codec**: Delimited, length-checked, CRC-16 protected frames with
//!   resynchronization after stream corruption.
//! - **Duplex Arbitration**: Explicit half-duplex turn-taking with a
//!   configurable turnaround delay and receive-idle recovery, so outbound
//!   packets never collide with in-flight carrier.
//! - **Link Supervision**: One background task per link handling reads,
//!   dispatch, paced sends and bounded-backoff reconnects.
//! - **Async Design**: Built with Tokio; `send()` never blocks the host
//!   stack's event loop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dstarlink::config::LinkConfig;
//! use dstarlink::iface::DstarInterface;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load and validate link configuration
//!     let config = LinkConfig::load("dstar0.toml").await?;
//!
//!     // Create the interface and register the inbound packet callback
//!     let mut iface = DstarInterface::new(config)?;
//!     iface.set_receive_callback(|payload| {
//!         println!("inbound packet: {} bytes", payload.len());
//!     });
//!
//!     // Bring the link up and move some bytes
//!     iface.open().await?;
//!     iface.send(b"hello mesh")?;
//!     iface.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`iface`] - The mesh-stack facing interface adapter (open/close/send/callback)
//! - [`dstar`] - Serial transport, frame codec, duplex arbiter and link supervisor
//! - [`config`] - Configuration management and validation
//! - [`logutil`] - Helpers for logging binary link data safely
//! - [`metrics`] - Process-wide link counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Mesh Stack    │ ← routing, addressing (external)
//! └─────────────────┘
//!          │ send()/callback
//! ┌─────────────────┐
//! │ Interface       │ ← MTU gate, mode attribute, lifecycle
//! │ Adapter         │
//! └─────────────────┘
//!          │ queue/pace
//! ┌─────────────────┐
//! │ Duplex Arbiter  │ ← half-duplex state machine
//! │ + Frame Codec   │
//! └─────────────────┘
//!          │ bytes
//! ┌─────────────────┐
//! │ Serial          │ ← radio's GMSK data channel
//! │ Transport       │
//! └─────────────────┘
//! ```
//!
//! The radio itself must already be in fast-data mode with its USB port set to
//! serial data; dstarlink only moves opaque payloads over that channel.

pub mod config;
pub mod dstar;
pub mod iface;
pub mod logutil;
pub mod metrics;

pub use config::{InterfaceMode, LinkConfig, LinkTuning, Parity};
pub use dstar::errors::{FrameError, LinkError};
pub use dstar::supervisor::LinkEvent;
pub use iface::{DstarInterface, MTU};
