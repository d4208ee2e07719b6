//! # Mesh-Stack Interface Adapter
//!
//! The host-facing side of a radio link. A [`DstarInterface`] exposes exactly
//! the operations a mesh routing stack expects from a network interface:
//!
//! - `open()` - bring the link up (spawns the supervisor task)
//! - `send(payload)` - queue one packet for transmission
//! - a registered receive callback, invoked for every validated inbound packet
//! - `close()` - tear the link down
//!
//! plus the attributes the stack reads for bookkeeping: `mtu()` (fixed 500),
//! `mode()` (opaque forwarding policy), `name()`, `bitrate()` and byte
//! counters.
//!
//! `send()` never blocks: it appends to the pending queue and returns, or
//! fails fast with `Backpressure` when the channel cannot keep up. Delivery
//! to the callback happens on the supervisor task, in wire arrival order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{InterfaceMode, LinkConfig};
use crate::dstar::arbiter::{ArbiterTuning, DuplexArbiter, LinkState};
use crate::dstar::errors::LinkError;
use crate::dstar::supervisor::{
    ControlMessage, LinkCounters, LinkEvent, LinkSupervisor, RxCallback, SupervisorTuning,
};
use crate::dstar::SerialTransport;
#[cfg(feature = "serial")]
use crate::dstar::{PortOpener, SerialPortOpener, SerialSettings};
#[cfg(not(feature = "serial"))]
use crate::dstar::PortOpener;

/// Fixed link MTU in bytes. Payloads above this are rejected at the adapter
/// boundary, never truncated.
pub const MTU: usize = crate::dstar::framing::MAX_PAYLOAD;

/// One serial-attached half-duplex radio link, presented as a mesh network
/// interface. Instances are independent; one per radio.
///
/// An interface is single-use: once closed it stays closed, and a fresh
/// instance is constructed for the next session.
pub struct DstarInterface {
    config: LinkConfig,
    arbiter: Arc<DuplexArbiter>,
    counters: Arc<LinkCounters>,
    online: Arc<AtomicBool>,
    on_receive: Option<Arc<RxCallback>>,
    control_tx: Option<mpsc::UnboundedSender<ControlMessage>>,
    event_tx: Option<mpsc::UnboundedSender<LinkEvent>>,
    event_rx: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl DstarInterface {
    /// Create a closed interface from a validated configuration.
    pub fn new(config: LinkConfig) -> Result<Self, LinkError> {
        config.validate()?;
        let arbiter = Arc::new(DuplexArbiter::new(ArbiterTuning::from(&config.tuning)));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            arbiter,
            counters: Arc::new(LinkCounters::default()),
            online: Arc::new(AtomicBool::new(false)),
            on_receive: None,
            control_tx: None,
            event_tx: Some(event_tx),
            event_rx: Some(event_rx),
            task: None,
            closed: false,
        })
    }

    /// Register the inbound packet callback. Must be called before `open`;
    /// payloads decoded while no callback is registered are dropped.
    pub fn set_receive_callback<F>(&mut self, callback: F)
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        self.on_receive = Some(Arc::new(callback));
    }

    /// Open the link over the configured serial port.
    ///
    /// Idempotent-safe: opening an already-open interface returns without
    /// creating a second transport or supervisor task.
    #[cfg(feature = "serial")]
    pub async fn open(&mut self) -> Result<(), LinkError> {
        let opener = Box::new(SerialPortOpener::new(SerialSettings::from(&self.config)));
        self.open_with(opener).await
    }

    /// Open the link over a caller-supplied port implementation. Used by
    /// tests and by hosts that tunnel the channel through something other
    /// than a local serial device.
    pub async fn open_with(&mut self, opener: Box<dyn PortOpener>) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::LinkClosed);
        }
        if self.task.is_some() {
            debug!("{} already open", self);
            return Ok(());
        }
        let on_receive = self
            .on_receive
            .clone()
            .unwrap_or_else(|| Arc::new(|_payload| {}));
        // The sender moves into the supervisor so the event channel closes
        // when the task ends.
        let event_tx = match self.event_tx.take() {
            Some(event_tx) => event_tx,
            None => return Err(LinkError::LinkClosed),
        };
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let supervisor = LinkSupervisor::new(
            self.config.name.clone(),
            SerialTransport::new(opener),
            Arc::clone(&self.arbiter),
            on_receive,
            control_rx,
            event_tx,
            SupervisorTuning::from(&self.config.tuning),
            Arc::clone(&self.online),
            Arc::clone(&self.counters),
        );
        self.control_tx = Some(control_tx);
        let label = self.to_string();
        self.task = Some(tokio::spawn(async move {
            if let Err(e) = supervisor.run().await {
                log::error!("{} supervisor failed: {}", label, e);
            }
        }));
        info!("{} opened on {}", self, self.config.port);
        Ok(())
    }

    /// Queue one payload for transmission. Returns as soon as the payload is
    /// accepted; actual transmission is paced by the duplex arbiter.
    pub fn send(&self, payload: &[u8]) -> Result<(), LinkError> {
        if payload.is_empty() {
            return Err(LinkError::EmptyPayload);
        }
        if payload.len() > MTU {
            return Err(LinkError::PayloadTooLarge {
                size: payload.len(),
                mtu: MTU,
            });
        }
        if self.closed || self.task.is_none() {
            return Err(LinkError::LinkClosed);
        }
        self.arbiter.enqueue(payload.to_vec())
    }

    /// Tear the link down. Safe to call while reads or writes are in flight;
    /// the supervisor exits at its next safe point and releases the port.
    /// Further sends fail with `LinkClosed`.
    pub async fn close(&mut self) {
        self.closed = true;
        if let Some(control_tx) = self.control_tx.take() {
            let _ = control_tx.send(ControlMessage::Shutdown);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        } else {
            // Never opened; still refuse any queued sends.
            self.arbiter.close();
        }
        self.online.store(false, Ordering::SeqCst);
        info!("{} closed", self);
    }

    /// Maximum payload size accepted per packet.
    pub fn mtu(&self) -> usize {
        MTU
    }

    /// The forwarding mode assigned by the host stack. Pass-through.
    pub fn mode(&self) -> InterfaceMode {
        self.config.mode
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Nominal channel bitrate: the configured baud rate.
    pub fn bitrate(&self) -> u32 {
        self.config.speed
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn link_state(&self) -> LinkState {
        self.arbiter.state()
    }

    /// Payloads queued and not yet transmitted.
    pub fn pending_sends(&self) -> usize {
        self.arbiter.pending()
    }

    /// Payload bytes received from the air so far.
    pub fn rx_bytes(&self) -> u64 {
        self.counters.rx_bytes.load(Ordering::Relaxed)
    }

    /// Payload bytes transmitted so far.
    pub fn tx_bytes(&self) -> u64 {
        self.counters.tx_bytes.load(Ordering::Relaxed)
    }

    /// Take the link event receiver (`Online`/`Offline`/`Unrecoverable`).
    /// Yields `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.event_rx.take()
    }
}

impl fmt::Display for DstarInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DstarInterface[{}]", self.config.name)
    }
}
