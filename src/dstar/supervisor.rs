//! Background link supervision: the read/dispatch/send loop and the
//! reconnect policy.
//!
//! Exactly one supervisor task touches the serial connection. Each tick it
//! performs a bounded read, feeds the frame codec, dispatches decoded
//! payloads to the host callback, drives the arbiter's timers, and services
//! at most one pending send when the channel is idle. On a transport failure
//! it holds the link in `Error`, reopens with exponential backoff (capped),
//! and gives up for good once the consecutive-failure budget is spent.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

use super::arbiter::DuplexArbiter;
use super::errors::{FrameError, LinkError};
use super::framing::{self, Decoded, FrameCodec};
use super::SerialTransport;
use crate::logutil::hex_snippet;
use crate::metrics;

/// Callback invoked for every validated inbound payload, from the supervisor
/// task, in wire arrival order.
pub type RxCallback = dyn Fn(Vec<u8>) + Send + Sync;

/// Control messages for the supervisor task.
#[derive(Debug)]
pub enum ControlMessage {
    Shutdown,
}

/// Link lifecycle events surfaced to the host stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The port is open and the channel is usable.
    Online,
    /// The transport failed; reconnection attempts are under way.
    Offline,
    /// The reconnect budget is exhausted. Emitted at most once, after which
    /// the supervisor stops retrying and the interface must be treated as down.
    Unrecoverable,
}

/// Supervision timing knobs, sourced from `LinkTuning`.
#[derive(Debug, Clone)]
pub struct SupervisorTuning {
    /// Loop tick period.
    pub poll_interval: Duration,
    /// First reconnect delay after a failure.
    pub backoff_initial: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
    /// Consecutive open failures tolerated before giving up.
    pub max_reconnect_attempts: u32,
    /// Settle time after the port opens before traffic is expected.
    pub settle_delay: Duration,
}

impl Default for SupervisorTuning {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            backoff_initial: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            settle_delay: Duration::from_millis(150),
        }
    }
}

impl From<&crate::config::LinkTuning> for SupervisorTuning {
    fn from(t: &crate::config::LinkTuning) -> Self {
        Self {
            poll_interval: Duration::from_millis(t.poll_interval_ms),
            backoff_initial: Duration::from_millis(t.reconnect_initial_ms),
            backoff_cap: Duration::from_millis(t.reconnect_cap_ms),
            max_reconnect_attempts: t.max_reconnect_attempts,
            settle_delay: Duration::from_millis(t.settle_ms),
        }
    }
}

/// Per-link payload byte totals (bytes handed to / received from the mesh
/// stack, not wire overhead).
#[derive(Debug, Default)]
pub struct LinkCounters {
    pub rx_bytes: AtomicU64,
    pub tx_bytes: AtomicU64,
}

/// The background task driving one serial link.
pub struct LinkSupervisor {
    name: String,
    transport: SerialTransport,
    codec: FrameCodec,
    arbiter: Arc<DuplexArbiter>,
    on_receive: Arc<RxCallback>,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    event_tx: mpsc::UnboundedSender<LinkEvent>,
    tuning: SupervisorTuning,
    online: Arc<AtomicBool>,
    counters: Arc<LinkCounters>,
    backoff: Duration,
    consecutive_failures: u32,
    next_attempt_at: Option<Instant>,
    opened_before: bool,
}

impl LinkSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        transport: SerialTransport,
        arbiter: Arc<DuplexArbiter>,
        on_receive: Arc<RxCallback>,
        control_rx: mpsc::UnboundedReceiver<ControlMessage>,
        event_tx: mpsc::UnboundedSender<LinkEvent>,
        tuning: SupervisorTuning,
        online: Arc<AtomicBool>,
        counters: Arc<LinkCounters>,
    ) -> Self {
        let backoff = tuning.backoff_initial;
        Self {
            name,
            transport,
            codec: FrameCodec::new(),
            arbiter,
            on_receive,
            control_rx,
            event_tx,
            tuning,
            online,
            counters,
            backoff,
            consecutive_failures: 0,
            next_attempt_at: None,
            opened_before: false,
        }
    }

    /// Run the supervision loop until shutdown or an unrecoverable link.
    pub async fn run(mut self) -> Result<()> {
        info!("[{}] link supervisor starting", self.name);

        if let Err(LinkError::Unrecoverable { attempts }) = self.try_open().await {
            self.give_up(attempts);
            return Ok(());
        }

        let mut tick = interval(self.tuning.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                ctrl = self.control_rx.recv() => {
                    match ctrl {
                        Some(ControlMessage::Shutdown) | None => {
                            info!("[{}] shutdown requested", self.name);
                            break;
                        }
                    }
                }

                _ = tick.tick() => {
                    if self.transport.is_open() {
                        if let Err(e) = self.service() {
                            self.handle_link_failure(&e);
                        }
                    } else if self.next_attempt_at.map_or(true, |at| Instant::now() >= at) {
                        if let Err(LinkError::Unrecoverable { attempts }) = self.try_open().await {
                            self.give_up(attempts);
                            return Ok(());
                        }
                    }
                }
            }
        }

        // Orderly shutdown: release the port and refuse queued/future sends.
        self.transport.close();
        self.online.store(false, Ordering::SeqCst);
        let dropped = self.arbiter.close();
        if dropped > 0 {
            debug!("[{}] {} queued payloads dropped at close", self.name, dropped);
        }
        info!("[{}] link supervisor stopped", self.name);
        Ok(())
    }

    /// One service pass: read, decode, dispatch, tick timers, send.
    fn service(&mut self) -> Result<(), LinkError> {
        let now = Instant::now();

        let mut buf = [0u8; 1024];
        let n = self.transport.read(&mut buf)?;
        if n > 0 {
            trace!(
                "[{}] RAW {} bytes: {}",
                self.name,
                n,
                hex_snippet(&buf[..n], 64)
            );
            metrics::add_bytes_rx(n);
            self.arbiter.note_rx_activity(now);
            for item in self.codec.feed(&buf[..n]) {
                match item {
                    Decoded::Payload(payload) => {
                        metrics::inc_frames_rx();
                        self.counters
                            .rx_bytes
                            .fetch_add(payload.len() as u64, Ordering::Relaxed);
                        self.arbiter.frame_completed(Instant::now());
                        debug!("[{}] inbound payload, {} bytes", self.name, payload.len());
                        (self.on_receive)(payload);
                    }
                    Decoded::Error(e) => {
                        match e {
                            FrameError::Corrupt => metrics::inc_crc_errors(),
                            FrameError::Overflow => metrics::inc_overflow_resets(),
                            FrameError::Timeout => {}
                        }
                        debug!("[{}] {}", self.name, e);
                    }
                }
            }
        }

        // Receive-idle timeout reclaims the channel and abandons the stalled frame.
        if self.arbiter.tick(now) && self.codec.abandon_partial() {
            metrics::inc_rx_timeouts();
            debug!("[{}] {}", self.name, FrameError::Timeout);
        }

        // At most one outbound frame per pass keeps the loop responsive.
        if let Some(payload) = self.arbiter.try_begin_send(Instant::now()) {
            let frame = framing::encode(&payload);
            trace!(
                "[{}] TX {} bytes: {}",
                self.name,
                frame.len(),
                hex_snippet(&frame, 64)
            );
            if let Err(e) = self.transport.write(&frame) {
                warn!("[{}] outbound payload dropped after write failure", self.name);
                return Err(e);
            }
            metrics::inc_frames_tx();
            metrics::add_bytes_tx(frame.len());
            self.counters
                .tx_bytes
                .fetch_add(payload.len() as u64, Ordering::Relaxed);
            self.arbiter.finish_send(Instant::now());
            debug!("[{}] transmitted {} byte payload", self.name, payload.len());
        }

        Ok(())
    }

    /// Attempt to (re)open the port. Schedules the next attempt on failure
    /// and converts budget exhaustion into `Unrecoverable`.
    async fn try_open(&mut self) -> Result<(), LinkError> {
        match self.transport.open() {
            Ok(()) => {
                // Give the radio a moment to settle after the port appears.
                sleep(self.tuning.settle_delay).await;
                if self.opened_before {
                    metrics::inc_reconnects();
                    info!("[{}] serial link reconnected", self.name);
                } else {
                    info!("[{}] serial link is operational", self.name);
                }
                self.opened_before = true;
                self.consecutive_failures = 0;
                self.backoff = self.tuning.backoff_initial;
                self.next_attempt_at = None;
                self.online.store(true, Ordering::SeqCst);
                self.arbiter.on_reconnected();
                let _ = self.event_tx.send(LinkEvent::Online);
                Ok(())
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.tuning.max_reconnect_attempts {
                    return Err(LinkError::Unrecoverable {
                        attempts: self.consecutive_failures,
                    });
                }
                warn!(
                    "[{}] open failed ({}); retrying in {:?}",
                    self.name, e, self.backoff
                );
                self.next_attempt_at = Some(Instant::now() + self.backoff);
                self.backoff = (self.backoff * 2).min(self.tuning.backoff_cap);
                Err(e)
            }
        }
    }

    /// A read or write failed mid-session. Hold the channel and start the
    /// reconnect schedule from the initial backoff.
    fn handle_link_failure(&mut self, err: &LinkError) {
        warn!("[{}] serial link failure: {}", self.name, err);
        if self.online.swap(false, Ordering::SeqCst) {
            let _ = self.event_tx.send(LinkEvent::Offline);
        }
        self.arbiter.on_error();
        self.transport.close();
        self.consecutive_failures = 0;
        self.backoff = self.tuning.backoff_initial;
        self.next_attempt_at = Some(Instant::now() + self.backoff);
    }

    /// The reconnect budget is spent. Emit `Unrecoverable` once and stop.
    fn give_up(&mut self, attempts: u32) {
        error!(
            "[{}] giving up after {} consecutive reconnect failures",
            self.name, attempts
        );
        self.online.store(false, Ordering::SeqCst);
        let _ = self.event_tx.send(LinkEvent::Unrecoverable);
        let dropped = self.arbiter.close();
        if dropped > 0 {
            warn!(
                "[{}] {} queued payloads dropped on unrecoverable link",
                self.name, dropped
            );
        }
    }
}
