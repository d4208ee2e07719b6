//! Half-duplex channel arbitration.
//!
//! The GMSK channel cannot transmit and receive at the same time, and the
//! radio needs a turnaround window after keying down before the channel can
//! be treated as free again. The arbiter makes that physical behavior an
//! explicit state machine so the policy is testable without hardware.
//!
//! The arbiter owns the link state and the pending send queue. State
//! transitions are driven only by transport events (bytes seen, write
//! completed, I/O failure) and by its own timers; no other component mutates
//! the state directly.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use log::{debug, trace};

use super::errors::LinkError;

/// Channel state as seen by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The interface has been shut down; terminal.
    Closed,
    /// Port not yet up (initial bring-up in progress).
    Opening,
    /// Channel free; a queued payload may transmit.
    Idle,
    /// Outbound frame in flight, or inside the turnaround window after one.
    Transmitting,
    /// Inbound carrier active; no outbound writes allowed.
    Receiving,
    /// Transport failure; held until the supervisor confirms reconnection.
    Error,
}

/// Arbitration timing and queue bounds, sourced from `LinkTuning`.
#[derive(Debug, Clone)]
pub struct ArbiterTuning {
    /// Wait after the last written byte before the channel counts as idle
    /// again. Covers the radio's transmit-to-receive switching time.
    pub turnaround_delay: std::time::Duration,
    /// Quiet window after which a stalled inbound frame is abandoned and the
    /// channel reclaimed for sending.
    pub receive_idle: std::time::Duration,
    /// Pending send queue bound; beyond it `send()` fails with `Backpressure`.
    pub max_pending_sends: usize,
}

impl Default for ArbiterTuning {
    fn default() -> Self {
        Self {
            turnaround_delay: std::time::Duration::from_millis(100),
            receive_idle: std::time::Duration::from_millis(100),
            max_pending_sends: 32,
        }
    }
}

impl From<&crate::config::LinkTuning> for ArbiterTuning {
    fn from(t: &crate::config::LinkTuning) -> Self {
        Self {
            turnaround_delay: std::time::Duration::from_millis(t.turnaround_ms),
            receive_idle: std::time::Duration::from_millis(t.receive_idle_ms),
            max_pending_sends: t.max_pending_sends,
        }
    }
}

#[derive(Debug)]
struct ArbiterInner {
    state: LinkState,
    queue: VecDeque<Vec<u8>>,
    /// Completion instant of the last outbound write; turnaround runs from here.
    tx_done_at: Option<Instant>,
    /// Last instant inbound bytes were seen; receive-idle runs from here.
    last_rx: Option<Instant>,
}

/// Serializes outbound sends against inbound activity and paces transmissions.
pub struct DuplexArbiter {
    tuning: ArbiterTuning,
    inner: Mutex<ArbiterInner>,
}

impl DuplexArbiter {
    pub fn new(tuning: ArbiterTuning) -> Self {
        Self {
            tuning,
            inner: Mutex::new(ArbiterInner {
                state: LinkState::Opening,
                queue: VecDeque::new(),
                tx_done_at: None,
                last_rx: None,
            }),
        }
    }

    pub fn state(&self) -> LinkState {
        self.lock().state
    }

    /// Payloads currently queued for transmission.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Queue a payload for transmission in strict FIFO order. Payloads queue
    /// while the channel is busy and are pulled one at a time once it is idle;
    /// submission order is transmission order.
    pub fn enqueue(&self, payload: Vec<u8>) -> Result<(), LinkError> {
        let mut inner = self.lock();
        if inner.state == LinkState::Closed {
            return Err(LinkError::LinkClosed);
        }
        if inner.queue.len() >= self.tuning.max_pending_sends {
            return Err(LinkError::Backpressure {
                capacity: self.tuning.max_pending_sends,
            });
        }
        inner.queue.push_back(payload);
        Ok(())
    }

    /// Inbound bytes were seen on the wire.
    pub fn note_rx_activity(&self, now: Instant) {
        let mut inner = self.lock();
        if inner.state == LinkState::Idle {
            trace!("carrier detected, channel receiving");
            inner.state = LinkState::Receiving;
        }
        inner.last_rx = Some(now);
    }

    /// A whole inbound frame finished decoding; the far end's turn is over.
    pub fn frame_completed(&self, now: Instant) {
        let mut inner = self.lock();
        if inner.state == LinkState::Receiving {
            inner.state = LinkState::Idle;
        }
        inner.last_rx = Some(now);
    }

    /// Drive the arbiter's timers. Returns true when a receive-idle timeout
    /// fired, in which case the caller abandons the codec's partial frame.
    pub fn tick(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        match inner.state {
            LinkState::Transmitting => {
                if let Some(done) = inner.tx_done_at {
                    if now.duration_since(done) >= self.tuning.turnaround_delay {
                        trace!("turnaround elapsed, channel idle");
                        inner.state = LinkState::Idle;
                        inner.tx_done_at = None;
                    }
                }
            }
            LinkState::Receiving => {
                if let Some(last) = inner.last_rx {
                    if now.duration_since(last) >= self.tuning.receive_idle {
                        debug!("receive went quiet mid-frame, reclaiming channel");
                        inner.state = LinkState::Idle;
                        return true;
                    }
                }
            }
            _ => {}
        }
        false
    }

    /// Pull the next payload if the channel is free to transmit. Leaves the
    /// channel in `Transmitting` until `finish_send` plus the turnaround delay.
    pub fn try_begin_send(&self, _now: Instant) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        if inner.state != LinkState::Idle {
            return None;
        }
        let payload = inner.queue.pop_front()?;
        inner.state = LinkState::Transmitting;
        inner.tx_done_at = None;
        Some(payload)
    }

    /// The last byte of the frame has been handed to the port; the turnaround
    /// clock starts now.
    pub fn finish_send(&self, now: Instant) {
        let mut inner = self.lock();
        if inner.state == LinkState::Transmitting {
            inner.tx_done_at = Some(now);
        }
    }

    /// Transport failure: hold the channel until the supervisor reconnects.
    pub fn on_error(&self) {
        let mut inner = self.lock();
        if inner.state != LinkState::Closed {
            inner.state = LinkState::Error;
        }
    }

    /// The supervisor confirmed the port is (back) up.
    pub fn on_reconnected(&self) {
        let mut inner = self.lock();
        if matches!(inner.state, LinkState::Error | LinkState::Opening) {
            inner.state = LinkState::Idle;
        }
    }

    /// Shut the arbiter down. Queued payloads are dropped and all further
    /// `enqueue` calls fail with `LinkClosed`. Returns the number dropped.
    pub fn close(&self) -> usize {
        let mut inner = self.lock();
        inner.state = LinkState::Closed;
        let dropped = inner.queue.len();
        inner.queue.clear();
        dropped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ArbiterInner> {
        self.inner.lock().expect("arbiter state poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tuning() -> ArbiterTuning {
        ArbiterTuning {
            turnaround_delay: Duration::from_millis(50),
            receive_idle: Duration::from_millis(50),
            max_pending_sends: 2,
        }
    }

    #[test]
    fn no_send_while_receiving() {
        let arb = DuplexArbiter::new(tuning());
        arb.on_reconnected();
        let t0 = Instant::now();
        arb.enqueue(vec![1]).unwrap();
        arb.note_rx_activity(t0);
        assert_eq!(arb.state(), LinkState::Receiving);
        assert!(arb.try_begin_send(t0).is_none());
        // Quiet window elapses; the channel is reclaimed and the send proceeds.
        assert!(arb.tick(t0 + Duration::from_millis(60)));
        assert_eq!(
            arb.try_begin_send(t0 + Duration::from_millis(60)),
            Some(vec![1])
        );
    }

    #[test]
    fn turnaround_gates_next_send() {
        let arb = DuplexArbiter::new(tuning());
        arb.on_reconnected();
        let t0 = Instant::now();
        arb.enqueue(vec![1]).unwrap();
        arb.enqueue(vec![2]).unwrap();
        assert_eq!(arb.try_begin_send(t0), Some(vec![1]));
        arb.finish_send(t0);
        // Still inside the turnaround window
        arb.tick(t0 + Duration::from_millis(10));
        assert!(arb.try_begin_send(t0 + Duration::from_millis(10)).is_none());
        // Window elapsed
        arb.tick(t0 + Duration::from_millis(60));
        assert_eq!(
            arb.try_begin_send(t0 + Duration::from_millis(60)),
            Some(vec![2])
        );
    }

    #[test]
    fn backpressure_when_queue_full() {
        let arb = DuplexArbiter::new(tuning());
        arb.enqueue(vec![1]).unwrap();
        arb.enqueue(vec![2]).unwrap();
        assert!(matches!(
            arb.enqueue(vec![3]),
            Err(LinkError::Backpressure { capacity: 2 })
        ));
    }

    #[test]
    fn closed_rejects_sends_and_drops_queue() {
        let arb = DuplexArbiter::new(tuning());
        arb.enqueue(vec![1]).unwrap();
        assert_eq!(arb.close(), 1);
        assert_eq!(arb.pending(), 0);
        assert!(matches!(arb.enqueue(vec![2]), Err(LinkError::LinkClosed)));
        // Closed is terminal even across reconnect notifications
        arb.on_reconnected();
        assert_eq!(arb.state(), LinkState::Closed);
    }

    #[test]
    fn error_holds_channel_until_reconnect() {
        let arb = DuplexArbiter::new(tuning());
        arb.on_reconnected();
        arb.enqueue(vec![1]).unwrap();
        arb.on_error();
        assert!(arb.try_begin_send(Instant::now()).is_none());
        arb.on_reconnected();
        assert_eq!(arb.try_begin_send(Instant::now()), Some(vec![1]));
    }
}
