//! Test utilities & fixtures.
//! In-memory ports standing in for the radio's serial data channel, plus a
//! link configuration with timings sized for test wall-clocks.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dstarlink::config::{LinkConfig, LinkTuning};
use dstarlink::dstar::{LinkPort, PortOpener};
use dstarlink::LinkError;

/// Shared byte pipe between a test (playing the radio) and the link under test.
#[derive(Default)]
pub struct Wire {
    to_link: Mutex<VecDeque<u8>>,
    from_link: Mutex<Vec<u8>>,
    fail_io: Mutex<bool>,
}

impl Wire {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue bytes for the link to read, as if the radio demodulated them.
    pub fn push_inbound(&self, data: &[u8]) {
        self.to_link.lock().unwrap().extend(data.iter().copied());
    }

    /// Everything the link has written to the port so far.
    pub fn written(&self) -> Vec<u8> {
        self.from_link.lock().unwrap().clone()
    }

    pub fn written_len(&self) -> usize {
        self.from_link.lock().unwrap().len()
    }

    /// Simulate the USB cable being pulled: IO fails and re-opens fail until
    /// cleared again.
    pub fn set_failing(&self, failing: bool) {
        *self.fail_io.lock().unwrap() = failing;
    }

    pub fn is_failing(&self) -> bool {
        *self.fail_io.lock().unwrap()
    }
}

pub struct MockPort {
    wire: Arc<Wire>,
}

impl LinkPort for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.wire.is_failing() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated link failure",
            ));
        }
        let mut queued = self.wire.to_link.lock().unwrap();
        let n = buf.len().min(queued.len());
        for slot in buf.iter_mut().take(n) {
            *slot = queued.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.wire.is_failing() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated link failure",
            ));
        }
        self.wire.from_link.lock().unwrap().extend_from_slice(data);
        Ok(())
    }
}

/// Opener handing out ports attached to one shared wire. Can be told to fail
/// its first N attempts (or all of them) to exercise the reconnect policy.
pub struct MockOpener {
    wire: Arc<Wire>,
    fail_next: usize,
    fail_forever: bool,
    opens: Arc<AtomicU32>,
}

impl MockOpener {
    pub fn new(wire: Arc<Wire>) -> Self {
        Self {
            wire,
            fail_next: 0,
            fail_forever: false,
            opens: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_next = n;
        self
    }

    pub fn failing_forever(mut self) -> Self {
        self.fail_forever = true;
        self
    }

    /// Shared open-attempt counter, usable after the opener moves into the link.
    pub fn open_count(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.opens)
    }
}

impl PortOpener for MockOpener {
    fn open(&mut self) -> Result<Box<dyn LinkPort>, LinkError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_forever || self.wire.is_failing() {
            return Err(LinkError::PortUnavailable(
                "simulated missing device".to_string(),
            ));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(LinkError::PortUnavailable(
                "simulated missing device".to_string(),
            ));
        }
        Ok(Box::new(MockPort {
            wire: Arc::clone(&self.wire),
        }))
    }
}

/// Link configuration with timings small enough to keep tests fast.
pub fn test_config() -> LinkConfig {
    LinkConfig {
        name: "test0".to_string(),
        mode: Default::default(),
        port: "/dev/null".to_string(),
        speed: 9600,
        databits: 8,
        parity: Default::default(),
        stopbits: 1,
        tuning: LinkTuning {
            turnaround_ms: 5,
            receive_idle_ms: 40,
            max_pending_sends: 4,
            poll_interval_ms: 1,
            reconnect_initial_ms: 5,
            reconnect_cap_ms: 20,
            max_reconnect_attempts: 3,
            settle_ms: 1,
        },
    }
}

/// Route `log` output through the test harness. Honors `RUST_LOG`.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll `cond` until it holds or `timeout_ms` elapses.
pub async fn wait_for<F: Fn() -> bool>(cond: F, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cond()
}
