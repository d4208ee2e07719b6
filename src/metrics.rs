//! Minimal metrics scaffolding for link health diagnostics.
//! Process-wide totals across all interfaces; per-link byte counters live on
//! the interface adapter itself.
use std::sync::atomic::{AtomicU64, Ordering};

static FRAMES_TX: AtomicU64 = AtomicU64::new(0);
static FRAMES_RX: AtomicU64 = AtomicU64::new(0);
static BYTES_TX: AtomicU64 = AtomicU64::new(0);
static BYTES_RX: AtomicU64 = AtomicU64::new(0);
static CRC_ERRORS: AtomicU64 = AtomicU64::new(0);
static OVERFLOW_RESETS: AtomicU64 = AtomicU64::new(0);
static RX_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static RECONNECTS: AtomicU64 = AtomicU64::new(0);

pub fn inc_frames_tx() {
    FRAMES_TX.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_frames_rx() {
    FRAMES_RX.fetch_add(1, Ordering::Relaxed);
}
pub fn add_bytes_tx(n: usize) {
    BYTES_TX.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn add_bytes_rx(n: usize) {
    BYTES_RX.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn inc_crc_errors() {
    CRC_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_overflow_resets() {
    OVERFLOW_RESETS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_rx_timeouts() {
    RX_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_reconnects() {
    RECONNECTS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone)]
#[allow(dead_code)] // Fields read primarily in tests / host diagnostics
pub struct Snapshot {
    pub frames_tx: u64,
    pub frames_rx: u64,
    pub bytes_tx: u64,
    pub bytes_rx: u64,
    pub crc_errors: u64,
    pub overflow_resets: u64,
    pub rx_timeouts: u64,
    pub reconnects: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        frames_tx: FRAMES_TX.load(Ordering::Relaxed),
        frames_rx: FRAMES_RX.load(Ordering::Relaxed),
        bytes_tx: BYTES_TX.load(Ordering::Relaxed),
        bytes_rx: BYTES_RX.load(Ordering::Relaxed),
        crc_errors: CRC_ERRORS.load(Ordering::Relaxed),
        overflow_resets: OVERFLOW_RESETS.load(Ordering::Relaxed),
        rx_timeouts: RX_TIMEOUTS.load(Ordering::Relaxed),
        reconnects: RECONNECTS.load(Ordering::Relaxed),
    }
}
