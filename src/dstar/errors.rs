use thiserror::Error;

/// Errors that can arise while configuring, opening or driving the link.
///
/// Transient conditions (`PortUnavailable`, `LinkDown`, `Io`) are retried by
/// the link supervisor with bounded backoff; synchronous send rejections
/// (`EmptyPayload`, `PayloadTooLarge`, `Backpressure`, `LinkClosed`) are
/// surfaced to the caller immediately and never retried internally.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Invalid configuration values, fatal at open.
    #[error("invalid link configuration: {0}")]
    Config(String),

    /// The device path does not exist or is already claimed.
    #[error("serial port unavailable: {0}")]
    PortUnavailable(String),

    /// The OS port refused the requested serial parameters.
    #[error("serial parameters rejected: {0}")]
    ConfigRejected(String),

    /// The connection has been invalidated by a prior I/O error.
    #[error("serial link is down")]
    LinkDown,

    /// The interface has been closed; no further sends are accepted.
    #[error("link is closed")]
    LinkClosed,

    /// Zero-length payloads carry nothing and are rejected outright.
    #[error("empty payload")]
    EmptyPayload,

    /// Payload exceeds the link MTU. Never truncated, always rejected.
    #[error("payload of {size} bytes exceeds the {mtu}-byte MTU")]
    PayloadTooLarge { size: usize, mtu: usize },

    /// The pending send queue is full; the caller decides whether to
    /// retry or drop.
    #[error("send queue full ({capacity} payloads pending)")]
    Backpressure { capacity: usize },

    /// The reconnect budget is exhausted; the host must treat the
    /// interface as down.
    #[error("link unrecoverable after {attempts} consecutive reconnect failures")]
    Unrecoverable { attempts: u32 },

    /// Wrapper around IO errors from the underlying port.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode-side failures recovered locally by resynchronization.
///
/// These are logged and counted but never propagated as fatal: the codec
/// keeps scanning and the channel stays usable.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Checksum mismatch on a complete candidate frame.
    #[error("frame checksum mismatch")]
    Corrupt,

    /// Accumulation buffer exceeded its bound and was reset.
    #[error("receive buffer overflow, stream reset")]
    Overflow,

    /// A partial frame was abandoned after the receive-idle window elapsed.
    #[error("partial frame abandoned after receive-idle timeout")]
    Timeout,
}
