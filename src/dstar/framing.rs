//! Frame codec for the GMSK data channel.
//!
//! Payloads are framed on the wire as:
//!
//!   `<flag 0x7E> <length, 2B big-endian> <payload, 0-500B> <CRC-16/X.25, 2B big-endian>`
//!
//! The checksum covers the length field and the payload. Both ends of a link
//! must agree on this layout; the flag octet and FCS polynomial are the HDLC
//! ones, chosen to match what D-star data gear already speaks.
//!
//! Decoding is incremental: [`FrameCodec::feed`] can be handed arbitrary read
//! chunks and yields whole payloads as their frames complete. On corruption it
//! advances a single byte and rescans, so a valid frame straddling a corrupt
//! one is never lost.
use bytes::{Buf, BytesMut};
use crc::{Crc, CRC_16_IBM_SDLC};
use log::trace;

use super::errors::FrameError;
use crate::logutil::hex_snippet;

/// Frame start delimiter (the HDLC flag octet).
pub const FLAG: u8 = 0x7E;
/// Largest payload carried by one frame. Equals the link MTU.
pub const MAX_PAYLOAD: usize = 500;
/// Accumulation bound; a stream stuck beyond this is reset with `Overflow`.
const MAX_BUFFER: usize = 4 * MAX_PAYLOAD;

/// Flag plus the two length bytes.
const HEADER_LEN: usize = 3;
/// The CRC-16 trailer.
const TRAILER_LEN: usize = 2;

const FCS: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// One outcome from feeding bytes to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A validated payload, emitted in wire arrival order.
    Payload(Vec<u8>),
    /// A recoverable decode failure; the codec has already resynchronized.
    Error(FrameError),
}

/// Encode one payload into its on-wire frame.
///
/// The payload must not exceed [`MAX_PAYLOAD`]; the interface adapter rejects
/// oversize sends before they reach the codec.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD);
    let len = (payload.len() as u16).to_be_bytes();
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    out.push(FLAG);
    out.extend_from_slice(&len);
    out.extend_from_slice(payload);
    let mut digest = FCS.digest();
    digest.update(&len);
    digest.update(payload);
    out.extend_from_slice(&digest.finalize().to_be_bytes());
    out
}

/// Incremental frame decoder with an internal accumulation buffer that spans
/// reads. Partial frames persist silently across calls until completed,
/// abandoned by the receive-idle timeout, or bounded out by `MAX_BUFFER`.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buf: BytesMut,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_BUFFER),
        }
    }

    /// Append raw bytes and extract everything decodable, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Decoded> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        loop {
            // Align to the next flag; bytes ahead of it can never start a frame.
            match self.buf.iter().position(|&b| b == FLAG) {
                Some(0) => {}
                Some(pos) => self.buf.advance(pos),
                None => {
                    if self.buf.len() > MAX_BUFFER {
                        // Stuck, delimiter-less stream; reset rather than grow.
                        self.buf.clear();
                        out.push(Decoded::Error(FrameError::Overflow));
                    }
                    break;
                }
            }
            if self.buf.len() < HEADER_LEN {
                break;
            }
            let declared = u16::from_be_bytes([self.buf[1], self.buf[2]]) as usize;
            if declared > MAX_PAYLOAD {
                // Implausible length: the flag was payload noise, not a frame start.
                trace!("resync: declared length {} exceeds {}", declared, MAX_PAYLOAD);
                self.buf.advance(1);
                continue;
            }
            let total = HEADER_LEN + declared + TRAILER_LEN;
            if self.buf.len() < total {
                break;
            }
            let mut digest = FCS.digest();
            digest.update(&self.buf[1..HEADER_LEN + declared]);
            let computed = digest.finalize();
            let received = u16::from_be_bytes([
                self.buf[HEADER_LEN + declared],
                self.buf[HEADER_LEN + declared + 1],
            ]);
            if computed == received {
                let payload = self.buf[HEADER_LEN..HEADER_LEN + declared].to_vec();
                self.buf.advance(total);
                trace!(
                    "frame ok, {} byte payload: {}",
                    payload.len(),
                    hex_snippet(&payload, 32)
                );
                out.push(Decoded::Payload(payload));
            } else {
                // Skip one byte only; a valid frame may begin inside this one.
                trace!(
                    "frame crc mismatch (computed {:04x}, received {:04x})",
                    computed,
                    received
                );
                self.buf.advance(1);
                out.push(Decoded::Error(FrameError::Corrupt));
            }
        }
        out
    }

    /// Drop an in-progress frame. Called when the receive-idle window elapses
    /// mid-frame so one lost inbound frame cannot wedge the channel.
    /// Returns whether any buffered bytes were discarded.
    pub fn abandon_partial(&mut self) -> bool {
        if self.buf.is_empty() {
            return false;
        }
        trace!("abandoning {} buffered bytes", self.buf.len());
        self.buf.clear();
        true
    }

    /// Bytes currently held in the accumulation buffer.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
