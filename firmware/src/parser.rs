//! Byte-driven frame receive parser. Single-threaded, cooperative:
//! callers feed it one byte at a time and poll for an idle timeout between
//! bytes. It never panics on malformed input.

use bootloader_protocol::{message, Message, ProtocolError, HEADER_LEN, PREAMBLE};
use heapless::Vec;

use crate::config::{IDLE_TIMEOUT_MS, RX_BUF};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
enum Mode {
    Idle,
    RcvHeader,
    RcvPayload { payload_length: u16 },
}

/// What happened as a result of feeding the parser a byte or polling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum ParserEvent {
    /// No complete frame yet; keep feeding bytes.
    Pending,
    /// A frame passed its header CRC check. Call [`FrameParser::take_frame`]
    /// to get at the bytes before the next byte is fed.
    Frame,
    /// A frame's CRC did not match.
    CrcError,
    /// No bytes arrived for `IDLE_TIMEOUT_MS`; buffer discarded.
    Timeout,
    /// The buffer would have overflowed; the platform receive FIFO was
    /// cleared and the buffer discarded.
    Full,
}

pub struct FrameParser {
    mode: Mode,
    buf: Vec<u8, RX_BUF>,
    last_byte_ts: u32,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub const fn new() -> Self {
        Self {
            mode: Mode::Idle,
            buf: Vec::new(),
            last_byte_ts: 0,
        }
    }

    fn reset(&mut self) {
        self.mode = Mode::Idle;
        self.buf.clear();
    }

    /// Feed one received byte. `now_ms` is the platform clock at the moment
    /// this byte arrived.
    pub fn push_byte(&mut self, byte: u8, now_ms: u32) -> ParserEvent {
        self.last_byte_ts = now_ms;

        if self.buf.push(byte).is_err() {
            // buffer full: the caller is expected to clear_rx() on this event.
            self.reset();
            return ParserEvent::Full;
        }
        if self.mode == Mode::Idle {
            self.mode = Mode::RcvHeader;
        }

        match self.mode {
            Mode::Idle => unreachable!("set to RcvHeader above"),
            Mode::RcvHeader => {
                if self.buf.len() < HEADER_LEN {
                    return ParserEvent::Pending;
                }
                let header: [u8; HEADER_LEN] = self.buf[..HEADER_LEN].try_into().unwrap();
                if message::peek_preamble(&header) != PREAMBLE {
                    // Garbage tolerance: wait for the idle timeout to resync
                    // rather than acting on an unsynchronized buffer.
                    return ParserEvent::Pending;
                }
                let payload_length = message::peek_payload_length(&header);
                if payload_length == 0 {
                    return self.finish();
                }
                self.mode = Mode::RcvPayload { payload_length };
                ParserEvent::Pending
            }
            Mode::RcvPayload { payload_length } => {
                let total = HEADER_LEN + payload_length as usize;
                if self.buf.len() < total {
                    return ParserEvent::Pending;
                }
                self.finish()
            }
        }
    }

    fn finish(&mut self) -> ParserEvent {
        match Message::decode(&self.buf) {
            Ok(_) => ParserEvent::Frame,
            Err(ProtocolError::CrcMismatch) => {
                self.reset();
                ParserEvent::CrcError
            }
            // BadMagic/Truncated/UnknownCommand/PayloadTooLarge here would
            // mean the length field lied about how much data follows; treat
            // identically to a CRC failure — discard and resync.
            Err(_) => {
                self.reset();
                ParserEvent::CrcError
            }
        }
    }

    /// Check for inter-byte idle timeout. Call once per loader `handle()`
    /// step in addition to [`Self::push_byte`].
    pub fn poll_timeout(&mut self, now_ms: u32) -> Option<ParserEvent> {
        if self.mode == Mode::Idle {
            return None;
        }
        if now_ms.wrapping_sub(self.last_byte_ts) >= IDLE_TIMEOUT_MS {
            self.reset();
            return Some(ParserEvent::Timeout);
        }
        None
    }

    /// Borrow the decoded frame after a [`ParserEvent::Frame`]. Must be
    /// consumed before the next byte is fed.
    pub fn take_frame(&mut self) -> Message<'_> {
        Message::decode(&self.buf).expect("caller observed ParserEvent::Frame")
    }

    /// Discard the current frame and return to [`Mode::Idle`]. Called by the
    /// dispatcher once it has consumed a frame's contents.
    pub fn consume(&mut self) {
        self.reset();
    }
}
