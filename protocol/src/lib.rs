//! Wire and flash data model for the upgrade bootloader.
//!
//! This crate has no knowledge of transports, flash drivers, or timers — it
//! only encodes and decodes the byte layouts the rest of the system agrees
//! on: framed messages, the image header, and the cross-reset handoff
//! region, plus the CRC and status primitives they share.

#![no_std]

pub mod crc;
pub mod handoff;
pub mod header;
pub mod message;
pub mod status;

pub use crc::Crc32Digest;
pub use handoff::{BootReason, HandoffError, HandoffRegion, HANDOFF_SIZE};
pub use header::{HeaderError, ImageHeader, ImageType, SignatureType, HEADER_SIZE};
pub use message::{Command, Message, ProtocolError, Source, HEADER_LEN, PREAMBLE};
pub use status::Status;
