//! Message framing: fixed 8-byte header plus an optional payload.

use crate::crc::crc8;
use crate::status::Status;

/// Little-endian preamble marking the start of a header.
pub const PREAMBLE: u16 = 0x07B0;
/// Size of the fixed header, in bytes (preamble, length, source, command, status, crc).
pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Source {
    Manager = 0x2B,
    Loader = 0xB2,
}

impl TryFrom<u8> for Source {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x2B => Ok(Source::Manager),
            0xB2 => Ok(Source::Loader),
            _ => Err(ProtocolError::UnknownSource(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    Connect = 0x10,
    ConnectRsp = 0x11,
    Prepare = 0x20,
    PrepareRsp = 0x21,
    Flash = 0x30,
    FlashRsp = 0x31,
    Exit = 0x40,
    ExitRsp = 0x41,
    Info = 0xA0,
    InfoRsp = 0xA1,
}

impl Command {
    /// The matching response command for a request, e.g. `Connect -> ConnectRsp`.
    pub const fn response(self) -> Command {
        match self {
            Command::Connect | Command::ConnectRsp => Command::ConnectRsp,
            Command::Prepare | Command::PrepareRsp => Command::PrepareRsp,
            Command::Flash | Command::FlashRsp => Command::FlashRsp,
            Command::Exit | Command::ExitRsp => Command::ExitRsp,
            Command::Info | Command::InfoRsp => Command::InfoRsp,
        }
    }

    pub const fn is_response(self) -> bool {
        matches!(
            self,
            Command::ConnectRsp
                | Command::PrepareRsp
                | Command::FlashRsp
                | Command::ExitRsp
                | Command::InfoRsp
        )
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(Command::Connect),
            0x11 => Ok(Command::ConnectRsp),
            0x20 => Ok(Command::Prepare),
            0x21 => Ok(Command::PrepareRsp),
            0x30 => Ok(Command::Flash),
            0x31 => Ok(Command::FlashRsp),
            0x40 => Ok(Command::Exit),
            0x41 => Ok(Command::ExitRsp),
            0xA0 => Ok(Command::Info),
            0xA1 => Ok(Command::InfoRsp),
            _ => Err(ProtocolError::UnknownCommand(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Header's preamble did not match [`PREAMBLE`].
    BadMagic,
    /// Fewer bytes were supplied than the header declares.
    Truncated,
    /// `payload_length` exceeds what the caller's buffer can hold.
    PayloadTooLarge,
    /// The header CRC did not match the computed value.
    CrcMismatch,
    UnknownCommand(u8),
    UnknownSource(u8),
}

/// A fully decoded message: header fields plus a borrowed view of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub source: Source,
    pub command: Command,
    pub status: Status,
    pub payload: &'a [u8],
}

/// XOR-combine independent per-field CRCs — this is observable on
/// the wire and must not be collapsed into a single pass over concatenated bytes.
fn header_crc(length: u16, source: u8, command: u8, status: u8, payload: &[u8]) -> u8 {
    crc8(&length.to_le_bytes()) ^ crc8(&[source]) ^ crc8(&[command]) ^ crc8(&[status]) ^ crc8(payload)
}

impl<'a> Message<'a> {
    pub fn new(source: Source, command: Command, status: Status, payload: &'a [u8]) -> Self {
        Self {
            source,
            command,
            status,
            payload,
        }
    }

    /// Encode this message into `out`, returning the number of bytes written.
    /// `out` must be at least `HEADER_LEN + payload.len()` bytes.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, ProtocolError> {
        let total = HEADER_LEN + self.payload.len();
        if out.len() < total {
            return Err(ProtocolError::PayloadTooLarge);
        }

        let length = self.payload.len() as u16;
        let source = self.source as u8;
        let command = self.command as u8;
        let status = self.status.bits();
        let crc = header_crc(length, source, command, status, self.payload);

        out[0..2].copy_from_slice(&PREAMBLE.to_le_bytes());
        out[2..4].copy_from_slice(&length.to_le_bytes());
        out[4] = source;
        out[5] = command;
        out[6] = status;
        out[7] = crc;
        out[8..total].copy_from_slice(self.payload);

        Ok(total)
    }

    /// Decode a message already framed by the receive parser: `bytes` is
    /// exactly `HEADER_LEN + payload_length` bytes (no trailing garbage).
    pub fn decode(bytes: &'a [u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated);
        }

        let preamble = u16::from_le_bytes([bytes[0], bytes[1]]);
        if preamble != PREAMBLE {
            return Err(ProtocolError::BadMagic);
        }

        let length = u16::from_le_bytes([bytes[2], bytes[3]]);
        let source_byte = bytes[4];
        let command_byte = bytes[5];
        let status_byte = bytes[6];
        let crc = bytes[7];

        let total = HEADER_LEN + length as usize;
        if bytes.len() < total {
            return Err(ProtocolError::Truncated);
        }
        let payload = &bytes[HEADER_LEN..total];

        let expected_crc = header_crc(length, source_byte, command_byte, status_byte, payload);
        if crc != expected_crc {
            return Err(ProtocolError::CrcMismatch);
        }

        let source = Source::try_from(source_byte)?;
        let command = Command::try_from(command_byte)?;
        let status = Status::from_bits_truncate(status_byte);

        Ok(Message {
            source,
            command,
            status,
            payload,
        })
    }
}

/// Peek the `payload_length` field out of a raw 8-byte header without fully
/// decoding it — used by the parser to know how many more bytes to wait for.
pub fn peek_payload_length(header_bytes: &[u8; HEADER_LEN]) -> u16 {
    u16::from_le_bytes([header_bytes[2], header_bytes[3]])
}

pub fn peek_preamble(header_bytes: &[u8; HEADER_LEN]) -> u16 {
    u16::from_le_bytes([header_bytes[0], header_bytes[1]])
}
