//! Handoff region: the 32-byte record shared across a reset between the
//! bootloader and the application it launches.

use crate::crc::crc8;

/// Total size of the handoff region, in bytes.
pub const HANDOFF_SIZE: usize = 32;
const CTRL_SIZE: usize = 8;
const DATA_SIZE: usize = HANDOFF_SIZE - CTRL_SIZE;

const _: () = assert!(HANDOFF_SIZE == 32);
const _: () = assert!(DATA_SIZE == 24);

/// Why the bootloader last ran, recorded for the application to read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BootReason {
    /// Ordinary power-on/reset, no loader activity.
    None = 0x00,
    /// Entered via the back-door command window.
    Com = 0x01,
    /// Entered after a completed flash upgrade.
    Flash = 0x02,
}

impl TryFrom<u8> for BootReason {
    type Error = HandoffError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(BootReason::None),
            0x01 => Ok(BootReason::Com),
            0x02 => Ok(BootReason::Flash),
            other => Err(HandoffError::UnknownBootReason(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandoffError {
    Truncated,
    CrcMismatch,
    UnknownBootReason(u8),
}

/// Decoded handoff region contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffRegion {
    pub layout_version: u8,
    pub boot_version: u32,
    pub boot_reason: BootReason,
    pub boot_count: u8,
}

impl HandoffRegion {
    pub fn encode(&self, out: &mut [u8; HANDOFF_SIZE]) {
        out[1] = self.layout_version;
        out[2..8].fill(0);

        let mut off = CTRL_SIZE;
        out[off..off + 4].copy_from_slice(&self.boot_version.to_le_bytes());
        off += 4;
        out[off] = self.boot_reason as u8;
        off += 1;
        out[off] = self.boot_count;
        off += 1;
        out[off..HANDOFF_SIZE].fill(0);

        out[0] = crc8(&out[1..HANDOFF_SIZE]);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, HandoffError> {
        if bytes.len() < HANDOFF_SIZE {
            return Err(HandoffError::Truncated);
        }
        let bytes: &[u8; HANDOFF_SIZE] = bytes[..HANDOFF_SIZE].try_into().unwrap();

        let expected_crc = crc8(&bytes[1..HANDOFF_SIZE]);
        if bytes[0] != expected_crc {
            return Err(HandoffError::CrcMismatch);
        }

        let layout_version = bytes[1];
        let mut off = CTRL_SIZE;
        let boot_version = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let boot_reason = BootReason::try_from(bytes[off])?;
        off += 1;
        let boot_count = bytes[off];

        Ok(HandoffRegion {
            layout_version,
            boot_version,
            boot_reason,
            boot_count,
        })
    }

    /// A region with no CRC set, used to detect an unprogrammed (erased
    /// flash, all-`0xFF`) handoff area on a cold boot.
    pub fn is_erased(bytes: &[u8; HANDOFF_SIZE]) -> bool {
        bytes.iter().all(|&b| b == 0xFF)
    }
}
