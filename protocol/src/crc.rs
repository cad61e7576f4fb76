//! Integrity primitives.
//!
//! Both CRCs are MSB-first, unreflected, with no final XOR — neither matches
//! a catalog algorithm in the `crc` crate, so they're built from a custom
//! [`Algorithm`].

use crc::{Algorithm, Crc};

/// CCITT polynomial, non-standard seed. Used for message, header and handoff CRCs.
const CRC8_ALGORITHM: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: 0xB6,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0x00,
    residue: 0x00,
};

/// Used as the fallback image-payload integrity check when `signature_type == NONE`.
const CRC32_ALGORITHM: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04C1_1DB7,
    init: 0x1010_1010,
    refin: false,
    refout: false,
    xorout: 0x0000_0000,
    check: 0x0000_0000,
    residue: 0x0000_0000,
};

const CRC8_ENGINE: Crc<u8> = Crc::<u8>::new(&CRC8_ALGORITHM);
const CRC32_ENGINE: Crc<u32> = Crc::<u32>::new(&CRC32_ALGORITHM);

/// CRC-8 over `data`, independent of any other field — callers XOR-combine
/// the per-field results themselves where the wire format calls for it.
pub fn crc8(data: &[u8]) -> u8 {
    CRC8_ENGINE.checksum(data)
}

/// CRC-32 over `data`, single pass.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32_ENGINE.checksum(data)
}

/// Incremental CRC-32, for callers that can't hold the whole payload in RAM
/// at once (post-validation re-reads a flashed image page by page).
pub struct Crc32Digest(crc::Digest<'static, u32>);

impl Crc32Digest {
    pub fn new() -> Self {
        Self(CRC32_ENGINE.digest())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.0.finalize()
    }
}

impl Default for Crc32Digest {
    fn default() -> Self {
        Self::new()
    }
}
