//! Image header: the 256-byte record that precedes every flashed
//! application image and is validated both before and after the write.

use crate::crc::{crc32, crc8};

/// Total on-flash size of the header, in bytes.
pub const HEADER_SIZE: usize = 256;
const CTRL_SIZE: usize = 8;
const DATA_SIZE: usize = HEADER_SIZE - CTRL_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ImageType {
    Other = 0x00,
    App = 0x01,
}

impl TryFrom<u8> for ImageType {
    type Error = HeaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ImageType::Other),
            0x01 => Ok(ImageType::App),
            other => Err(HeaderError::UnknownImageType(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SignatureType {
    /// No signature: the payload is authenticated by [`ImageHeaderData::image_crc`] alone.
    None = 0x00,
    Ecdsa = 0x01,
}

impl TryFrom<u8> for SignatureType {
    type Error = HeaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(SignatureType::None),
            0x01 => Ok(SignatureType::Ecdsa),
            other => Err(HeaderError::UnknownSignatureType(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderError {
    Truncated,
    CrcMismatch,
    UnknownImageType(u8),
    UnknownSignatureType(u8),
}

/// Decoded 256-byte image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub version: u8,
    pub image_type: ImageType,
    pub signature_type: SignatureType,
    pub image_addr: u32,
    pub image_size: u32,
    pub image_crc: u32,
    pub sw_ver: u32,
    pub hw_ver: u32,
    pub signature: [u8; 64],
    pub hash: [u8; 32],
}

const _: () = assert!(HEADER_SIZE == 256);
const _: () = assert!(DATA_SIZE == 248);

impl ImageHeader {
    /// Encode into exactly [`HEADER_SIZE`] bytes, computing the leading CRC
    /// over bytes `[1..HEADER_SIZE)` (everything except the CRC byte itself).
    pub fn encode(&self, out: &mut [u8; HEADER_SIZE]) {
        out[1] = self.version;
        out[2] = self.image_type as u8;
        out[3] = self.signature_type as u8;
        out[4..8].fill(0);

        let mut off = CTRL_SIZE;
        out[off..off + 4].copy_from_slice(&self.image_addr.to_le_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.image_size.to_le_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.image_crc.to_le_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.sw_ver.to_le_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.hw_ver.to_le_bytes());
        off += 4;
        out[off..off + 64].copy_from_slice(&self.signature);
        off += 64;
        out[off..off + 32].copy_from_slice(&self.hash);
        off += 32;
        out[off..HEADER_SIZE].fill(0);

        out[0] = crc8(&out[1..HEADER_SIZE]);
    }

    /// Decode and CRC-check a header. Does not evaluate any of the
    /// validation predicates (size/version/hardware/signature) — that is
    /// the pipeline's job, not the wire format's.
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated);
        }
        let bytes: &[u8; HEADER_SIZE] = bytes[..HEADER_SIZE].try_into().unwrap();

        let expected_crc = crc8(&bytes[1..HEADER_SIZE]);
        if bytes[0] != expected_crc {
            return Err(HeaderError::CrcMismatch);
        }

        let version = bytes[1];
        let image_type = ImageType::try_from(bytes[2])?;
        let signature_type = SignatureType::try_from(bytes[3])?;

        let mut off = CTRL_SIZE;
        let image_addr = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let image_size = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let image_crc = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let sw_ver = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let hw_ver = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[off..off + 64]);
        off += 64;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[off..off + 32]);

        Ok(ImageHeader {
            version,
            image_type,
            signature_type,
            image_addr,
            image_size,
            image_crc,
            sw_ver,
            hw_ver,
            signature,
            hash,
        })
    }

    /// Recompute the CRC-32 over a candidate payload and compare against
    /// [`Self::image_crc`] — the fallback integrity check when
    /// `signature_type == SignatureType::None`.
    pub fn payload_crc_matches(&self, payload: &[u8]) -> bool {
        crc32(payload) == self.image_crc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ImageHeader {
        ImageHeader {
            version: 1,
            image_type: ImageType::App,
            signature_type: SignatureType::None,
            image_addr: 0x0801_0000,
            image_size: 4096,
            image_crc: crc32(b"payload-bytes"),
            sw_ver: 3,
            hw_ver: 2,
            signature: [0u8; 64],
            hash: [0u8; 32],
        }
    }

    #[test]
    fn round_trips() {
        let header = sample();
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf);
        let decoded = ImageHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn rejects_corrupted_crc() {
        let header = sample();
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf);
        buf[200] ^= 0xFF;
        assert_eq!(ImageHeader::decode(&buf), Err(HeaderError::CrcMismatch));
    }

    #[test]
    fn payload_crc_check() {
        let header = sample();
        assert!(header.payload_crc_matches(b"payload-bytes"));
        assert!(!header.payload_crc_matches(b"payload-bytez"));
    }
}
