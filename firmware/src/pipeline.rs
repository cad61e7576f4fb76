//! Image pipeline: pre-validation of a declared header, page-by-page
//! flash erase, and post-validation of the resident header + written
//! payload before the final jump.

use bootloader_protocol::{Crc32Digest, ImageHeader, ImageType, SignatureType, Status, HEADER_SIZE};

#[cfg(feature = "check-hw-version")]
use crate::config::HW_LIMIT;
#[cfg(feature = "check-size")]
use crate::config::APP_SIZE_MAX;
#[cfg(feature = "check-sw-version")]
use crate::config::SW_LIMIT;
use crate::config::{APP_HEAD_ADDR, PAGE_SIZE};
use crate::platform::{Crypto, Platform, Sha256Hasher};

/// Scratch chunk size for re-reading a resident payload back from flash
/// during post-validation; small and fixed regardless of image size.
const READBACK_CHUNK: usize = 256;

/// Run the pre-validation predicates against a header received in a
/// PREPARE payload, before any erase happens. `resident` is the currently
/// flashed header (if CRC-valid), consulted by the downgrade check.
pub fn pre_validate<C: Crypto>(
    header: &ImageHeader,
    resident: Option<&ImageHeader>,
    crypto: &C,
    public_key: &[u8; 64],
) -> Status {
    #[cfg(not(feature = "signature"))]
    let _ = (crypto, public_key);

    let mut status = Status::OK;

    if header.image_type != ImageType::App {
        status |= Status::VALIDATION;
    }

    #[cfg(feature = "check-size")]
    if header.image_size > APP_SIZE_MAX {
        status |= Status::FW_SIZE;
    }

    #[cfg(feature = "check-sw-version")]
    if header.sw_ver > SW_LIMIT {
        status |= Status::FW_VER;
    }

    #[cfg(feature = "reject-downgrade")]
    if let Some(resident) = resident {
        if header.sw_ver <= resident.sw_ver {
            status |= Status::FW_VER;
        }
    }
    #[cfg(not(feature = "reject-downgrade"))]
    let _ = resident;

    #[cfg(feature = "check-hw-version")]
    if header.hw_ver > HW_LIMIT {
        status |= Status::HW_VER;
    }

    #[cfg(feature = "signature")]
    if header.signature_type == SignatureType::Ecdsa
        && !crypto.ecdsa_verify(public_key, &header.hash, &header.signature)
    {
        status |= Status::SIGNATURE;
    }

    status
}

/// Erase `[image_addr, image_addr + total_len)` one page at a time, kicking
/// the watchdog between pages.
pub fn flash_prepare<P: Platform>(platform: &mut P, image_addr: u32, total_len: usize) -> Result<(), Status> {
    let mut offset = 0usize;
    while offset < total_len {
        let chunk = core::cmp::min(PAGE_SIZE, total_len - offset);
        if platform.flash_erase(image_addr + offset as u32, chunk).is_err() {
            #[cfg(not(test))]
            defmt::error!("flash_prepare: erase failed at offset {}", offset);
            return Err(Status::FLASH_ERASE);
        }
        platform.kick_watchdog();
        offset += chunk;
    }
    Ok(())
}

/// Re-read the resident header, re-verify payload integrity, and decide
/// whether the device may jump.
pub fn post_validate<P: Platform, C: Crypto>(platform: &mut P, crypto: &C) -> Status {
    let mut header_bytes = [0u8; HEADER_SIZE];
    if platform.flash_read(APP_HEAD_ADDR, &mut header_bytes).is_err() {
        return Status::VALIDATION;
    }

    let header = match ImageHeader::decode(&header_bytes) {
        Ok(header) => header,
        Err(_) => return Status::VALIDATION,
    };

    let payload_addr = header.image_addr + HEADER_SIZE as u32;
    let payload_ok = match header.signature_type {
        SignatureType::Ecdsa => verify_payload_signature(platform, crypto, &header, payload_addr),
        SignatureType::None => verify_payload_crc(platform, &header, payload_addr),
    };

    if payload_ok {
        Status::OK
    } else if matches!(header.signature_type, SignatureType::Ecdsa) {
        Status::SIGNATURE | Status::VALIDATION
    } else {
        Status::VALIDATION
    }
}

/// Stream `len` bytes starting at `addr` back from flash in fixed-size
/// chunks, feeding each chunk to `sink`. Returns `false` on a read failure.
fn readback(platform: &mut impl Platform, addr: u32, len: usize, mut sink: impl FnMut(&[u8])) -> bool {
    let mut buf = [0u8; READBACK_CHUNK];
    let mut remaining = len;
    let mut cursor = addr;
    while remaining > 0 {
        let n = core::cmp::min(READBACK_CHUNK, remaining);
        if platform.flash_read(cursor, &mut buf[..n]).is_err() {
            return false;
        }
        sink(&buf[..n]);
        cursor += n as u32;
        remaining -= n;
    }
    true
}

fn verify_payload_signature<P: Platform, C: Crypto>(
    platform: &mut P,
    crypto: &C,
    header: &ImageHeader,
    payload_addr: u32,
) -> bool {
    #[cfg(not(feature = "signature"))]
    {
        let _ = (platform, crypto, header, payload_addr);
        false
    }
    #[cfg(feature = "signature")]
    {
        let mut hasher = crypto.new_hasher();
        let ok = readback(platform, payload_addr, header.image_size as usize, |chunk| {
            hasher.update(chunk);
        });
        if !ok {
            return false;
        }
        let digest = hasher.finalize();
        crypto.ecdsa_verify(platform.public_key(), &digest, &header.signature)
    }
}

fn verify_payload_crc<P: Platform>(platform: &mut P, header: &ImageHeader, payload_addr: u32) -> bool {
    let mut digest = Crc32Digest::new();
    let ok = readback(platform, payload_addr, header.image_size as usize, |chunk| {
        digest.update(chunk);
    });
    ok && digest.finalize() == header.image_crc
}

/// De-initialize the platform and branch into the resident application.
/// Never returns on success.
pub fn jump<P: Platform>(platform: &mut P, addr: u32) -> ! {
    #[cfg(not(test))]
    defmt::info!("jumping to application at 0x{:08X}", addr);
    let _ = platform.deinit_for_jump();
    platform.jump_to(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCrypto, MockPlatform};

    fn header(image_addr: u32, image_size: u32, crc: u32) -> ImageHeader {
        ImageHeader {
            version: 1,
            image_type: ImageType::App,
            signature_type: SignatureType::None,
            image_addr,
            image_size,
            image_crc: crc,
            sw_ver: 3,
            hw_ver: 1,
            signature: [0u8; 64],
            hash: [0u8; 32],
        }
    }

    #[test]
    fn pre_validate_accepts_plain_app_header() {
        let crypto = MockCrypto::default();
        let h = header(0x1000, 128, 0);
        let status = pre_validate(&h, None, &crypto, &[0u8; 64]);
        assert_eq!(status, Status::OK);
    }

    #[test]
    fn pre_validate_rejects_non_app_image_type() {
        let crypto = MockCrypto::default();
        let mut h = header(0x1000, 128, 0);
        h.image_type = ImageType::Other;
        let status = pre_validate(&h, None, &crypto, &[0u8; 64]);
        assert!(status.contains(Status::VALIDATION));
    }

    #[test]
    fn pre_validate_image_size_boundary() {
        use crate::config::APP_SIZE_MAX;
        let crypto = MockCrypto::default();

        let at_limit = header(0x1000, APP_SIZE_MAX, 0);
        let status = pre_validate(&at_limit, None, &crypto, &[0u8; 64]);
        assert!(!status.contains(Status::FW_SIZE));

        let over_limit = header(0x1000, APP_SIZE_MAX + 1, 0);
        let status = pre_validate(&over_limit, None, &crypto, &[0u8; 64]);
        if cfg!(feature = "check-size") {
            assert!(status.contains(Status::FW_SIZE));
        } else {
            assert!(!status.contains(Status::FW_SIZE));
        }
    }

    #[test]
    fn pre_validate_rejects_downgrade_when_enabled() {
        let crypto = MockCrypto::default();
        let resident = header(0x1000, 128, 0); // sw_ver = 3 (see `header()` helper)
        let mut candidate = header(0x1000, 128, 0);
        candidate.sw_ver = resident.sw_ver;

        let status = pre_validate(&candidate, Some(&resident), &crypto, &[0u8; 64]);
        if cfg!(feature = "reject-downgrade") {
            assert!(status.contains(Status::FW_VER));
        } else {
            assert!(!status.contains(Status::FW_VER));
        }
    }

    #[test]
    fn flash_prepare_erases_every_page_and_kicks_watchdog() {
        let mut platform = MockPlatform::new(PAGE_SIZE * 4);
        flash_prepare(&mut platform, APP_HEAD_ADDR, PAGE_SIZE * 3).unwrap();
        assert_eq!(platform.watchdog_kicks(), 3);
        assert_eq!(platform.erase_calls().len(), 3);
    }

    #[test]
    fn post_validate_accepts_matching_crc_payload() {
        let mut platform = MockPlatform::new(64 * 1024);
        let payload = [0x42u8; 600];
        let crc = bootloader_protocol::crc::crc32(&payload);
        let h = header(APP_HEAD_ADDR, payload.len() as u32, crc);
        let mut header_bytes = [0u8; HEADER_SIZE];
        h.encode(&mut header_bytes);
        platform.flash_write(APP_HEAD_ADDR, &header_bytes).unwrap();
        platform
            .flash_write(APP_HEAD_ADDR + HEADER_SIZE as u32, &payload)
            .unwrap();

        let crypto = MockCrypto::default();
        assert_eq!(post_validate(&mut platform, &crypto), Status::OK);
    }

    #[test]
    fn post_validate_rejects_tampered_payload() {
        let mut platform = MockPlatform::new(64 * 1024);
        let payload = [0x42u8; 600];
        let crc = bootloader_protocol::crc::crc32(&payload);
        let h = header(APP_HEAD_ADDR, payload.len() as u32, crc);
        let mut header_bytes = [0u8; HEADER_SIZE];
        h.encode(&mut header_bytes);
        platform.flash_write(APP_HEAD_ADDR, &header_bytes).unwrap();
        let mut tampered = payload;
        tampered[0] ^= 0xFF;
        platform
            .flash_write(APP_HEAD_ADDR + HEADER_SIZE as u32, &tampered)
            .unwrap();

        let crypto = MockCrypto::default();
        let status = post_validate(&mut platform, &crypto);
        assert!(status.contains(Status::VALIDATION));
    }
}
