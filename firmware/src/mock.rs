//! In-memory test doubles for the platform-capability contracts. Used
//! only by `#[cfg(test)]` unit tests — the same "fake the external
//! boundary" shape a flash driver gets from being made generic over its
//! transport trait.

use std::collections::VecDeque;
use std::vec::Vec;

use bootloader_protocol::HANDOFF_SIZE;

use crate::handoff::HandoffStore;
use crate::platform::{Crypto, Platform, Sha256Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockIo {
    OutOfRange,
}

pub struct MockPlatform {
    /// Address of `flash[0]` — tests use real addresses like
    /// `config::APP_HEAD_ADDR` without needing a full-size backing buffer.
    base: u32,
    flash: Vec<u8>,
    rx: VecDeque<u8>,
    tx_log: Vec<u8>,
    now_ms: u32,
    watchdog_kicks: u32,
    erase_calls: Vec<(u32, usize)>,
    public_key: [u8; 64],
    jumped_to: Option<u32>,
}

impl MockPlatform {
    /// A flash region of `flash_size` bytes starting at
    /// [`crate::config::APP_HEAD_ADDR`], matching the loader's real address
    /// layout closely enough for pipeline/handoff tests.
    pub fn new(flash_size: usize) -> Self {
        Self::with_base(crate::config::APP_HEAD_ADDR, flash_size)
    }

    pub fn with_base(base: u32, flash_size: usize) -> Self {
        Self {
            base,
            flash: vec![0xFFu8; flash_size],
            rx: VecDeque::new(),
            tx_log: Vec::new(),
            now_ms: 0,
            watchdog_kicks: 0,
            erase_calls: Vec::new(),
            public_key: [0u8; 64],
            jumped_to: None,
        }
    }

    pub fn push_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn advance_ms(&mut self, delta: u32) {
        self.now_ms += delta;
    }

    pub fn tx_log(&self) -> &[u8] {
        &self.tx_log
    }

    pub fn watchdog_kicks(&self) -> u32 {
        self.watchdog_kicks
    }

    pub fn erase_calls(&self) -> &[(u32, usize)] {
        &self.erase_calls
    }

    pub fn jumped_to(&self) -> Option<u32> {
        self.jumped_to
    }

    fn offset(&self, addr: u32) -> Result<usize, MockIo> {
        let offset = addr.checked_sub(self.base).ok_or(MockIo::OutOfRange)? as usize;
        if offset > self.flash.len() {
            return Err(MockIo::OutOfRange);
        }
        Ok(offset)
    }
}

impl Platform for MockPlatform {
    type Io = MockIo;

    fn now_ms(&mut self) -> u32 {
        self.now_ms
    }

    fn rx_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn clear_rx(&mut self) {
        self.rx.clear();
    }

    fn tx_all(&mut self, data: &[u8]) -> Result<(), Self::Io> {
        self.tx_log.extend_from_slice(data);
        Ok(())
    }

    fn flash_read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Io> {
        let offset = self.offset(addr)?;
        if offset + buf.len() > self.flash.len() {
            return Err(MockIo::OutOfRange);
        }
        buf.copy_from_slice(&self.flash[offset..offset + buf.len()]);
        Ok(())
    }

    fn flash_write(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Io> {
        let offset = self.offset(addr)?;
        if offset + data.len() > self.flash.len() {
            return Err(MockIo::OutOfRange);
        }
        self.flash[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn flash_erase(&mut self, addr: u32, len: usize) -> Result<(), Self::Io> {
        let offset = self.offset(addr)?;
        if offset + len > self.flash.len() {
            return Err(MockIo::OutOfRange);
        }
        self.flash[offset..offset + len].fill(0xFF);
        self.erase_calls.push((addr, len));
        Ok(())
    }

    fn kick_watchdog(&mut self) {
        self.watchdog_kicks += 1;
    }

    fn public_key(&self) -> &[u8; 64] {
        &self.public_key
    }

    fn decrypt_reset(&mut self) {}

    fn decrypt_stream(&mut self, input: &[u8], output: &mut [u8]) {
        // Identity "cipher": good enough for exercising the FLASH write
        // path without pulling in a real AES-CTR implementation in tests.
        output.copy_from_slice(input);
    }

    fn deinit_for_jump(&mut self) -> Result<(), Self::Io> {
        Ok(())
    }

    fn jump_to(&mut self, addr: u32) -> ! {
        self.jumped_to = Some(addr);
        panic!("MockPlatform::jump_to({addr:#010X}) reached in test");
    }
}

#[derive(Default)]
pub struct MockCrypto {
    /// When `false`, `ecdsa_verify` always fails — used to exercise the
    /// SIGNATURE status path without a real signature.
    pub accept_signature: bool,
}

impl Crypto for MockCrypto {
    type Hasher = MockHasher;

    fn new_hasher(&self) -> Self::Hasher {
        MockHasher::default()
    }

    fn ecdsa_verify(&self, _public_key: &[u8; 64], _hash: &[u8; 32], _signature: &[u8; 64]) -> bool {
        self.accept_signature
    }
}

/// In-memory backing for [`HandoffStore`], standing in for the
/// non-initialized RAM section the real target holds it in.
pub struct MemHandoffStore {
    bytes: [u8; HANDOFF_SIZE],
}

impl MemHandoffStore {
    pub fn erased() -> Self {
        Self {
            bytes: [0xFFu8; HANDOFF_SIZE],
        }
    }
}

impl HandoffStore for MemHandoffStore {
    fn read_raw(&mut self) -> [u8; HANDOFF_SIZE] {
        self.bytes
    }

    fn write_raw(&mut self, bytes: &[u8; HANDOFF_SIZE]) {
        self.bytes = *bytes;
    }
}

#[derive(Default)]
pub struct MockHasher {
    data: Vec<u8>,
}

impl Sha256Hasher for MockHasher {
    fn update(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    fn finalize(self) -> [u8; 32] {
        // Not a real SHA-256 — tests only need a deterministic function of
        // the accumulated bytes, and `ecdsa_verify` above is itself a stub.
        let digest = bootloader_protocol::crc::crc32(&self.data);
        let mut out = [0u8; 32];
        out[..4].copy_from_slice(&digest.to_le_bytes());
        out
    }
}
