//! Platform capability contracts — everything the core treats as an
//! external collaborator: transport, non-volatile store, watchdog, clock,
//! and (optionally) streaming decryption. The loader is generic over a
//! single `Platform` implementor; a board support crate supplies it.

/// Error type surfaced by any fallible platform call. Left as an associated
/// type rather than a concrete enum: what counts as an I/O failure is a
/// property of the concrete transport/flash driver, not of this crate.
pub trait Platform {
    type Io: core::fmt::Debug;

    /// Milliseconds since an arbitrary epoch, monotonic for the process
    /// lifetime.
    fn now_ms(&mut self) -> u32;

    /// Pull one byte off the receive path, if one is ready.
    fn rx_byte(&mut self) -> Option<u8>;

    /// Drop any buffered receive data (used on parser buffer-full).
    fn clear_rx(&mut self);

    /// Blocking bulk transmit of a full response frame.
    fn tx_all(&mut self, data: &[u8]) -> Result<(), Self::Io>;

    fn flash_read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Io>;
    fn flash_write(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Io>;
    /// Erase `len` bytes starting at `addr`. Callers always pass
    /// `PAGE_SIZE`-aligned chunks.
    fn flash_erase(&mut self, addr: u32, len: usize) -> Result<(), Self::Io>;

    fn kick_watchdog(&mut self);

    /// The public key used to verify an ECDSA-signed image.
    fn public_key(&self) -> &[u8; 64];

    /// Reset the streaming decryptor ahead of a new FLASH sequence.
    fn decrypt_reset(&mut self);
    /// Decrypt `input` into `output` (same length), advancing the stream
    /// cipher's internal counter.
    fn decrypt_stream(&mut self, input: &[u8], output: &mut [u8]);

    /// Tear down anything that must not be left running across the jump
    /// (peripherals, interrupts the application will reinitialize).
    fn deinit_for_jump(&mut self) -> Result<(), Self::Io>;

    /// Set the stack pointer to the word at `addr` and branch to the
    /// application's reset vector. Does not return on success.
    fn jump_to(&mut self, addr: u32) -> !;
}

/// Cryptographic primitives consumed by the image pipeline. Kept
/// separate from [`Platform`] because a board may hold a hardware crypto
/// accelerator while still using a plain GPIO/UART `Platform`, or vice versa.
pub trait Crypto {
    type Hasher: Sha256Hasher;

    /// Start a fresh SHA-256 computation. Post-validation re-reads a
    /// flashed image page by page rather than holding it in RAM, so hashing
    /// is incremental rather than a single `&[u8]` call.
    fn new_hasher(&self) -> Self::Hasher;

    /// Verify an ECDSA signature over `hash` using `public_key`.
    fn ecdsa_verify(&self, public_key: &[u8; 64], hash: &[u8; 32], signature: &[u8; 64]) -> bool;
}

pub trait Sha256Hasher {
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> [u8; 32];
}
