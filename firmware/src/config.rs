//! Compile-time constants for the loader: platform-capability sizing and
//! data-model limits, named rather than left as protocol fields — they
//! describe this particular loader/target pairing, not the wire format.

use bootloader_protocol::HEADER_SIZE as HEADER_SIZE_;

/// Receive parser scratch buffer size. Bounds `payload_length` to
/// `RX_BUF - 8`.
pub const RX_BUF: usize = 1024 + 8;

/// Maximum payload carried by a single FLASH message.
pub const DATA_PAYLOAD_SIZE: usize = 1024;

/// Inter-byte idle timeout inside the frame parser.
pub const IDLE_TIMEOUT_MS: u32 = 20;

/// Per-state idle timeouts.
pub const PREPARE_IDLE_TIMEOUT_MS: u32 = 5_000;
pub const FLASH_IDLE_TIMEOUT_MS: u32 = 5_000;
pub const EXIT_IDLE_TIMEOUT_MS: u32 = 2_000;

/// How long IDLE waits before attempting an unsolicited post-validation +
/// jump.
pub const JUMP_TO_APP_TIMEOUT_MS: u32 = 200;

/// Back-door window at startup during which a CONNECT can still interrupt
/// the jump into the resident application.
pub const WAIT_AT_STARTUP_MS: u32 = 500;

/// Fixed flash address of the resident image header.
pub const APP_HEAD_ADDR: u32 = 0x0801_0000;
/// Fixed flash address of the application's reset vector table. Not
/// necessarily `APP_HEAD_ADDR + HEADER_SIZE` — vendor padding may intervene.
pub const APP_START_ADDR: u32 = 0x0801_0100;

/// On-flash size of the image header, re-exported from the protocol crate
/// so `config` remains the single place firmware code looks up sizing.
pub const HEADER_SIZE: usize = HEADER_SIZE_;

/// Erase/program granularity of the non-volatile store.
pub const PAGE_SIZE: usize = 2048;

/// Upper bound on `image_size` when `check-size` is enabled.
pub const APP_SIZE_MAX: u32 = 512 * 1024;

/// Upper bound on `sw_ver` when `check-sw-version` is enabled.
pub const SW_LIMIT: u32 = 0x0F00_0000;

/// Upper bound on `hw_ver` when `check-hw-version` is enabled.
pub const HW_LIMIT: u32 = 0x0F00_0000;

/// Reset count before `boot-counting` forces `boot_reason = COM` and erases
/// the resident header.
pub const BOOT_CNT_LIMIT: u8 = 5;

/// Reported in INFO_RSP.
pub const LOADER_VERSION: u32 = 0x0001_0000;

/// Written into the handoff region's `layout_version` field on every reset.
/// Bump when the 32-byte layout in `bootloader_protocol::handoff`
/// changes in a way the application needs to detect.
pub const HANDOFF_LAYOUT_VERSION: u8 = 1;

/// How long EXIT's success path waits for the OK response to finish
/// transmitting before clearing the handoff region and jumping.
pub const RESPONSE_DRAIN_MS: u32 = 5;
