//! Handoff-region lifecycle: boot reason and boot-count bookkeeping
//! shared with the application across reset.

use bootloader_protocol::{BootReason, HandoffRegion, HANDOFF_SIZE};

use crate::config::BOOT_CNT_LIMIT;

/// Raw access to the non-initialized memory holding the handoff region.
/// Kept separate from [`crate::platform::Platform`] because the region is a
/// fixed memory address shared by construction, not an I/O channel —
/// modeling it as its own small trait keeps the mock in tests a plain
/// byte buffer instead of routing through the transport/flash mock too.
pub trait HandoffStore {
    fn read_raw(&mut self) -> [u8; HANDOFF_SIZE];
    fn write_raw(&mut self, bytes: &[u8; HANDOFF_SIZE]);
}

pub struct HandoffManager<S: HandoffStore> {
    store: S,
    current: HandoffRegion,
    /// Set by [`Self::init`] when `boot-counting` tripped on this reset; the
    /// entry dispatcher must erase the resident header before doing
    /// anything else with it.
    header_erase_required: bool,
}

impl<S: HandoffStore> HandoffManager<S> {
    /// Run the reset-time handoff routine: CRC-check the region,
    /// increment `boot_count` (saturating) on a valid region, reset it to
    /// defaults on an invalid one, then rewrite layout/boot version and
    /// recompute the CRC.
    pub fn init(mut store: S, layout_version: u8, boot_version: u32) -> Self {
        let raw = store.read_raw();
        let mut region = match HandoffRegion::decode(&raw) {
            Ok(region) => {
                #[cfg(not(test))]
                defmt::info!("handoff: valid region, boot_count={}", region.boot_count);
                HandoffRegion {
                    boot_count: region.boot_count.saturating_add(1),
                    ..region
                }
            }
            Err(_) => {
                #[cfg(not(test))]
                defmt::warn!("handoff: invalid region, resetting to defaults");
                HandoffRegion {
                    layout_version,
                    boot_version,
                    boot_reason: BootReason::None,
                    boot_count: 0,
                }
            }
        };
        region.layout_version = layout_version;
        region.boot_version = boot_version;

        let mut header_erase_required = false;
        #[cfg(feature = "boot-counting")]
        if region.boot_count >= BOOT_CNT_LIMIT {
            #[cfg(not(test))]
            defmt::warn!("handoff: boot_count reached limit, forcing COM and erasing header");
            region.boot_reason = BootReason::Com;
            header_erase_required = true;
        }

        let mut out = Self {
            store,
            current: region,
            header_erase_required,
        };
        out.write_back();
        out
    }

    /// Take the one-shot "erase the resident header" requirement from a
    /// tripped boot counter. Returns `true` at most once per reset.
    pub fn take_header_erase_required(&mut self) -> bool {
        core::mem::take(&mut self.header_erase_required)
    }

    fn write_back(&mut self) {
        let mut buf = [0u8; HANDOFF_SIZE];
        self.current.encode(&mut buf);
        self.store.write_raw(&buf);
    }

    pub fn boot_reason(&self) -> BootReason {
        self.current.boot_reason
    }

    pub fn boot_count(&self) -> u8 {
        self.current.boot_count
    }

    /// Mark the region so a future reset knows a manager session is
    /// expected (back-door window or explicit CONNECT).
    pub fn mark_com(&mut self) {
        self.current.boot_reason = BootReason::Com;
        self.write_back();
    }

    /// Clear to defaults after a successful EXIT/jump.
    pub fn clear_on_jump(&mut self) {
        self.current.boot_reason = BootReason::None;
        self.current.boot_count = 0;
        self.write_back();
    }
}
