//! Status taxonomy reported on the wire. A bitmask: independent
//! pre/post-validation predicates OR together into a single response byte.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Status: u8 {
        const OK              = 0x00;
        const VALIDATION      = 0x01;
        const INVALID_REQUEST = 0x02;
        const FLASH_WRITE     = 0x04;
        const FLASH_ERASE     = 0x08;
        const FW_SIZE         = 0x10;
        const FW_VER          = 0x20;
        const HW_VER          = 0x40;
        const SIGNATURE       = 0x80;
    }
}

impl Status {
    pub const fn is_ok(self) -> bool {
        self.bits() == Self::OK.bits()
    }
}
