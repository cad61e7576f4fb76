//! Architecture-specific half of "jump to application": the Cortex-M
//! mechanics a board support crate's `Platform::jump_to` calls into —
//! relocate the vector table, set `msp`, and branch.
//!
//! Compiled only on `target_arch = "arm"` — host unit tests never reach it,
//! they exercise [`crate::mock::MockPlatform::jump_to`] instead.

#![cfg(target_arch = "arm")]

use cortex_m::peripheral::SCB;

/// Point `VTOR` at the application's vector table and branch into it.
///
/// # Safety
/// `vector_table_addr` must be the address of a valid Cortex-M vector table
/// whose first two words are the initial stack pointer and the reset
/// handler address. The caller must have already run
/// `Platform::deinit_for_jump` so no peripheral is left in a state the
/// application doesn't expect.
pub unsafe fn jump_to_application(vector_table_addr: u32) -> ! {
    cortex_m::interrupt::disable();

    let scb = &*SCB::PTR;
    scb.vtor.write(vector_table_addr);

    let sp = core::ptr::read_volatile(vector_table_addr as *const u32);
    let reset_vector = core::ptr::read_volatile((vector_table_addr + 4) as *const u32);

    core::arch::asm!(
        "msr msp, {sp}",
        "bx {rv}",
        sp = in(reg) sp,
        rv = in(reg) reset_vector,
        options(noreturn)
    )
}
