//! Upgrade bootloader core: frame parser, upgrade FSM, image pipeline, and
//! handoff-region lifecycle. Platform, flash, watchdog, clock and crypto are
//! all external collaborators consumed through the [`platform`] traits —
//! this crate owns only the protocol-driven behavior on top of them.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod fsm;
pub mod handoff;
#[cfg(test)]
pub mod mock;
pub mod parser;
pub mod pipeline;
pub mod platform;

pub use fsm::{Loader, UpgradeState};
pub use handoff::{HandoffManager, HandoffStore};
pub use parser::{FrameParser, ParserEvent};
pub use platform::{Crypto, Platform, Sha256Hasher};
