//! Upgrade finite state machine and entry dispatcher. `Loader`
//! owns every piece of process-wide state as fields instead of globals —
//! parser, flashing context, FSM state, handoff manager — behind a single
//! `handle()` step the caller pumps cooperatively.

use bootloader_protocol::{BootReason, Command, ImageHeader, Message, Source, Status, HEADER_LEN, HEADER_SIZE};

use crate::config::{self, DATA_PAYLOAD_SIZE};
use crate::handoff::{HandoffManager, HandoffStore};
use crate::parser::{FrameParser, ParserEvent};
use crate::pipeline;
use crate::platform::{Crypto, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum UpgradeState {
    Idle,
    Prepare,
    Flash,
    Exit,
}

/// RAM-only bookkeeping for an in-progress FLASH sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashingContext {
    pub working_addr: u32,
    pub flashed_bytes: u32,
    pub image_size: u32,
}

/// The upgrade loader. Generic over the three external-collaborator traits;
/// a board support crate supplies concrete `P`/`C`/`S` and drives
/// [`Self::run_from_reset`] forever.
pub struct Loader<P: Platform, C: Crypto, S: HandoffStore> {
    platform: P,
    crypto: C,
    parser: FrameParser,
    handoff: HandoffManager<S>,
    state: UpgradeState,
    state_entered_ms: u32,
    /// Timestamp of the most recently received byte, independent of whether
    /// it completed a frame — FLASH's idle timeout is measured from this,
    /// not from state entry.
    last_rx_ms: u32,
    idle_jump_attempted: bool,
    flashing: FlashingContext,
}

impl<P: Platform, C: Crypto, S: HandoffStore> Loader<P, C, S> {
    pub fn new(mut platform: P, crypto: C, handoff: HandoffManager<S>) -> Self {
        let now = platform.now_ms();
        Self {
            platform,
            crypto,
            parser: FrameParser::new(),
            handoff,
            state: UpgradeState::Idle,
            state_entered_ms: now,
            last_rx_ms: now,
            idle_jump_attempted: false,
            flashing: FlashingContext::default(),
        }
    }

    pub fn state(&self) -> UpgradeState {
        self.state
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn handoff(&self) -> &HandoffManager<S> {
        &self.handoff
    }

    /// Entry dispatcher. Runs once after handoff and capability init;
    /// never returns — either [`Self::attempt_entry_jump`] jumps straight
    /// into the resident application, or execution falls into the FSM loop
    /// forever.
    pub fn run_from_reset(&mut self) -> ! {
        self.attempt_entry_jump();
        self.run()
    }

    /// The decision half of the entry dispatcher, split out from
    /// [`Self::run_from_reset`] so it can be exercised without the
    /// never-returning FSM loop attached (tests call this directly).
    fn attempt_entry_jump(&mut self) {
        if self.handoff.take_header_erase_required() {
            self.erase_resident_header();
        }

        if self.handoff.boot_reason() == BootReason::None {
            let status = pipeline::post_validate(&mut self.platform, &self.crypto);
            if status.is_ok() {
                self.back_door_wait(config::WAIT_AT_STARTUP_MS);
                if self.handoff.boot_reason() == BootReason::None {
                    self.handoff.clear_on_jump();
                    pipeline::jump(&mut self.platform, config::APP_START_ADDR);
                }
            }
        }
    }

    /// Pump [`Self::handle`] forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.handle();
        }
    }

    /// One cooperative step: drain received bytes into the parser, check
    /// timeouts, and run whatever FSM activity the current state calls for.
    pub fn handle(&mut self) {
        while let Some(byte) = self.platform.rx_byte() {
            let now = self.platform.now_ms();
            self.last_rx_ms = now;
            let event = self.parser.push_byte(byte, now);
            self.on_parser_event(event);
        }

        let now = self.platform.now_ms();
        if let Some(event) = self.parser.poll_timeout(now) {
            self.on_parser_event(event);
        }

        self.run_idle_jump_attempt(now);
        self.run_state_timeout(now);
    }

    fn on_parser_event(&mut self, event: ParserEvent) {
        match event {
            ParserEvent::Pending => {}
            ParserEvent::Frame => {
                let mut payload_buf = [0u8; DATA_PAYLOAD_SIZE];
                let (source, command, len) = {
                    let msg = self.parser.take_frame();
                    let len = msg.payload.len();
                    payload_buf[..len].copy_from_slice(msg.payload);
                    (msg.source, msg.command, len)
                };
                self.parser.consume();
                // Request messages from the loader's own role and response
                // messages from the manager's role are accepted but do not
                // drive the FSM — only the manager role is built here.
                if source == Source::Manager {
                    self.dispatch(command, &payload_buf[..len]);
                }
            }
            ParserEvent::CrcError | ParserEvent::Timeout => {
                #[cfg(not(test))]
                defmt::warn!("parser: {}", event);
            }
            ParserEvent::Full => {
                self.platform.clear_rx();
                #[cfg(not(test))]
                defmt::warn!("parser: receive buffer full, discarding");
            }
        }
    }

    fn dispatch(&mut self, command: Command, payload: &[u8]) {
        match command {
            Command::Connect => self.handle_connect(),
            Command::Prepare => self.handle_prepare(payload),
            Command::Flash => self.handle_flash(payload),
            Command::Exit => self.handle_exit(),
            Command::Info => self.handle_info(),
            Command::ConnectRsp
            | Command::PrepareRsp
            | Command::FlashRsp
            | Command::ExitRsp
            | Command::InfoRsp => {}
        }
    }

    fn handle_connect(&mut self) {
        if self.state == UpgradeState::Idle {
            #[cfg(not(test))]
            defmt::info!("fsm: accepted CONNECT");
            self.handoff.mark_com();
            self.transition_to(UpgradeState::Prepare);
            self.respond(Command::Connect, Status::OK, &[]);
        } else {
            self.erase_resident_header();
            self.transition_to(UpgradeState::Idle);
            self.respond(Command::Connect, Status::INVALID_REQUEST, &[]);
        }
    }

    fn handle_prepare(&mut self, payload: &[u8]) {
        if self.state != UpgradeState::Prepare {
            // Wrong-state PREPARE leaves the FSM and resident header alone,
            // unlike the other three commands' "elsewhere" handling.
            self.respond(Command::Prepare, Status::INVALID_REQUEST, &[]);
            return;
        }

        let header = match ImageHeader::decode(payload) {
            Ok(header) => header,
            Err(_) => {
                self.transition_to(UpgradeState::Idle);
                self.respond(Command::Prepare, Status::VALIDATION, &[]);
                return;
            }
        };

        let resident = self.read_resident_header();
        let public_key = *self.platform.public_key();
        let status = pipeline::pre_validate(&header, resident.as_ref(), &self.crypto, &public_key);
        if !status.is_ok() {
            // Pre-validation runs before any erase begins, so a rejected
            // header leaves the resident image untouched.
            self.transition_to(UpgradeState::Idle);
            self.respond(Command::Prepare, status, &[]);
            return;
        }

        let total_len = HEADER_SIZE + header.image_size as usize;
        if pipeline::flash_prepare(&mut self.platform, header.image_addr, total_len).is_err() {
            // An erase has now started; the resident header is no longer
            // trustworthy even if it physically survived.
            self.erase_resident_header();
            self.transition_to(UpgradeState::Idle);
            self.respond(Command::Prepare, Status::FLASH_ERASE, &[]);
            return;
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        header.encode(&mut header_bytes);
        if self.platform.flash_write(header.image_addr, &header_bytes).is_err() {
            self.erase_resident_header();
            self.transition_to(UpgradeState::Idle);
            self.respond(Command::Prepare, Status::FLASH_WRITE, &[]);
            return;
        }

        self.flashing = FlashingContext {
            working_addr: header.image_addr + HEADER_SIZE as u32,
            flashed_bytes: 0,
            image_size: header.image_size,
        };
        #[cfg(not(test))]
        defmt::info!("fsm: accepted PREPARE, image_size={}", header.image_size);
        self.transition_to(UpgradeState::Flash);
        self.respond(Command::Prepare, Status::OK, &[]);
    }

    fn handle_flash(&mut self, payload: &[u8]) {
        let was_in_flash = self.state == UpgradeState::Flash;
        if !was_in_flash || self.flashing.flashed_bytes >= self.flashing.image_size {
            let status = if was_in_flash { Status::FLASH_WRITE } else { Status::INVALID_REQUEST };
            self.erase_resident_header();
            self.transition_to(UpgradeState::Idle);
            self.respond(Command::Flash, status, &[]);
            return;
        }

        let n = payload.len();
        let write_ok = {
            #[cfg(feature = "decrypt")]
            {
                let mut scratch = [0u8; DATA_PAYLOAD_SIZE];
                self.platform.decrypt_stream(payload, &mut scratch[..n]);
                self.platform.flash_write(self.flashing.working_addr, &scratch[..n]).is_ok()
            }
            #[cfg(not(feature = "decrypt"))]
            {
                self.platform.flash_write(self.flashing.working_addr, payload).is_ok()
            }
        };

        if !write_ok {
            self.erase_resident_header();
            self.transition_to(UpgradeState::Idle);
            self.respond(Command::Flash, Status::FLASH_WRITE, &[]);
            return;
        }

        self.flashing.working_addr += n as u32;
        self.flashing.flashed_bytes += n as u32;
        self.platform.kick_watchdog();

        #[cfg(not(test))]
        defmt::info!("fsm: accepted FLASH, flashed_bytes={}", self.flashing.flashed_bytes);
        if self.flashing.flashed_bytes == self.flashing.image_size {
            self.transition_to(UpgradeState::Exit);
        }
        self.respond(Command::Flash, Status::OK, &[]);
    }

    fn handle_exit(&mut self) {
        if self.state != UpgradeState::Exit {
            self.erase_resident_header();
            self.transition_to(UpgradeState::Idle);
            self.respond(Command::Exit, Status::INVALID_REQUEST, &[]);
            return;
        }

        let status = pipeline::post_validate(&mut self.platform, &self.crypto);
        if status.is_ok() {
            #[cfg(not(test))]
            defmt::info!("fsm: accepted EXIT, jumping to application");
            self.respond(Command::Exit, Status::OK, &[]);
            self.busy_wait_ms(config::RESPONSE_DRAIN_MS);
            self.handoff.clear_on_jump();
            pipeline::jump(&mut self.platform, config::APP_START_ADDR);
        } else {
            self.erase_resident_header();
            self.transition_to(UpgradeState::Idle);
            self.respond(Command::Exit, status, &[]);
        }
    }

    fn handle_info(&mut self) {
        if self.state != UpgradeState::Idle {
            self.respond(Command::Info, Status::INVALID_REQUEST, &[]);
            return;
        }
        let version = config::LOADER_VERSION.to_le_bytes();
        self.respond(Command::Info, Status::OK, &version);
    }

    fn run_idle_jump_attempt(&mut self, now: u32) {
        if self.state != UpgradeState::Idle || self.idle_jump_attempted {
            return;
        }
        if now.wrapping_sub(self.state_entered_ms) < config::JUMP_TO_APP_TIMEOUT_MS {
            return;
        }
        self.idle_jump_attempted = true;

        let status = pipeline::post_validate(&mut self.platform, &self.crypto);
        if status.is_ok() {
            self.handoff.clear_on_jump();
            pipeline::jump(&mut self.platform, config::APP_START_ADDR);
        }
    }

    fn run_state_timeout(&mut self, now: u32) {
        let timed_out = match self.state {
            UpgradeState::Idle => false,
            UpgradeState::Prepare => now.wrapping_sub(self.state_entered_ms) >= config::PREPARE_IDLE_TIMEOUT_MS,
            UpgradeState::Flash => now.wrapping_sub(self.last_rx_ms) >= config::FLASH_IDLE_TIMEOUT_MS,
            UpgradeState::Exit => now.wrapping_sub(self.state_entered_ms) >= config::EXIT_IDLE_TIMEOUT_MS,
        };
        if timed_out {
            self.erase_resident_header();
            self.transition_to(UpgradeState::Idle);
        }
    }

    fn transition_to(&mut self, state: UpgradeState) {
        #[cfg(not(test))]
        defmt::info!("fsm: {} -> {}", self.state, state);
        self.state = state;
        let now = self.platform.now_ms();
        self.state_entered_ms = now;
        self.last_rx_ms = now;
        if state == UpgradeState::Idle {
            self.flashing = FlashingContext::default();
            self.idle_jump_attempted = false;
            self.platform.decrypt_reset();
        }
    }

    fn read_resident_header(&mut self) -> Option<ImageHeader> {
        let mut buf = [0u8; HEADER_SIZE];
        self.platform.flash_read(config::APP_HEAD_ADDR, &mut buf).ok()?;
        ImageHeader::decode(&buf).ok()
    }

    fn erase_resident_header(&mut self) {
        let _ = self.platform.flash_erase(config::APP_HEAD_ADDR, config::PAGE_SIZE);
    }

    fn respond(&mut self, command: Command, status: Status, payload: &[u8]) {
        let msg = Message::new(Source::Loader, command.response(), status, payload);
        let mut buf = [0u8; HEADER_LEN + DATA_PAYLOAD_SIZE];
        if let Ok(n) = msg.encode(&mut buf) {
            let _ = self.platform.tx_all(&buf[..n]);
        }
    }

    /// Pump `handle()` for `ms` milliseconds, kicking the watchdog each
    /// iteration.
    fn busy_wait_ms(&mut self, ms: u32) {
        let start = self.platform.now_ms();
        loop {
            self.handle();
            self.platform.kick_watchdog();
            if self.platform.now_ms().wrapping_sub(start) >= ms {
                return;
            }
        }
    }

    /// The startup back-door window: identical pumping loop to
    /// [`Self::busy_wait_ms`], but exits early the moment a CONNECT sets
    /// `boot_reason` away from `NONE`.
    fn back_door_wait(&mut self, ms: u32) {
        let start = self.platform.now_ms();
        loop {
            self.handle();
            self.platform.kick_watchdog();
            if self.handoff.boot_reason() != BootReason::None {
                return;
            }
            if self.platform.now_ms().wrapping_sub(start) >= ms {
                return;
            }
        }
    }
}
