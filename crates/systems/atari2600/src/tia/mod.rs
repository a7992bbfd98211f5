//! Television Interface Adapter.
//!
//! The TIA runs three color clocks per CPU cycle and generates the video
//! signal in lockstep with the television's electron beam. Everything in
//! here is driven from [`Tia::step`], one call per color clock:
//!
//! 1. service a pending CPU write with immediate effect (VSYNC, VBLANK,
//!    WSYNC, RSYNC, HMOVE)
//! 2. tick the two-phase clock
//! 3. tick the delay queue and dispatch anything that fired
//! 4. on the Phi2 edge, tick the HSYNC counter and schedule its decoded
//!    events
//! 5. service position strobes and the remaining video/audio registers
//!    (these need the post-tick HBLANK and latch state)
//! 6. move sprites, including HMOVE clock stuffing
//! 7. resolve the pixel, fold collisions, and send the signal to the
//!    television
//!
//! The HSYNC counter reaches value C at color clock 4C of the scanline.
//! The new-scanline event is decoded at count 56 and latched three clocks,
//! firing on the last clock of the 228-clock line; WSYNC releases RDY at
//! the count 56 decode itself, which is what gives a WSYNC written at
//! clock 0 its characteristic 225-clock stall.

pub mod audio;
pub mod delay;
pub mod video;

use serde::{Deserialize, Serialize};
use vcs_core::logging::{log, LogCategory, LogLevel};

use crate::bus::ChipWrite;
use crate::input::Input;
use crate::television::{SignalAttributes, Television, TelevisionError};

use audio::Audio;
use delay::{DelayQueue, Target};
use video::Video;

/// TIA write register addresses (canonical, low six address bits).
pub mod registers {
    pub const VSYNC: u8 = 0x00;
    pub const VBLANK: u8 = 0x01;
    pub const WSYNC: u8 = 0x02;
    pub const RSYNC: u8 = 0x03;
    pub const NUSIZ0: u8 = 0x04;
    pub const NUSIZ1: u8 = 0x05;
    pub const COLUP0: u8 = 0x06;
    pub const COLUP1: u8 = 0x07;
    pub const COLUPF: u8 = 0x08;
    pub const COLUBK: u8 = 0x09;
    pub const CTRLPF: u8 = 0x0A;
    pub const REFP0: u8 = 0x0B;
    pub const REFP1: u8 = 0x0C;
    pub const PF0: u8 = 0x0D;
    pub const PF1: u8 = 0x0E;
    pub const PF2: u8 = 0x0F;
    pub const RESP0: u8 = 0x10;
    pub const RESP1: u8 = 0x11;
    pub const RESM0: u8 = 0x12;
    pub const RESM1: u8 = 0x13;
    pub const RESBL: u8 = 0x14;
    pub const AUDC0: u8 = 0x15;
    pub const AUDC1: u8 = 0x16;
    pub const AUDF0: u8 = 0x17;
    pub const AUDF1: u8 = 0x18;
    pub const AUDV0: u8 = 0x19;
    pub const AUDV1: u8 = 0x1A;
    pub const GRP0: u8 = 0x1B;
    pub const GRP1: u8 = 0x1C;
    pub const ENAM0: u8 = 0x1D;
    pub const ENAM1: u8 = 0x1E;
    pub const ENABL: u8 = 0x1F;
    pub const HMP0: u8 = 0x20;
    pub const HMP1: u8 = 0x21;
    pub const HMM0: u8 = 0x22;
    pub const HMM1: u8 = 0x23;
    pub const HMBL: u8 = 0x24;
    pub const VDELP0: u8 = 0x25;
    pub const VDELP1: u8 = 0x26;
    pub const VDELBL: u8 = 0x27;
    pub const RESMP0: u8 = 0x28;
    pub const RESMP1: u8 = 0x29;
    pub const HMOVE: u8 = 0x2A;
    pub const HMCLR: u8 = 0x2B;
    pub const CXCLR: u8 = 0x2C;

    /// Printable name for a write register, for the debugger.
    pub fn write_register_name(reg: u8) -> Option<&'static str> {
        const NAMES: [&str; 0x2D] = [
            "VSYNC", "VBLANK", "WSYNC", "RSYNC", "NUSIZ0", "NUSIZ1", "COLUP0", "COLUP1", "COLUPF",
            "COLUBK", "CTRLPF", "REFP0", "REFP1", "PF0", "PF1", "PF2", "RESP0", "RESP1", "RESM0",
            "RESM1", "RESBL", "AUDC0", "AUDC1", "AUDF0", "AUDF1", "AUDV0", "AUDV1", "GRP0", "GRP1",
            "ENAM0", "ENAM1", "ENABL", "HMP0", "HMP1", "HMM0", "HMM1", "HMBL", "VDELP0", "VDELP1",
            "VDELBL", "RESMP0", "RESMP1", "HMOVE", "HMCLR", "CXCLR",
        ];
        NAMES.get(reg as usize).copied()
    }
}

/// Color clocks per scanline.
pub const CLOCKS_PER_SCANLINE: u16 = 228;
/// Color clocks of horizontal blank at the start of each scanline.
pub const HBLANK_CLOCKS: u16 = 68;

/// Latch depth for most scheduled HSYNC events.
const HSYNC_DELAY: u8 = 3;
/// Latch depth for the HBLANK reset; one deeper so the first visible pixel
/// lands on clock 68 (76 with the HMOVE latch set).
const HBLANK_DELAY: u8 = 4;

/// Two-phase clock. Four states per period; the HSYNC counter advances on
/// the rising edge of Phi2, once every four color clocks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pclk {
    phase: u8,
}

impl Pclk {
    fn new() -> Self {
        // first tick of the first color clock lands on the Phi2 edge
        Self { phase: 1 }
    }

    fn tick(&mut self) {
        self.phase = (self.phase + 1) & 0x03;
    }

    pub fn phi1(&self) -> bool {
        self.phase == 0
    }

    pub fn phi2(&self) -> bool {
        self.phase == 2
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tia {
    pclk: Pclk,
    /// HSYNC counter, 0..56
    hsync: u8,
    /// color clock within the current scanline
    line_clock: u16,
    line_reset: bool,

    hblank: bool,
    wsync: bool,
    hmove_latch: bool,
    /// HMOVE ripple counter, Some(0..=15) while clock stuffing is active
    hmove_ct: Option<u8>,
    rsync_pending: bool,

    vsync: bool,
    vblank: u8,

    delay: DelayQueue,
    pub video: Video,
    pub audio: Audio,

    sig: SignalAttributes,
    video_cycles: u64,
}

impl Default for Tia {
    fn default() -> Self {
        Self::new()
    }
}

impl Tia {
    pub fn new() -> Self {
        Self {
            pclk: Pclk::new(),
            // power up at the tail of a line so the first color clock runs
            // the counter wrap and starts a fresh scanline
            hsync: 56,
            line_clock: 0,
            line_reset: true,
            hblank: true,
            wsync: false,
            hmove_latch: false,
            hmove_ct: None,
            rsync_pending: false,
            vsync: false,
            vblank: 0,
            delay: DelayQueue::new(),
            video: Video::new(),
            audio: Audio::new(),
            sig: SignalAttributes::default(),
            video_cycles: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// State of the WSYNC latch; RDY to the CPU is its inverse.
    pub fn wsync(&self) -> bool {
        self.wsync
    }

    pub fn hblank(&self) -> bool {
        self.hblank
    }

    pub fn hmove_latch(&self) -> bool {
        self.hmove_latch
    }

    pub fn hsync_count(&self) -> u8 {
        self.hsync
    }

    pub fn line_clock(&self) -> u16 {
        self.line_clock
    }

    pub fn video_cycles(&self) -> u64 {
        self.video_cycles
    }

    pub fn vsync_active(&self) -> bool {
        self.vsync
    }

    pub fn vblank_active(&self) -> bool {
        self.vblank & 0x02 != 0
    }

    /// Read register value (collision latches; the input registers are
    /// routed to [`Input`] by the bus).
    pub fn read_register(&self, reg: u8) -> u8 {
        self.video.collisions.register(reg)
    }

    /// One color clock.
    ///
    /// `service_memory` selects the clock on which a pending CPU write may
    /// be consumed (the third color clock of each CPU cycle). The
    /// television is borrowed for the duration of the step; the TIA holds
    /// no reference to it otherwise.
    pub fn step(
        &mut self,
        service_memory: bool,
        inbox: &mut Option<ChipWrite>,
        tv: &mut Television,
        input: &mut Input,
    ) -> Result<(), TelevisionError> {
        self.video_cycles += 1;
        if self.line_reset {
            self.line_reset = false;
            self.line_clock = 0;
        } else {
            self.line_clock += 1;
        }

        let mut pending = if service_memory { inbox.take() } else { None };

        // immediate-effect registers
        if let Some(w) = pending {
            if self.service_immediate(w, input) {
                pending = None;
            }
        }

        self.pclk.tick();

        let fired = self.delay.tick();
        for (target, value) in fired.iter() {
            self.dispatch(target, value);
        }

        if self.pclk.phi2() {
            self.hsync_tick();
        }

        // remaining register groups; position strobes need the post-tick
        // HBLANK and HMOVE latch state
        if let Some(w) = pending {
            if self.video.update_playfield(&mut self.delay, &w) {
                pending = None;
            }
        }
        if let Some(w) = pending {
            if self
                .video
                .update_positioning(&mut self.delay, &w, self.hblank)
            {
                pending = None;
            }
        }
        if let Some(w) = pending {
            if self.video.update_registers(&mut self.delay, &w) {
                pending = None;
            }
        }
        if let Some(w) = pending {
            if self.audio.update_registers(&w) {
                pending = None;
            }
        }
        if let Some(w) = pending {
            log(LogCategory::Tia, LogLevel::Warn, || {
                format!("unserviced write to register {:#04x}", w.reg)
            });
        }

        // sprite movement and HMOVE clock stuffing
        let motion_clock = self.pclk.phi2();
        self.video
            .tick_sprites(!self.hblank, motion_clock, self.hmove_ct);
        if motion_clock {
            if let Some(ct) = self.hmove_ct {
                self.hmove_ct = if ct >= 15 { None } else { Some(ct + 1) };
            }
        }

        // pixel resolution; the alt pixel carries the resolved color even
        // inside the blanking intervals so debug overlays can see sprites
        let visible_pixel = if (HBLANK_CLOCKS..CLOCKS_PER_SCANLINE).contains(&self.line_clock) {
            Some((self.line_clock - HBLANK_CLOCKS) as u8)
        } else {
            None
        };
        let (color, element) = self.video.pixel(visible_pixel);
        self.sig.pixel = if self.hblank { None } else { Some(color) };
        self.sig.alt_pixel = element.alt_color();

        let (audio_update, audio_data) = self.audio.mix(self.line_clock);
        self.sig.audio_update = audio_update;
        self.sig.audio_data = audio_data;

        self.sig.vsync = self.vsync;
        self.sig.vblank = self.vblank & 0x02 != 0;
        self.sig.hblank = self.hblank;

        let result = tv.signal(self.sig);
        self.sig.new_scanline = false;
        result
    }

    /// Registers with immediate effect. Returns true when consumed.
    fn service_immediate(&mut self, w: ChipWrite, input: &mut Input) -> bool {
        match w.reg {
            registers::VSYNC => self.vsync = w.value & 0x02 != 0,
            registers::VBLANK => {
                self.vblank = w.value;
                input.set_vblank_bits(w.value);
            }
            registers::WSYNC => self.wsync = true,
            registers::RSYNC => {
                self.hsync = 0;
                self.rsync_pending = true;
                self.delay.schedule(HSYNC_DELAY, Target::NewScanline, 0);
            }
            registers::HMOVE => {
                self.hmove_latch = true;
                self.hmove_ct = Some(0);
                self.video.start_hmove();
            }
            _ => return false,
        }
        true
    }

    /// Fire a delayed event.
    fn dispatch(&mut self, target: Target, value: u8) {
        match target {
            Target::HsyncOff => self.sig.hsync = false,
            Target::ColorBurstOff => self.sig.cburst = false,
            Target::HblankOff => self.hblank = false,
            Target::NewScanline => {
                if self.rsync_pending {
                    self.rsync_pending = false;
                    self.wsync = false;
                }
                self.sig.new_scanline = true;
                self.line_reset = true;
            }
            _ => self.video.dispatch(target, value),
        }
    }

    /// Decoded HSYNC counter events, on the rising edge of Phi2.
    fn hsync_tick(&mut self) {
        self.hsync = (self.hsync + 1) % 57;

        match self.hsync {
            0 => {
                // [SHB] counter wrap: blank starts, the HMOVE latch drops
                self.hblank = true;
                self.hmove_latch = false;
                self.sig.cburst = true;
            }
            4 => self.sig.hsync = true, // [SHS]
            8 => self.delay.schedule(HSYNC_DELAY, Target::HsyncOff, 0), // [RHS]
            12 => self.delay.schedule(HSYNC_DELAY, Target::ColorBurstOff, 0), // [RCB]
            16 => {
                // [RHB] early HBLANK reset
                if !self.hmove_latch {
                    self.delay.schedule(HBLANK_DELAY, Target::HblankOff, 0);
                }
            }
            18 => {
                // [LRHB] late HBLANK reset, eight clocks further on
                if self.hmove_latch {
                    self.delay.schedule(HBLANK_DELAY, Target::HblankOff, 0);
                }
            }
            56 => {
                // [SHB decode] release the CPU; the television line event
                // follows after the usual latching
                self.wsync = false;
                if !self.rsync_pending {
                    self.delay.schedule(HSYNC_DELAY, Target::NewScanline, 0);
                }
            }
            _ => {}
        }
    }
}
