//! Memory bus and address map.
//!
//! The 6507 exposes 13 address bits. A12 selects the cartridge; with A12
//! low, A7 splits the TIA (low) from the RIOT (high), and A9 splits RIOT
//! RAM from its I/O page. Everything else is mirroring: TIA writes decode
//! six address bits, TIA reads four, RIOT RAM seven, the RIOT I/O page
//! five, the cartridge twelve.
//!
//! CPU writes aimed at a chip land in that chip's one-slot inbox and are
//! consumed when the chip next services memory (the TIA does so once per
//! CPU cycle, on the third color clock). Reads are synchronous.
//!
//! The bus is also where each CPU cycle fans out to the rest of the
//! machine: [`VcsBus::cycle`] runs the cartridge and RIOT once and the TIA
//! three times, which makes it the implementation of the CPU's cycle sink.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vcs_core::cpu::Bus6507;
use vcs_core::logging::{log, LogCategory, LogLevel};

use crate::cartridge::Cartridge;
use crate::input::Input;
use crate::riot::Riot;
use crate::television::{Specification, Television, TelevisionError};
use crate::tia::{registers as tia_registers, Tia};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("unrecognised address {0:#06x}")]
    UnrecognisedAddress(u16),
    #[error("address {0:#06x} is not peekable")]
    UnpeekableAddress(u16),
    #[error("address {0:#06x} is not pokeable")]
    UnpokeableAddress(u16),
    #[error("unknown register name {0:?}")]
    UnknownRegisterName(String),
    #[error("chip write to register {reg:#04x} was never serviced")]
    UnservicedChipWrite { reg: u8 },
}

/// A write captured for a chip, waiting to be serviced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChipWrite {
    pub reg: u8,
    pub value: u8,
}

/// Which area of the address map an address decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    TiaWrite,
    TiaRead,
    RiotRam,
    RiotIo,
    Cartridge,
}

/// Canonical decode of a bus address: its area plus the lowest equivalent
/// (mirror-free) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedAddress {
    pub area: Area,
    pub canonical: u16,
    /// register offset within the area
    pub register: u8,
}

/// Decode an address the way the chips do. Pure, usable by debug tooling.
pub fn map_address(addr: u16, is_read: bool) -> MappedAddress {
    let addr = addr & 0x1FFF;

    if addr & 0x1000 != 0 {
        return MappedAddress {
            area: Area::Cartridge,
            canonical: 0x1000 | (addr & 0x0FFF),
            register: 0,
        };
    }
    if addr & 0x0080 == 0 {
        // TIA: six significant bits for writes, four for reads
        return if is_read {
            MappedAddress {
                area: Area::TiaRead,
                canonical: addr & 0x000F,
                register: (addr & 0x0F) as u8,
            }
        } else {
            MappedAddress {
                area: Area::TiaWrite,
                canonical: addr & 0x003F,
                register: (addr & 0x3F) as u8,
            }
        };
    }
    if addr & 0x0200 == 0 {
        return MappedAddress {
            area: Area::RiotRam,
            canonical: 0x0080 | (addr & 0x007F),
            register: (addr & 0x7F) as u8,
        };
    }
    MappedAddress {
        area: Area::RiotIo,
        canonical: 0x0280 | (addr & 0x001F),
        register: (addr & 0x1F) as u8,
    }
}

/// Snapshot of per-video-cycle internal state for external visualisation.
#[derive(Debug, Clone, Copy)]
pub struct Reflection {
    pub video_cycles: u64,
    pub line_clock: u16,
    pub hsync_count: u8,
    pub hblank: bool,
    pub wsync: bool,
    pub hmove_latch: bool,
    pub player0_position: u8,
    pub player1_position: u8,
    pub missile0_position: u8,
    pub missile1_position: u8,
    pub ball_position: u8,
}

impl Reflection {
    fn sample(tia: &Tia) -> Self {
        Self {
            video_cycles: tia.video_cycles(),
            line_clock: tia.line_clock(),
            hsync_count: tia.hsync_count(),
            hblank: tia.hblank(),
            wsync: tia.wsync(),
            hmove_latch: tia.hmove_latch(),
            player0_position: tia.video.player0.position(),
            player1_position: tia.video.player1.position(),
            missile0_position: tia.video.missile0.position(),
            missile1_position: tia.video.missile1.position(),
            ball_position: tia.video.ball.position(),
        }
    }
}

/// Reflection observer installed by the debugger.
pub struct ReflectionHook(pub Box<dyn FnMut(&Reflection)>);

impl std::fmt::Debug for ReflectionHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReflectionHook")
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VcsBus {
    pub tia: Tia,
    pub riot: Riot,
    pub input: Input,
    pub tv: Television,
    pub cartridge: Option<Cartridge>,

    tia_inbox: Option<ChipWrite>,
    riot_inbox: Option<ChipWrite>,

    /// machine cycles elapsed, WSYNC stall cycles included
    pub cycles: u64,

    #[serde(skip)]
    reflection: Option<ReflectionHook>,
}

impl VcsBus {
    pub fn new(spec: Specification) -> Self {
        Self {
            tia: Tia::new(),
            riot: Riot::new(),
            input: Input::new(),
            tv: Television::new(spec),
            cartridge: None,
            tia_inbox: None,
            riot_inbox: None,
            cycles: 0,
            reflection: None,
        }
    }

    pub fn reset(&mut self) {
        self.tia.reset();
        self.riot.reset();
        self.input.reset();
        self.tv.reset();
        self.tia_inbox = None;
        self.riot_inbox = None;
    }

    pub fn set_reflection(&mut self, hook: Option<ReflectionHook>) {
        self.reflection = hook;
    }

    fn tia_step(&mut self, service_memory: bool) {
        let result = self.tia.step(
            service_memory,
            &mut self.tia_inbox,
            &mut self.tv,
            &mut self.input,
        );
        // out-of-spec pictures are survivable; keep the machine running
        if let Err(TelevisionError::OutOfSpec { scanlines }) = result {
            log(LogCategory::Tv, LogLevel::Warn, || {
                format!("television out of spec: {} scanlines", scanlines)
            });
        }
        if let Some(hook) = &mut self.reflection {
            let snapshot = Reflection::sample(&self.tia);
            (hook.0)(&snapshot);
        }
    }

    // -- debugger paths ------------------------------------------------------

    /// Read without side effects. Fails on write-only areas.
    pub fn peek(&self, addr: u16) -> Result<u8, BusError> {
        let mapped = map_address(addr, true);
        match mapped.area {
            Area::TiaRead => {
                if mapped.register < 0x08 {
                    Ok(self.tia.read_register(mapped.register))
                } else if mapped.register <= 0x0D {
                    Ok(self.input.inpt(mapped.register - 0x08))
                } else {
                    Err(BusError::UnpeekableAddress(addr))
                }
            }
            Area::RiotRam => Ok(self.riot.ram_read(addr)),
            Area::RiotIo => Ok(self.riot.peek_register(mapped.register)),
            Area::Cartridge => match &self.cartridge {
                // peek through a clone so hot spots cannot fire
                Some(cart) => Ok(cart.clone().read(addr & 0x0FFF)),
                None => Err(BusError::UnrecognisedAddress(addr)),
            },
            Area::TiaWrite => Err(BusError::UnpeekableAddress(addr)),
        }
    }

    /// Write without enqueueing chip-write service. Strobes and read-only
    /// registers are not pokeable.
    pub fn poke(&mut self, addr: u16, value: u8) -> Result<(), BusError> {
        let mapped = map_address(addr, false);
        match mapped.area {
            Area::RiotRam => {
                self.riot.ram_write(addr, value);
                Ok(())
            }
            Area::Cartridge => match &mut self.cartridge {
                Some(cart) => {
                    cart.poke(addr & 0x0FFF, value)
                        .map_err(|_| BusError::UnpokeableAddress(addr))
                }
                None => Err(BusError::UnrecognisedAddress(addr)),
            },
            _ => Err(BusError::UnpokeableAddress(addr)),
        }
    }

    /// Resolve a TIA or RIOT register name to its canonical address.
    pub fn register_address(&self, name: &str) -> Result<u16, BusError> {
        let upper = name.to_uppercase();
        for reg in 0..=0x2C {
            if tia_registers::write_register_name(reg) == Some(upper.as_str()) {
                return Ok(reg as u16);
            }
        }
        let riot_names = [
            ("SWCHA", 0x0280u16),
            ("SWACNT", 0x0281),
            ("SWCHB", 0x0282),
            ("SWBCNT", 0x0283),
            ("INTIM", 0x0284),
            ("TIMINT", 0x0285),
            ("TIM1T", 0x0294),
            ("TIM8T", 0x0295),
            ("TIM64T", 0x0296),
            ("T1024T", 0x0297),
        ];
        for (n, a) in riot_names {
            if n == upper {
                return Ok(a);
            }
        }
        Err(BusError::UnknownRegisterName(name.to_string()))
    }
}

impl Bus6507 for VcsBus {
    fn read(&mut self, addr: u16) -> u8 {
        let addr = addr & 0x1FFF;
        if let Some(cart) = &mut self.cartridge {
            cart.listen(addr, 0);
        }

        let mapped = map_address(addr, true);
        match mapped.area {
            Area::TiaRead | Area::TiaWrite => {
                if mapped.register < 0x08 {
                    self.tia.read_register(mapped.register)
                } else {
                    self.input.inpt(mapped.register - 0x08)
                }
            }
            Area::RiotRam => self.riot.ram_read(addr),
            Area::RiotIo => self.riot.register_read(mapped.register),
            Area::Cartridge => match &mut self.cartridge {
                Some(cart) => cart.read(addr & 0x0FFF),
                None => {
                    log(LogCategory::Bus, LogLevel::Warn, || {
                        format!("read from empty cartridge slot at {:#06x}", addr)
                    });
                    0xFF
                }
            },
        }
    }

    fn write(&mut self, addr: u16, data: u8) {
        let addr = addr & 0x1FFF;
        if let Some(cart) = &mut self.cartridge {
            cart.listen(addr, data);
        }

        let mapped = map_address(addr, false);
        match mapped.area {
            Area::TiaWrite | Area::TiaRead => {
                if let Some(old) = self.tia_inbox.replace(ChipWrite {
                    reg: mapped.register,
                    value: data,
                }) {
                    log(LogCategory::Bus, LogLevel::Warn, || {
                        format!("chip write to {:#04x} replaced before service", old.reg)
                    });
                }
            }
            Area::RiotRam => self.riot.ram_write(addr, data),
            Area::RiotIo => {
                self.riot_inbox = Some(ChipWrite {
                    reg: mapped.register,
                    value: data,
                });
            }
            Area::Cartridge => {
                if let Some(cart) = &mut self.cartridge {
                    cart.write(addr & 0x0FFF, data);
                }
            }
        }
    }

    /// One CPU cycle: cartridge and RIOT once, TIA three times. A pending
    /// chip write is held through the first two color clocks and serviced
    /// on the third, after the CPU's bus activity for the cycle has
    /// settled.
    fn cycle(&mut self) {
        self.cycles += 1;

        if let Some(cart) = &mut self.cartridge {
            cart.step();
        }

        self.riot.step(&mut self.riot_inbox, &mut self.input);

        self.tia_step(false);
        self.tia_step(false);
        self.tia_step(true);
    }

    fn rdy(&self) -> bool {
        !self.tia.wsync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> VcsBus {
        VcsBus::new(Specification::Ntsc)
    }

    #[test]
    fn test_map_address_areas() {
        assert_eq!(map_address(0x0000, false).area, Area::TiaWrite);
        assert_eq!(map_address(0x0000, true).area, Area::TiaRead);
        assert_eq!(map_address(0x0080, false).area, Area::RiotRam);
        assert_eq!(map_address(0x0180, false).area, Area::RiotRam);
        assert_eq!(map_address(0x0280, false).area, Area::RiotIo);
        assert_eq!(map_address(0x1000, false).area, Area::Cartridge);
        // address lines above A12 are not connected
        assert_eq!(map_address(0xF000, false).area, Area::Cartridge);
    }

    #[test]
    fn test_mirror_canonicalisation() {
        // TIA write mirrors share the canonical register
        let a = map_address(0x0000, false);
        let b = map_address(0x0040, false);
        assert_eq!(a.canonical, b.canonical);

        // RIOT RAM mirrors at $80/$180
        let a = map_address(0x0080, false);
        let b = map_address(0x0180, false);
        assert_eq!(a.canonical, b.canonical);

        // RIOT I/O page repeats every 32 bytes
        let a = map_address(0x0284, true);
        let b = map_address(0x02A4, true);
        assert_eq!(a.canonical, b.canonical);
    }

    #[test]
    fn test_ram_read_write_through_mirrors() {
        let mut b = bus();
        b.write(0x0080, 0x12);
        assert_eq!(b.read(0x0080), 0x12);
        assert_eq!(b.read(0x0180), 0x12);
        b.write(0x0180, 0x34);
        assert_eq!(b.read(0x0080), 0x34);
    }

    #[test]
    fn test_stack_lands_in_riot_ram() {
        let mut b = bus();
        // SP pushes go to $0100 | sp; that page mirrors RIOT RAM
        b.write(0x01FD, 0x77);
        assert_eq!(b.read(0x00FD), 0x77);
    }

    #[test]
    fn test_tia_write_lands_in_inbox_and_services() {
        let mut b = bus();
        b.write(0x0006, 0x42); // COLUP0
        assert!(b.tia_inbox.is_some());

        b.cycle();
        assert!(b.tia_inbox.is_none());
        assert_eq!(b.tia.video.colup0, 0x42);
    }

    #[test]
    fn test_riot_write_services_on_cycle() {
        let mut b = bus();
        b.write(0x0296, 0x10); // TIM64T
        b.cycle();
        assert_eq!(b.riot.timer_value(), 0x10);
        assert_eq!(b.riot.timer_interval(), 64);
    }

    #[test]
    fn test_cycle_runs_three_color_clocks() {
        let mut b = bus();
        let before = b.tia.video_cycles();
        b.cycle();
        assert_eq!(b.tia.video_cycles() - before, 3);
    }

    #[test]
    fn test_missing_cartridge_reads_ff() {
        let mut b = bus();
        assert_eq!(b.read(0xF000), 0xFF);
    }

    #[test]
    fn test_peek_has_no_side_effects() {
        let mut b = bus();
        b.write(0x0294, 2); // TIM1T
        for _ in 0..3 {
            b.cycle();
        }
        assert!(b.riot.timer_expired());

        // peeking TIMINT leaves the latch alone
        assert_eq!(b.peek(0x0285).unwrap(), 0x80);
        assert!(b.riot.timer_expired());
        // a CPU read clears it
        assert_eq!(b.read(0x0285), 0x80);
        assert!(!b.riot.timer_expired());
    }

    #[test]
    fn test_poke_rejects_strobes() {
        let mut b = bus();
        assert!(matches!(
            b.poke(0x0002, 0), // WSYNC
            Err(BusError::UnpokeableAddress(_))
        ));
        assert!(b.poke(0x0080, 0x99).is_ok());
        assert_eq!(b.peek(0x0080).unwrap(), 0x99);
    }

    #[test]
    fn test_register_name_lookup() {
        let b = bus();
        assert_eq!(b.register_address("wsync").unwrap(), 0x0002);
        assert_eq!(b.register_address("TIM64T").unwrap(), 0x0296);
        assert!(matches!(
            b.register_address("NOTAREG"),
            Err(BusError::UnknownRegisterName(_))
        ));
    }

    #[test]
    fn test_rdy_follows_wsync() {
        let mut b = bus();
        assert!(b.rdy());
        b.write(0x0002, 0); // WSYNC strobe
        b.cycle();
        assert!(!b.rdy());
    }
}
