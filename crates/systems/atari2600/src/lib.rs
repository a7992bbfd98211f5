//! Cycle-accurate Atari 2600 (VCS) emulation core.
//!
//! The VCS is a 6507 CPU, the TIA video/audio chip and the 6532 RIOT,
//! glued together by a 13-bit bus and whatever cartridge is in the slot.
//! Correctness here is defined at the color-clock level: three TIA clocks
//! elapse per CPU cycle, chip writes are serviced at precise sub-cycle
//! points, and the TIA can hold the CPU's RDY line down mid-instruction.
//!
//! # Architecture
//!
//! [`Vcs`] owns a [`vcs_core::cpu::Cpu6507`] whose bus is the whole rest
//! of the machine ([`bus::VcsBus`]): TIA, RIOT, input, television and
//! cartridge. The CPU core calls back into the bus after every one of its
//! bus accesses; that callback is where the machine advances:
//!
//! 1. cartridge clock
//! 2. RIOT (timer tick, port re-latch, analog input charge)
//! 3. TIA color clock
//! 4. TIA color clock
//! 5. TIA color clock, servicing a pending chip write
//!
//! While the TIA holds WSYNC the CPU keeps emitting those cycles without
//! advancing its own state, so a WSYNC stall stretches the instruction
//! that caused it, exactly as the RDY pin behaves.
//!
//! # Example
//!
//! ```no_run
//! use vcs_atari2600::{Vcs, television::Specification};
//!
//! let mut vcs = Vcs::new(Specification::Ntsc);
//! vcs.attach_cartridge(std::fs::read("game.a26").unwrap()).unwrap();
//! let frame = vcs.run_frame().unwrap();
//! assert_eq!(frame.width, 160);
//! ```

pub mod bus;
pub mod cartridge;
pub mod debug;
pub mod input;
pub mod patch;
pub mod riot;
pub mod television;
pub mod tia;

use serde_json::{json, Value};
use thiserror::Error;
use vcs_core::cpu::result::LastResult;
use vcs_core::cpu::{Cpu6507, CpuError};
use vcs_core::logging::{log, LogCategory, LogLevel};
pub use vcs_core::types::Frame;

use bus::{BusError, ReflectionHook, VcsBus};
use cartridge::{Cartridge, CartridgeError};
use input::{Event, InputError, PanelEvent};
use patch::PatchError;
use television::{Specification, TelevisionError};

/// Where the 6507 finds its reset vector.
pub const ADDRESS_RESET: u16 = 0xFFFC;
/// Where the 6507 finds its IRQ/BRK vector.
pub const ADDRESS_IRQ: u16 = 0xFFFE;

/// Ceiling on CPU instructions per frame; a machine that produces no
/// vertical sync for this long has wedged.
const MAX_STEPS_PER_FRAME: u64 = 100_000;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("cpu: {0}")]
    Cpu(#[from] CpuError),
    #[error("memory: {0}")]
    Bus(#[from] BusError),
    #[error("cartridge: {0}")]
    Cartridge(#[from] CartridgeError),
    #[error("television: {0}")]
    Television(#[from] TelevisionError),
    #[error("input: {0}")]
    Input(#[from] InputError),
    #[error("patch: {0}")]
    Patch(#[from] PatchError),
    #[error("state: {0}")]
    State(String),
}

/// The whole console.
pub struct Vcs {
    pub cpu: Cpu6507<VcsBus>,
}

impl Vcs {
    pub fn new(spec: Specification) -> Self {
        Self {
            cpu: Cpu6507::new(VcsBus::new(spec)),
        }
    }

    /// Convenience accessor for the bus side of the machine.
    pub fn bus(&self) -> &VcsBus {
        &self.cpu.bus
    }

    pub fn bus_mut(&mut self) -> &mut VcsBus {
        &mut self.cpu.bus
    }

    /// Attach a cartridge image and press Reset.
    pub fn attach_cartridge(&mut self, rom: Vec<u8>) -> Result<(), VcsError> {
        let cart = Cartridge::new(rom)?;
        self.cpu.bus.cartridge = Some(cart);
        self.reset();
        Ok(())
    }

    pub fn remove_cartridge(&mut self) {
        self.cpu.bus.cartridge = None;
    }

    /// The console Reset switch: chips to power-on state, PC reloaded from
    /// the reset vector.
    pub fn reset(&mut self) {
        self.cpu.bus.reset();
        self.cpu.reset();
    }

    /// Execute one CPU instruction, driving the RIOT and TIA in lockstep.
    ///
    /// Returns the machine cycles consumed (WSYNC stretching included; the
    /// television saw exactly three color clocks per cycle) and the
    /// instruction's execution record.
    pub fn step(&mut self) -> Result<(u64, LastResult), VcsError> {
        let start = self.cpu.bus.cycles;

        match self.cpu.execute_instruction() {
            Ok(result) => Ok((self.cpu.bus.cycles - start, result)),
            Err(CpuError::ProgramCounterCycled) => {
                // tolerable: report and carry on from the wrapped address
                log(LogCategory::Cpu, LogLevel::Warn, || {
                    "program counter cycled past $FFFF".to_string()
                });
                match self.cpu.last_result() {
                    Some(result) => Ok((self.cpu.bus.cycles - start, *result)),
                    None => Err(VcsError::Cpu(CpuError::ProgramCounterCycled)),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run instructions until the television completes a frame.
    pub fn run_frame(&mut self) -> Result<Frame, VcsError> {
        let target = self.cpu.bus.tv.frame_count() + 1;
        let mut steps = 0u64;

        while self.cpu.bus.tv.frame_count() < target {
            self.step()?;
            steps += 1;
            if steps > MAX_STEPS_PER_FRAME {
                return Err(VcsError::State(format!(
                    "no frame completed after {} instructions",
                    steps
                )));
            }
        }

        self.cpu
            .bus
            .tv
            .frame()
            .cloned()
            .ok_or_else(|| VcsError::State("television produced no frame".to_string()))
    }

    /// Total machine cycles since power-on.
    pub fn cycles(&self) -> u64 {
        self.cpu.bus.cycles
    }

    // -- input ---------------------------------------------------------------

    pub fn handle_input(&mut self, port: usize, event: Event) -> Result<(), VcsError> {
        self.cpu.bus.input.handle(port, event)?;
        Ok(())
    }

    pub fn handle_panel(&mut self, event: PanelEvent) {
        self.cpu.bus.input.handle_panel(event);
    }

    // -- debugger ------------------------------------------------------------

    /// Side-effect-free memory read.
    pub fn peek(&self, addr: u16) -> Result<u8, VcsError> {
        Ok(self.cpu.bus.peek(addr)?)
    }

    /// Memory write that bypasses chip-write service.
    pub fn poke(&mut self, addr: u16, value: u8) -> Result<(), VcsError> {
        Ok(self.cpu.bus.poke(addr, value)?)
    }

    /// Install (or clear) the per-video-cycle reflection observer.
    pub fn set_reflection(&mut self, hook: Option<ReflectionHook>) {
        self.cpu.bus.set_reflection(hook);
    }

    /// Apply a patch file to the attached cartridge. Returns whether any
    /// byte was applied.
    pub fn apply_patch_file(&mut self, name: &str) -> Result<bool, VcsError> {
        match &mut self.cpu.bus.cartridge {
            Some(cart) => Ok(patch::apply_file(cart, name)?),
            None => Err(VcsError::Cartridge(CartridgeError::Missing)),
        }
    }

    // -- save states ---------------------------------------------------------

    pub fn save_state(&self) -> Value {
        json!({
            "version": 1,
            "system": "vcs",
            "cpu": {
                "a": self.cpu.a,
                "x": self.cpu.x,
                "y": self.cpu.y,
                "sp": self.cpu.sp,
                "pc": self.cpu.pc,
                "status": self.cpu.status,
                "cycles": self.cpu.cycles,
            },
            "bus": serde_json::to_value(&self.cpu.bus).unwrap_or(Value::Null),
        })
    }

    pub fn load_state(&mut self, v: &Value) -> Result<(), VcsError> {
        if v["version"].as_u64() != Some(1) || v["system"].as_str() != Some("vcs") {
            return Err(VcsError::State("unrecognised save state".to_string()));
        }

        let bus: VcsBus = serde_json::from_value(v["bus"].clone())
            .map_err(|e| VcsError::State(format!("bus state: {}", e)))?;

        let mut cpu = Cpu6507::new(bus);
        let c = &v["cpu"];
        cpu.a = c["a"].as_u64().unwrap_or(0) as u8;
        cpu.x = c["x"].as_u64().unwrap_or(0) as u8;
        cpu.y = c["y"].as_u64().unwrap_or(0) as u8;
        cpu.sp = c["sp"].as_u64().unwrap_or(0xFD) as u8;
        cpu.pc = c["pc"].as_u64().unwrap_or(0) as u16;
        cpu.status = c["status"].as_u64().unwrap_or(0x24) as u8;
        cpu.cycles = c["cycles"].as_u64().unwrap_or(0);
        self.cpu = cpu;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a 4K ROM with `program` at $F000 and the reset vector
    /// pointing at it.
    fn rom(program: &[u8]) -> Vec<u8> {
        let mut rom = vec![0xEAu8; 4096]; // NOP filler
        rom[..program.len()].copy_from_slice(program);
        rom[0xFFC] = 0x00;
        rom[0xFFD] = 0xF0;
        rom
    }

    fn vcs_with(program: &[u8]) -> Vcs {
        let mut vcs = Vcs::new(Specification::Ntsc);
        vcs.attach_cartridge(rom(program)).unwrap();
        vcs
    }

    #[test]
    fn test_reset_loads_vector() {
        let vcs = vcs_with(&[0xEA]);
        assert_eq!(vcs.cpu.pc, 0xF000);
        assert_eq!(vcs.cpu.sp, 0xFD);
        assert!(vcs.cpu.flag(vcs_core::cpu::FLAG_I));
    }

    #[test]
    fn test_three_color_clocks_per_cycle() {
        let mut vcs = vcs_with(&[0xA9, 0x42, 0x85, 0x80]);
        let before = vcs.bus().tia.video_cycles();
        let (cycles, _) = vcs.step().unwrap();
        assert_eq!(cycles, 2);
        assert_eq!(vcs.bus().tia.video_cycles() - before, 3 * cycles);
    }

    #[test]
    fn test_store_reaches_riot_ram() {
        let mut vcs = vcs_with(&[0xA9, 0x42, 0x85, 0x80, 0x4C, 0x00, 0xF0]);
        vcs.step().unwrap();
        let (cycles, _) = vcs.step().unwrap();
        assert_eq!(cycles, 3);
        assert_eq!(vcs.cpu.a, 0x42);
        assert_eq!(vcs.peek(0x0080).unwrap(), 0x42);
    }

    #[test]
    fn test_peek_poke_roundtrip() {
        let mut vcs = vcs_with(&[0xEA]);
        vcs.poke(0x0080, 0x5A).unwrap();
        assert_eq!(vcs.peek(0x0080).unwrap(), 0x5A);
        // peeking twice is idempotent
        assert_eq!(vcs.peek(0x0080).unwrap(), 0x5A);
    }

    #[test]
    fn test_save_load_state_roundtrip() {
        let mut vcs = vcs_with(&[0xA9, 0x42, 0x85, 0x80, 0x4C, 0x00, 0xF0]);
        vcs.step().unwrap();
        vcs.step().unwrap();

        let state = vcs.save_state();
        assert_eq!(state["version"], 1);
        assert_eq!(state["system"], "vcs");

        let mut other = Vcs::new(Specification::Ntsc);
        other.load_state(&state).unwrap();
        assert_eq!(other.cpu.a, 0x42);
        assert_eq!(other.cpu.pc, vcs.cpu.pc);
        assert_eq!(other.peek(0x0080).unwrap(), 0x42);
    }

    #[test]
    fn test_load_state_rejects_garbage() {
        let mut vcs = Vcs::new(Specification::Ntsc);
        assert!(vcs.load_state(&json!({"version": 9})).is_err());
    }

    #[test]
    fn test_input_reaches_ports() {
        let mut vcs = vcs_with(&[0xEA, 0x4C, 0x00, 0xF0]);
        vcs.handle_input(0, Event::Fire(true)).unwrap();
        vcs.step().unwrap();
        assert_eq!(vcs.peek(0x003C).unwrap() & 0x80, 0x00); // INPT4
    }

    #[test]
    fn test_patch_requires_cartridge() {
        let mut vcs = Vcs::new(Specification::Ntsc);
        assert!(matches!(
            vcs.apply_patch_file("nope.pch"),
            Err(VcsError::Cartridge(CartridgeError::Missing))
        ));
    }
}
