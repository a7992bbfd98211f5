//! Per-instruction execution record.

use std::fmt;

use super::instructions::{AddressingMode, Effect, Instruction};

/// Everything the debugger wants to know about the most recently executed
/// (or currently executing) instruction.
#[derive(Debug, Clone, Copy)]
pub struct LastResult {
    /// address the opcode was fetched from
    pub pc: u16,
    pub opcode: u8,
    pub defn: &'static Instruction,
    /// resolved effective address (0 for implied/immediate modes)
    pub address: u16,
    /// resolved operand value (read value, written value or branch offset)
    pub operand: u8,
    /// cycles consumed by the instruction proper, including page-cross and
    /// branch penalties but not WSYNC stretching
    pub cycles: u8,
    pub page_crossed: bool,
    /// set when the instruction tripped a known silicon quirk
    pub bug: Option<&'static str>,
    /// false while the instruction is still being executed (as seen from a
    /// video-cycle callback), true once it has completed
    pub finished: bool,
}

impl LastResult {
    /// A fresh record for an instruction about to execute.
    pub fn starting(pc: u16, opcode: u8, defn: &'static Instruction) -> Self {
        Self {
            pc,
            opcode,
            defn,
            address: 0,
            operand: 0,
            cycles: 0,
            page_crossed: false,
            bug: None,
            finished: false,
        }
    }
}

impl fmt::Display for LastResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:04X}  {}", self.pc, self.defn.mnemonic.name())?;

        match self.defn.mode {
            AddressingMode::Implied => {}
            AddressingMode::Immediate => write!(f, " #${:02X}", self.operand)?,
            AddressingMode::Relative => write!(f, " ${:04X}", self.address)?,
            _ => write!(f, " ${:04X}", self.address)?,
        }

        if self.defn.effect == Effect::Read || self.defn.effect == Effect::Rmw {
            write!(f, " [={:02X}]", self.operand)?;
        }

        write!(f, " ({} cy", self.cycles)?;
        if self.page_crossed {
            write!(f, ", page cross")?;
        }
        write!(f, ")")?;

        if let Some(bug) = self.bug {
            write!(f, " !{}", bug)?;
        }
        if !self.finished {
            write!(f, " ...")?;
        }
        Ok(())
    }
}
