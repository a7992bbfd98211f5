//! Debugger evaluation points: breakpoints, traps and watches.
//!
//! The interactive debugger lives outside this crate; what it needs from
//! the core is a set of predicates it can evaluate between instructions,
//! plus the peek/poke and reflection paths exposed by the bus. Each
//! predicate here borrows the state it inspects and never mutates it.

use serde::{Deserialize, Serialize};
use vcs_core::cpu::result::LastResult;
use vcs_core::cpu::{Bus6507, Cpu6507};

use crate::bus::map_address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    Read,
    Write,
    Either,
}

/// One clause of a breakpoint: an address (mirror-insensitive), optionally
/// narrowed by access direction and written/read value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakClause {
    pub addr: u16,
    pub access: Access,
    pub value: Option<u8>,
}

impl BreakClause {
    fn matches(&self, result: &LastResult) -> bool {
        use vcs_core::cpu::instructions::Effect;

        let access_ok = match (self.access, result.defn.effect) {
            (Access::Either, Effect::Read | Effect::Write | Effect::Rmw) => true,
            (Access::Read, Effect::Read) => true,
            (Access::Write, Effect::Write | Effect::Rmw) => true,
            _ => false,
        };
        if !access_ok {
            return false;
        }

        let want = map_address(self.addr, self.access == Access::Read);
        let got = map_address(result.address, self.access == Access::Read);
        if want.area != got.area || want.canonical != got.canonical {
            return false;
        }

        match self.value {
            Some(v) => result.operand == v,
            None => true,
        }
    }
}

/// Breakpoint: every clause must match the same instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakpoint {
    pub clauses: Vec<BreakClause>,
}

impl Breakpoint {
    pub fn check(&self, result: &LastResult) -> bool {
        !self.clauses.is_empty() && self.clauses.iter().all(|c| c.matches(result))
    }
}

/// CPU registers a trap can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrapTarget {
    A,
    X,
    Y,
    Sp,
    Pc,
    Status,
}

/// Snapshot of the trappable registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub status: u8,
}

impl Registers {
    pub fn sample<B: Bus6507>(cpu: &Cpu6507<B>) -> Self {
        Self {
            a: cpu.a,
            x: cpu.x,
            y: cpu.y,
            sp: cpu.sp,
            pc: cpu.pc,
            status: cpu.status,
        }
    }

    fn get(&self, target: TrapTarget) -> u16 {
        match target {
            TrapTarget::A => self.a as u16,
            TrapTarget::X => self.x as u16,
            TrapTarget::Y => self.y as u16,
            TrapTarget::Sp => self.sp as u16,
            TrapTarget::Pc => self.pc,
            TrapTarget::Status => self.status as u16,
        }
    }
}

/// Trap: fires when a register changes between two snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Trap {
    pub target: TrapTarget,
}

impl Trap {
    pub fn check(&self, before: &Registers, after: &Registers) -> bool {
        before.get(self.target) != after.get(self.target)
    }
}

/// Watch: fires on any access to an address, regardless of value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Watch {
    pub addr: u16,
    pub access: Access,
}

impl Watch {
    pub fn check(&self, result: &LastResult) -> bool {
        BreakClause {
            addr: self.addr,
            access: self.access,
            value: None,
        }
        .matches(result)
    }
}
