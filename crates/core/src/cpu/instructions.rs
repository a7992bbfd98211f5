//! Declarative 6507 instruction table.
//!
//! The decoder is a plain lookup into a 256-entry table built from the
//! definition list below, so the whole instruction set (including the
//! undocumented opcodes that shipped games rely on) can be audited in one
//! place. Cycle counts are the NMOS base counts; page-cross and branch
//! penalties are applied by the execution engine.

/// How an instruction finds its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

/// What an instruction does with the bus once the operand is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Read,
    Write,
    Rmw,
    Flow,
    Subroutine,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Mnemonic {
    // documented
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRK, BVC, BVS, CLC,
    CLD, CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, JMP,
    JSR, LDA, LDX, LDY, LSR, NOP, ORA, PHA, PHP, PLA, PLP, ROL, ROR, RTI,
    RTS, SBC, SEC, SED, SEI, STA, STX, STY, TAX, TAY, TSX, TXA, TXS, TYA,
    // undocumented
    LAX, SAX, DCP, ISC, SLO, SRE, RLA, RRA, ANC, ALR, ARR, XAA, AXS,
}

impl Mnemonic {
    pub fn name(self) -> &'static str {
        use Mnemonic::*;
        match self {
            ADC => "ADC", AND => "AND", ASL => "ASL", BCC => "BCC",
            BCS => "BCS", BEQ => "BEQ", BIT => "BIT", BMI => "BMI",
            BNE => "BNE", BPL => "BPL", BRK => "BRK", BVC => "BVC",
            BVS => "BVS", CLC => "CLC", CLD => "CLD", CLI => "CLI",
            CLV => "CLV", CMP => "CMP", CPX => "CPX", CPY => "CPY",
            DEC => "DEC", DEX => "DEX", DEY => "DEY", EOR => "EOR",
            INC => "INC", INX => "INX", INY => "INY", JMP => "JMP",
            JSR => "JSR", LDA => "LDA", LDX => "LDX", LDY => "LDY",
            LSR => "LSR", NOP => "NOP", ORA => "ORA", PHA => "PHA",
            PHP => "PHP", PLA => "PLA", PLP => "PLP", ROL => "ROL",
            ROR => "ROR", RTI => "RTI", RTS => "RTS", SBC => "SBC",
            SEC => "SEC", SED => "SED", SEI => "SEI", STA => "STA",
            STX => "STX", STY => "STY", TAX => "TAX", TAY => "TAY",
            TSX => "TSX", TXA => "TXA", TXS => "TXS", TYA => "TYA",
            LAX => "LAX", SAX => "SAX", DCP => "DCP", ISC => "ISC",
            SLO => "SLO", SRE => "SRE", RLA => "RLA", RRA => "RRA",
            ANC => "ANC", ALR => "ALR", ARR => "ARR", XAA => "XAA",
            AXS => "AXS",
        }
    }
}

/// One decoded instruction definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    /// base cycle count, before page-cross / branch penalties
    pub cycles: u8,
    /// true when a page-crossing read adds one cycle
    pub page_sensitive: bool,
    pub effect: Effect,
    pub undocumented: bool,
}

use AddressingMode::*;
use Effect::*;
use Mnemonic::*;

const fn doc(
    opcode: u8,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    cycles: u8,
    page_sensitive: bool,
    effect: Effect,
) -> Instruction {
    Instruction {
        opcode,
        mnemonic,
        mode,
        cycles,
        page_sensitive,
        effect,
        undocumented: false,
    }
}

const fn undoc(
    opcode: u8,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    cycles: u8,
    page_sensitive: bool,
    effect: Effect,
) -> Instruction {
    Instruction {
        opcode,
        mnemonic,
        mode,
        cycles,
        page_sensitive,
        effect,
        undocumented: true,
    }
}

/// Every implemented opcode. Kept sorted by mnemonic rather than opcode so
/// the addressing-mode spread of each instruction can be read at a glance.
#[rustfmt::skip]
pub const DEFINITIONS: &[Instruction] = &[
    doc(0x69, ADC, Immediate, 2, false, Read),
    doc(0x65, ADC, ZeroPage,  3, false, Read),
    doc(0x75, ADC, ZeroPageX, 4, false, Read),
    doc(0x6D, ADC, Absolute,  4, false, Read),
    doc(0x7D, ADC, AbsoluteX, 4, true,  Read),
    doc(0x79, ADC, AbsoluteY, 4, true,  Read),
    doc(0x61, ADC, IndirectX, 6, false, Read),
    doc(0x71, ADC, IndirectY, 5, true,  Read),

    doc(0x29, AND, Immediate, 2, false, Read),
    doc(0x25, AND, ZeroPage,  3, false, Read),
    doc(0x35, AND, ZeroPageX, 4, false, Read),
    doc(0x2D, AND, Absolute,  4, false, Read),
    doc(0x3D, AND, AbsoluteX, 4, true,  Read),
    doc(0x39, AND, AbsoluteY, 4, true,  Read),
    doc(0x21, AND, IndirectX, 6, false, Read),
    doc(0x31, AND, IndirectY, 5, true,  Read),

    doc(0x0A, ASL, Implied,   2, false, Rmw),
    doc(0x06, ASL, ZeroPage,  5, false, Rmw),
    doc(0x16, ASL, ZeroPageX, 6, false, Rmw),
    doc(0x0E, ASL, Absolute,  6, false, Rmw),
    doc(0x1E, ASL, AbsoluteX, 7, false, Rmw),

    doc(0x90, BCC, Relative, 2, true, Flow),
    doc(0xB0, BCS, Relative, 2, true, Flow),
    doc(0xF0, BEQ, Relative, 2, true, Flow),
    doc(0x30, BMI, Relative, 2, true, Flow),
    doc(0xD0, BNE, Relative, 2, true, Flow),
    doc(0x10, BPL, Relative, 2, true, Flow),
    doc(0x50, BVC, Relative, 2, true, Flow),
    doc(0x70, BVS, Relative, 2, true, Flow),

    doc(0x24, BIT, ZeroPage, 3, false, Read),
    doc(0x2C, BIT, Absolute, 4, false, Read),

    doc(0x00, BRK, Implied, 7, false, Interrupt),

    doc(0x18, CLC, Implied, 2, false, Read),
    doc(0xD8, CLD, Implied, 2, false, Read),
    doc(0x58, CLI, Implied, 2, false, Read),
    doc(0xB8, CLV, Implied, 2, false, Read),

    doc(0xC9, CMP, Immediate, 2, false, Read),
    doc(0xC5, CMP, ZeroPage,  3, false, Read),
    doc(0xD5, CMP, ZeroPageX, 4, false, Read),
    doc(0xCD, CMP, Absolute,  4, false, Read),
    doc(0xDD, CMP, AbsoluteX, 4, true,  Read),
    doc(0xD9, CMP, AbsoluteY, 4, true,  Read),
    doc(0xC1, CMP, IndirectX, 6, false, Read),
    doc(0xD1, CMP, IndirectY, 5, true,  Read),

    doc(0xE0, CPX, Immediate, 2, false, Read),
    doc(0xE4, CPX, ZeroPage,  3, false, Read),
    doc(0xEC, CPX, Absolute,  4, false, Read),

    doc(0xC0, CPY, Immediate, 2, false, Read),
    doc(0xC4, CPY, ZeroPage,  3, false, Read),
    doc(0xCC, CPY, Absolute,  4, false, Read),

    doc(0xC6, DEC, ZeroPage,  5, false, Rmw),
    doc(0xD6, DEC, ZeroPageX, 6, false, Rmw),
    doc(0xCE, DEC, Absolute,  6, false, Rmw),
    doc(0xDE, DEC, AbsoluteX, 7, false, Rmw),

    doc(0xCA, DEX, Implied, 2, false, Read),
    doc(0x88, DEY, Implied, 2, false, Read),

    doc(0x49, EOR, Immediate, 2, false, Read),
    doc(0x45, EOR, ZeroPage,  3, false, Read),
    doc(0x55, EOR, ZeroPageX, 4, false, Read),
    doc(0x4D, EOR, Absolute,  4, false, Read),
    doc(0x5D, EOR, AbsoluteX, 4, true,  Read),
    doc(0x59, EOR, AbsoluteY, 4, true,  Read),
    doc(0x41, EOR, IndirectX, 6, false, Read),
    doc(0x51, EOR, IndirectY, 5, true,  Read),

    doc(0xE6, INC, ZeroPage,  5, false, Rmw),
    doc(0xF6, INC, ZeroPageX, 6, false, Rmw),
    doc(0xEE, INC, Absolute,  6, false, Rmw),
    doc(0xFE, INC, AbsoluteX, 7, false, Rmw),

    doc(0xE8, INX, Implied, 2, false, Read),
    doc(0xC8, INY, Implied, 2, false, Read),

    doc(0x4C, JMP, Absolute, 3, false, Flow),
    doc(0x6C, JMP, Indirect, 5, false, Flow),

    doc(0x20, JSR, Absolute, 6, false, Subroutine),

    doc(0xA9, LDA, Immediate, 2, false, Read),
    doc(0xA5, LDA, ZeroPage,  3, false, Read),
    doc(0xB5, LDA, ZeroPageX, 4, false, Read),
    doc(0xAD, LDA, Absolute,  4, false, Read),
    doc(0xBD, LDA, AbsoluteX, 4, true,  Read),
    doc(0xB9, LDA, AbsoluteY, 4, true,  Read),
    doc(0xA1, LDA, IndirectX, 6, false, Read),
    doc(0xB1, LDA, IndirectY, 5, true,  Read),

    doc(0xA2, LDX, Immediate, 2, false, Read),
    doc(0xA6, LDX, ZeroPage,  3, false, Read),
    doc(0xB6, LDX, ZeroPageY, 4, false, Read),
    doc(0xAE, LDX, Absolute,  4, false, Read),
    doc(0xBE, LDX, AbsoluteY, 4, true,  Read),

    doc(0xA0, LDY, Immediate, 2, false, Read),
    doc(0xA4, LDY, ZeroPage,  3, false, Read),
    doc(0xB4, LDY, ZeroPageX, 4, false, Read),
    doc(0xAC, LDY, Absolute,  4, false, Read),
    doc(0xBC, LDY, AbsoluteX, 4, true,  Read),

    doc(0x4A, LSR, Implied,   2, false, Rmw),
    doc(0x46, LSR, ZeroPage,  5, false, Rmw),
    doc(0x56, LSR, ZeroPageX, 6, false, Rmw),
    doc(0x4E, LSR, Absolute,  6, false, Rmw),
    doc(0x5E, LSR, AbsoluteX, 7, false, Rmw),

    doc(0xEA, NOP, Implied, 2, false, Read),

    doc(0x09, ORA, Immediate, 2, false, Read),
    doc(0x05, ORA, ZeroPage,  3, false, Read),
    doc(0x15, ORA, ZeroPageX, 4, false, Read),
    doc(0x0D, ORA, Absolute,  4, false, Read),
    doc(0x1D, ORA, AbsoluteX, 4, true,  Read),
    doc(0x19, ORA, AbsoluteY, 4, true,  Read),
    doc(0x01, ORA, IndirectX, 6, false, Read),
    doc(0x11, ORA, IndirectY, 5, true,  Read),

    doc(0x48, PHA, Implied, 3, false, Write),
    doc(0x08, PHP, Implied, 3, false, Write),
    doc(0x68, PLA, Implied, 4, false, Read),
    doc(0x28, PLP, Implied, 4, false, Read),

    doc(0x2A, ROL, Implied,   2, false, Rmw),
    doc(0x26, ROL, ZeroPage,  5, false, Rmw),
    doc(0x36, ROL, ZeroPageX, 6, false, Rmw),
    doc(0x2E, ROL, Absolute,  6, false, Rmw),
    doc(0x3E, ROL, AbsoluteX, 7, false, Rmw),

    doc(0x6A, ROR, Implied,   2, false, Rmw),
    doc(0x66, ROR, ZeroPage,  5, false, Rmw),
    doc(0x76, ROR, ZeroPageX, 6, false, Rmw),
    doc(0x6E, ROR, Absolute,  6, false, Rmw),
    doc(0x7E, ROR, AbsoluteX, 7, false, Rmw),

    doc(0x40, RTI, Implied, 6, false, Interrupt),
    doc(0x60, RTS, Implied, 6, false, Subroutine),

    doc(0xE9, SBC, Immediate, 2, false, Read),
    doc(0xE5, SBC, ZeroPage,  3, false, Read),
    doc(0xF5, SBC, ZeroPageX, 4, false, Read),
    doc(0xED, SBC, Absolute,  4, false, Read),
    doc(0xFD, SBC, AbsoluteX, 4, true,  Read),
    doc(0xF9, SBC, AbsoluteY, 4, true,  Read),
    doc(0xE1, SBC, IndirectX, 6, false, Read),
    doc(0xF1, SBC, IndirectY, 5, true,  Read),

    doc(0x38, SEC, Implied, 2, false, Read),
    doc(0xF8, SED, Implied, 2, false, Read),
    doc(0x78, SEI, Implied, 2, false, Read),

    doc(0x85, STA, ZeroPage,  3, false, Write),
    doc(0x95, STA, ZeroPageX, 4, false, Write),
    doc(0x8D, STA, Absolute,  4, false, Write),
    doc(0x9D, STA, AbsoluteX, 5, false, Write),
    doc(0x99, STA, AbsoluteY, 5, false, Write),
    doc(0x81, STA, IndirectX, 6, false, Write),
    doc(0x91, STA, IndirectY, 6, false, Write),

    doc(0x86, STX, ZeroPage,  3, false, Write),
    doc(0x96, STX, ZeroPageY, 4, false, Write),
    doc(0x8E, STX, Absolute,  4, false, Write),

    doc(0x84, STY, ZeroPage,  3, false, Write),
    doc(0x94, STY, ZeroPageX, 4, false, Write),
    doc(0x8C, STY, Absolute,  4, false, Write),

    doc(0xAA, TAX, Implied, 2, false, Read),
    doc(0xA8, TAY, Implied, 2, false, Read),
    doc(0xBA, TSX, Implied, 2, false, Read),
    doc(0x8A, TXA, Implied, 2, false, Read),
    doc(0x9A, TXS, Implied, 2, false, Read),
    doc(0x98, TYA, Implied, 2, false, Read),

    // undocumented opcodes from here on

    undoc(0x1A, NOP, Implied, 2, false, Read),
    undoc(0x3A, NOP, Implied, 2, false, Read),
    undoc(0x5A, NOP, Implied, 2, false, Read),
    undoc(0x7A, NOP, Implied, 2, false, Read),
    undoc(0xDA, NOP, Implied, 2, false, Read),
    undoc(0xFA, NOP, Implied, 2, false, Read),

    undoc(0x80, NOP, Immediate, 2, false, Read),
    undoc(0x82, NOP, Immediate, 2, false, Read),
    undoc(0x89, NOP, Immediate, 2, false, Read),
    undoc(0xC2, NOP, Immediate, 2, false, Read),
    undoc(0xE2, NOP, Immediate, 2, false, Read),

    undoc(0x04, NOP, ZeroPage, 3, false, Read),
    undoc(0x44, NOP, ZeroPage, 3, false, Read),
    undoc(0x64, NOP, ZeroPage, 3, false, Read),

    undoc(0x14, NOP, ZeroPageX, 4, false, Read),
    undoc(0x34, NOP, ZeroPageX, 4, false, Read),
    undoc(0x54, NOP, ZeroPageX, 4, false, Read),
    undoc(0x74, NOP, ZeroPageX, 4, false, Read),
    undoc(0xD4, NOP, ZeroPageX, 4, false, Read),
    undoc(0xF4, NOP, ZeroPageX, 4, false, Read),

    undoc(0x0C, NOP, Absolute, 4, false, Read),

    undoc(0x1C, NOP, AbsoluteX, 4, true, Read),
    undoc(0x3C, NOP, AbsoluteX, 4, true, Read),
    undoc(0x5C, NOP, AbsoluteX, 4, true, Read),
    undoc(0x7C, NOP, AbsoluteX, 4, true, Read),
    undoc(0xDC, NOP, AbsoluteX, 4, true, Read),
    undoc(0xFC, NOP, AbsoluteX, 4, true, Read),

    undoc(0xA7, LAX, ZeroPage,  3, false, Read),
    undoc(0xB7, LAX, ZeroPageY, 4, false, Read),
    undoc(0xAF, LAX, Absolute,  4, false, Read),
    undoc(0xBF, LAX, AbsoluteY, 4, true,  Read),
    undoc(0xA3, LAX, IndirectX, 6, false, Read),
    undoc(0xB3, LAX, IndirectY, 5, true,  Read),

    undoc(0x87, SAX, ZeroPage,  3, false, Write),
    undoc(0x97, SAX, ZeroPageY, 4, false, Write),
    undoc(0x8F, SAX, Absolute,  4, false, Write),
    undoc(0x83, SAX, IndirectX, 6, false, Write),

    undoc(0xC7, DCP, ZeroPage,  5, false, Rmw),
    undoc(0xD7, DCP, ZeroPageX, 6, false, Rmw),
    undoc(0xCF, DCP, Absolute,  6, false, Rmw),
    undoc(0xDF, DCP, AbsoluteX, 7, false, Rmw),
    undoc(0xDB, DCP, AbsoluteY, 7, false, Rmw),
    undoc(0xC3, DCP, IndirectX, 8, false, Rmw),
    undoc(0xD3, DCP, IndirectY, 8, false, Rmw),

    undoc(0xE7, ISC, ZeroPage,  5, false, Rmw),
    undoc(0xF7, ISC, ZeroPageX, 6, false, Rmw),
    undoc(0xEF, ISC, Absolute,  6, false, Rmw),
    undoc(0xFF, ISC, AbsoluteX, 7, false, Rmw),
    undoc(0xFB, ISC, AbsoluteY, 7, false, Rmw),
    undoc(0xE3, ISC, IndirectX, 8, false, Rmw),
    undoc(0xF3, ISC, IndirectY, 8, false, Rmw),

    undoc(0x07, SLO, ZeroPage,  5, false, Rmw),
    undoc(0x17, SLO, ZeroPageX, 6, false, Rmw),
    undoc(0x0F, SLO, Absolute,  6, false, Rmw),
    undoc(0x1F, SLO, AbsoluteX, 7, false, Rmw),
    undoc(0x1B, SLO, AbsoluteY, 7, false, Rmw),
    undoc(0x03, SLO, IndirectX, 8, false, Rmw),
    undoc(0x13, SLO, IndirectY, 8, false, Rmw),

    undoc(0x47, SRE, ZeroPage,  5, false, Rmw),
    undoc(0x57, SRE, ZeroPageX, 6, false, Rmw),
    undoc(0x4F, SRE, Absolute,  6, false, Rmw),
    undoc(0x5F, SRE, AbsoluteX, 7, false, Rmw),
    undoc(0x5B, SRE, AbsoluteY, 7, false, Rmw),
    undoc(0x43, SRE, IndirectX, 8, false, Rmw),
    undoc(0x53, SRE, IndirectY, 8, false, Rmw),

    undoc(0x27, RLA, ZeroPage,  5, false, Rmw),
    undoc(0x37, RLA, ZeroPageX, 6, false, Rmw),
    undoc(0x2F, RLA, Absolute,  6, false, Rmw),
    undoc(0x3F, RLA, AbsoluteX, 7, false, Rmw),
    undoc(0x3B, RLA, AbsoluteY, 7, false, Rmw),
    undoc(0x23, RLA, IndirectX, 8, false, Rmw),
    undoc(0x33, RLA, IndirectY, 8, false, Rmw),

    undoc(0x67, RRA, ZeroPage,  5, false, Rmw),
    undoc(0x77, RRA, ZeroPageX, 6, false, Rmw),
    undoc(0x6F, RRA, Absolute,  6, false, Rmw),
    undoc(0x7F, RRA, AbsoluteX, 7, false, Rmw),
    undoc(0x7B, RRA, AbsoluteY, 7, false, Rmw),
    undoc(0x63, RRA, IndirectX, 8, false, Rmw),
    undoc(0x73, RRA, IndirectY, 8, false, Rmw),

    undoc(0x0B, ANC, Immediate, 2, false, Read),
    undoc(0x2B, ANC, Immediate, 2, false, Read),
    undoc(0x4B, ALR, Immediate, 2, false, Read),
    undoc(0x6B, ARR, Immediate, 2, false, Read),
    undoc(0x8B, XAA, Immediate, 2, false, Read),
    undoc(0xCB, AXS, Immediate, 2, false, Read),
    undoc(0xEB, SBC, Immediate, 2, false, Read),
];

const fn build_table() -> [Option<&'static Instruction>; 256] {
    let mut table: [Option<&'static Instruction>; 256] = [None; 256];
    let mut i = 0;
    while i < DEFINITIONS.len() {
        table[DEFINITIONS[i].opcode as usize] = Some(&DEFINITIONS[i]);
        i += 1;
    }
    table
}

static TABLE: [Option<&'static Instruction>; 256] = build_table();

/// Look up the definition for an opcode. `None` for the genuinely dead
/// opcodes (KIL and the remaining unstable store group).
pub fn lookup(opcode: u8) -> Option<&'static Instruction> {
    TABLE[opcode as usize]
}
