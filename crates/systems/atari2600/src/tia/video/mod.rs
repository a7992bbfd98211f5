//! TIA video: sprites, playfield, collision latches and pixel resolution.

pub mod ball;
pub mod missile;
pub mod playfield;
pub mod player;

use serde::{Deserialize, Serialize};

use super::delay::{DelayQueue, Target};
use super::registers;
use crate::bus::ChipWrite;

use ball::Ball;
use missile::Missile;
use playfield::Playfield;
use player::Player;

/// Position reset latency when the strobe lands in horizontal blank.
const RESET_DELAY_HBLANK: u8 = 2;
/// Position reset latency during active display.
const RESET_DELAY_VISIBLE: u8 = 4;
/// Enable latches (ENAMx/ENABL) commit one clock late.
const ENABLE_DELAY: u8 = 1;
/// Playfield registers commit five clocks after the write is serviced.
const PLAYFIELD_DELAY: u8 = 5;

/// Objects that respond to the HMOVE ripple counter.
///
/// On each motion clock the comparator drops the object out of the move
/// once the counter has reached its HM value; until then the object gets an
/// extra position tick even inside horizontal blank.
pub(crate) trait Moveable {
    fn hm(&self) -> u8;
    fn more_hmove(&self) -> bool;
    fn set_more_hmove(&mut self, v: bool);
    fn tick(&mut self);

    fn motion_tick(&mut self, visible: bool, motion_clock: bool, hmove_ct: Option<u8>) {
        if motion_clock {
            if let Some(ct) = hmove_ct {
                if ct == self.hm() {
                    self.set_more_hmove(false);
                }
            }
        }
        // a stuffed clock landing outside HBLANK arrives on top of the
        // normal clock; that double step is the late-HMOVE comb
        let extra = motion_clock && hmove_ct.is_some() && self.more_hmove();
        if extra {
            self.tick();
        }
        if visible {
            self.tick();
        }
    }
}

/// Convert an HMxx register value to the 0..15 comparator value the ripple
/// counter matches against. +7 maps to 15 extra clocks, 0 to 8 (cancelling
/// the 8-clock late HBLANK), -8 to none.
fn hm_value(data: u8) -> u8 {
    (data >> 4) ^ 0x08
}

/// The fifteen pairwise collision latches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Collisions {
    pub m0_p0: bool,
    pub m0_p1: bool,
    pub m1_p0: bool,
    pub m1_p1: bool,
    pub p0_pf: bool,
    pub p0_bl: bool,
    pub p1_pf: bool,
    pub p1_bl: bool,
    pub m0_pf: bool,
    pub m0_bl: bool,
    pub m1_pf: bool,
    pub m1_bl: bool,
    pub bl_pf: bool,
    pub p0_p1: bool,
    pub m0_m1: bool,
}

impl Collisions {
    fn update(&mut self, p0: bool, p1: bool, m0: bool, m1: bool, bl: bool, pf: bool) {
        self.m0_p0 |= m0 && p0;
        self.m0_p1 |= m0 && p1;
        self.m1_p0 |= m1 && p0;
        self.m1_p1 |= m1 && p1;
        self.p0_pf |= p0 && pf;
        self.p0_bl |= p0 && bl;
        self.p1_pf |= p1 && pf;
        self.p1_bl |= p1 && bl;
        self.m0_pf |= m0 && pf;
        self.m0_bl |= m0 && bl;
        self.m1_pf |= m1 && pf;
        self.m1_bl |= m1 && bl;
        self.bl_pf |= bl && pf;
        self.p0_p1 |= p0 && p1;
        self.m0_m1 |= m0 && m1;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Build the value of a collision read register (CXM0P..CXPPMM,
    /// register 0..7). Latches appear in bits 7 and 6; the rest read zero.
    pub fn register(&self, reg: u8) -> u8 {
        let (b7, b6) = match reg & 0x07 {
            0x00 => (self.m0_p1, self.m0_p0),
            0x01 => (self.m1_p0, self.m1_p1),
            0x02 => (self.p0_pf, self.p0_bl),
            0x03 => (self.p1_pf, self.p1_bl),
            0x04 => (self.m0_pf, self.m0_bl),
            0x05 => (self.m1_pf, self.m1_bl),
            0x06 => (self.bl_pf, false),
            _ => (self.p0_p1, self.m0_m1),
        };
        ((b7 as u8) << 7) | ((b6 as u8) << 6)
    }
}

/// Identity of the element that won the pixel, used for the debug overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Background,
    Playfield,
    Player0,
    Player1,
    Missile0,
    Missile1,
    Ball,
}

impl Element {
    /// Fixed debug palette index for overlay rendering.
    pub fn alt_color(self) -> u8 {
        match self {
            Element::Background => 0x00,
            Element::Playfield => 0x02,
            Element::Player0 => 0x32,
            Element::Player1 => 0x12,
            Element::Missile0 => 0x36,
            Element::Missile1 => 0x16,
            Element::Ball => 0x7E,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub player0: Player,
    pub player1: Player,
    pub missile0: Missile,
    pub missile1: Missile,
    pub ball: Ball,
    pub playfield: Playfield,
    pub collisions: Collisions,

    pub colup0: u8,
    pub colup1: u8,
    pub colupf: u8,
    pub colubk: u8,
}

impl Default for Video {
    fn default() -> Self {
        Self::new()
    }
}

impl Video {
    pub fn new() -> Self {
        Self {
            player0: Player::new(),
            player1: Player::new(),
            missile0: Missile::new(),
            missile1: Missile::new(),
            ball: Ball::new(),
            playfield: Playfield::new(),
            collisions: Collisions::default(),
            colup0: 0,
            colup1: 0,
            colupf: 0,
            colubk: 0,
        }
    }

    // -- register service ---------------------------------------------------
    //
    // Each update function recognises its slice of the TIA write registers
    // and returns true when it consumed the pending write.

    /// Playfield data registers, committed through the delay queue.
    pub fn update_playfield(&mut self, delay: &mut DelayQueue, w: &ChipWrite) -> bool {
        match w.reg {
            registers::PF0 => delay.schedule(PLAYFIELD_DELAY, Target::Pf0, w.value),
            registers::PF1 => delay.schedule(PLAYFIELD_DELAY, Target::Pf1, w.value),
            registers::PF2 => delay.schedule(PLAYFIELD_DELAY, Target::Pf2, w.value),
            _ => return false,
        }
        true
    }

    /// Position strobes. These need the post-tick HBLANK state: a reset
    /// landing in blank settles two clocks later, in the open four.
    pub fn update_positioning(&mut self, delay: &mut DelayQueue, w: &ChipWrite, hblank: bool) -> bool {
        let ticks = if hblank {
            RESET_DELAY_HBLANK
        } else {
            RESET_DELAY_VISIBLE
        };
        match w.reg {
            registers::RESP0 => delay.schedule(ticks, Target::ResetP0, 0),
            registers::RESP1 => delay.schedule(ticks, Target::ResetP1, 0),
            registers::RESM0 => delay.schedule(ticks, Target::ResetM0, 0),
            registers::RESM1 => delay.schedule(ticks, Target::ResetM1, 0),
            registers::RESBL => delay.schedule(ticks, Target::ResetBl, 0),
            _ => return false,
        }
        true
    }

    /// Everything that takes effect immediately or one clock late: colors,
    /// graphics, sizes, reflection, motion values, enables.
    pub fn update_registers(&mut self, delay: &mut DelayQueue, w: &ChipWrite) -> bool {
        match w.reg {
            registers::COLUP0 => self.colup0 = w.value & 0xFE,
            registers::COLUP1 => self.colup1 = w.value & 0xFE,
            registers::COLUPF => self.colupf = w.value & 0xFE,
            registers::COLUBK => self.colubk = w.value & 0xFE,
            registers::CTRLPF => {
                self.playfield.set_ctrlpf(w.value);
                self.ball.set_ctrlpf(w.value);
            }
            registers::NUSIZ0 => {
                self.player0.nusiz = w.value;
                self.missile0.nusiz = w.value;
            }
            registers::NUSIZ1 => {
                self.player1.nusiz = w.value;
                self.missile1.nusiz = w.value;
            }
            registers::REFP0 => self.player0.reflected = w.value & 0x08 != 0,
            registers::REFP1 => self.player1.reflected = w.value & 0x08 != 0,
            registers::GRP0 => {
                self.player0.grp = w.value;
                // writing GRP0 latches the other player's old copy
                self.player1.grp_old = self.player1.grp;
            }
            registers::GRP1 => {
                self.player1.grp = w.value;
                self.player0.grp_old = self.player0.grp;
                self.ball.enabled_old = self.ball.enabled;
            }
            registers::ENAM0 => delay.schedule(ENABLE_DELAY, Target::EnaM0, w.value),
            registers::ENAM1 => delay.schedule(ENABLE_DELAY, Target::EnaM1, w.value),
            registers::ENABL => delay.schedule(ENABLE_DELAY, Target::EnaBl, w.value),
            registers::VDELP0 => self.player0.vdelay = w.value & 0x01 != 0,
            registers::VDELP1 => self.player1.vdelay = w.value & 0x01 != 0,
            registers::VDELBL => self.ball.vdelay = w.value & 0x01 != 0,
            registers::RESMP0 => self.missile0.locked_to_player = w.value & 0x02 != 0,
            registers::RESMP1 => self.missile1.locked_to_player = w.value & 0x02 != 0,
            registers::HMP0 => self.player0.hm = hm_value(w.value),
            registers::HMP1 => self.player1.hm = hm_value(w.value),
            registers::HMM0 => self.missile0.hm = hm_value(w.value),
            registers::HMM1 => self.missile1.hm = hm_value(w.value),
            registers::HMBL => self.ball.hm = hm_value(w.value),
            registers::HMCLR => {
                self.player0.hm = 0x08;
                self.player1.hm = 0x08;
                self.missile0.hm = 0x08;
                self.missile1.hm = 0x08;
                self.ball.hm = 0x08;
            }
            registers::CXCLR => self.collisions.clear(),
            _ => return false,
        }
        true
    }

    /// Fire a delayed event routed to the video subsystem.
    pub fn dispatch(&mut self, target: Target, value: u8) {
        match target {
            Target::Pf0 => self.playfield.commit_pf0(value),
            Target::Pf1 => self.playfield.commit_pf1(value),
            Target::Pf2 => self.playfield.commit_pf2(value),
            Target::ResetP0 => self.player0.reset_position(),
            Target::ResetP1 => self.player1.reset_position(),
            Target::ResetM0 => self.missile0.reset_position(),
            Target::ResetM1 => self.missile1.reset_position(),
            Target::ResetBl => self.ball.reset_position(),
            Target::EnaM0 => self.missile0.enabled = value & 0x02 != 0,
            Target::EnaM1 => self.missile1.enabled = value & 0x02 != 0,
            Target::EnaBl => self.ball.enabled = value & 0x02 != 0,
            _ => unreachable!("non-video delay target routed to video"),
        }
    }

    /// Arm every sprite for an HMOVE.
    pub fn start_hmove(&mut self) {
        self.player0.more_hmove = true;
        self.player1.more_hmove = true;
        self.missile0.more_hmove = true;
        self.missile1.more_hmove = true;
        self.ball.more_hmove = true;
    }

    /// One color clock of sprite movement. `visible` is the inverse of
    /// HBLANK; `motion_clock` is the Phi2 edge on which HMOVE stuffing
    /// happens; `hmove_ct` is the ripple counter while a move is active.
    pub fn tick_sprites(&mut self, visible: bool, motion_clock: bool, hmove_ct: Option<u8>) {
        self.player0.motion_tick(visible, motion_clock, hmove_ct);
        self.player1.motion_tick(visible, motion_clock, hmove_ct);
        self.missile0.motion_tick(visible, motion_clock, hmove_ct);
        self.missile1.motion_tick(visible, motion_clock, hmove_ct);
        self.ball.motion_tick(visible, motion_clock, hmove_ct);

        if self.missile0.locked_to_player {
            self.missile0.lock_to(self.player0.position());
        }
        if self.missile1.locked_to_player {
            self.missile1.lock_to(self.player1.position());
        }
    }

    /// Resolve one pixel and fold it into the collision latches.
    /// `visible_pixel` is None during horizontal blank (the playfield
    /// contributes nothing there but sprites still collide on the alt
    /// signal path).
    pub fn pixel(&mut self, visible_pixel: Option<u8>) -> (u8, Element) {
        let p0 = self.player0.pixel();
        let p1 = self.player1.pixel();
        let m0 = self.missile0.pixel();
        let m1 = self.missile1.pixel();
        let bl = self.ball.pixel();
        let pf = match visible_pixel {
            Some(px) => self.playfield.pixel(px),
            None => false,
        };

        self.collisions.update(p0, p1, m0, m1, bl, pf);

        // score mode recolors the playfield halves with the player colors;
        // the ball keeps the playfield color
        let pf_color = if self.playfield.score_mode && !self.playfield.priority {
            match visible_pixel {
                Some(px) if px >= 80 => self.colup1,
                _ => self.colup0,
            }
        } else {
            self.colupf
        };

        let element = if self.playfield.priority {
            if pf {
                Element::Playfield
            } else if bl {
                Element::Ball
            } else if p0 {
                Element::Player0
            } else if m0 {
                Element::Missile0
            } else if p1 {
                Element::Player1
            } else if m1 {
                Element::Missile1
            } else {
                Element::Background
            }
        } else if p0 {
            Element::Player0
        } else if m0 {
            Element::Missile0
        } else if p1 {
            Element::Player1
        } else if m1 {
            Element::Missile1
        } else if bl {
            Element::Ball
        } else if pf {
            Element::Playfield
        } else {
            Element::Background
        };

        let color = match element {
            Element::Background => self.colubk,
            Element::Playfield => pf_color,
            Element::Player0 | Element::Missile0 => self.colup0,
            Element::Player1 | Element::Missile1 => self.colup1,
            Element::Ball => self.colupf,
        };

        (color, element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(reg: u8, value: u8) -> ChipWrite {
        ChipWrite { reg, value }
    }

    #[test]
    fn test_hm_value_conversion() {
        assert_eq!(hm_value(0x70), 0x0F); // +7 -> 15 extra clocks
        assert_eq!(hm_value(0x00), 0x08); // 0 -> 8 (cancels late HBLANK)
        assert_eq!(hm_value(0x80), 0x00); // -8 -> none
    }

    #[test]
    fn test_hmove_displacement() {
        // with HM=+7 the sprite should receive 15 extra ticks over a
        // full 16-count ripple
        let mut v = Video::new();
        let mut delay = DelayQueue::new();
        v.update_registers(&mut delay, &write(registers::HMP0, 0x70));
        v.start_hmove();

        let before = v.player0.position();
        for ct in 0..16 {
            v.tick_sprites(false, true, Some(ct));
        }
        assert_eq!(v.player0.position(), (before + 15) % 160);

        // HM=-8 receives none
        v.update_registers(&mut delay, &write(registers::HMP0, 0x80));
        v.start_hmove();
        let before = v.player0.position();
        for ct in 0..16 {
            v.tick_sprites(false, true, Some(ct));
        }
        assert_eq!(v.player0.position(), before);
    }

    #[test]
    fn test_grp_writes_cross_latch() {
        let mut v = Video::new();
        let mut delay = DelayQueue::new();
        v.update_registers(&mut delay, &write(registers::GRP0, 0xAA));
        v.update_registers(&mut delay, &write(registers::GRP1, 0x55));
        // GRP1 write latched player 0's old copy
        assert_eq!(v.player0.grp_old, 0xAA);
        v.update_registers(&mut delay, &write(registers::GRP0, 0x11));
        assert_eq!(v.player1.grp_old, 0x55);
    }

    #[test]
    fn test_collision_register_layout() {
        let mut c = Collisions::default();
        c.update(true, false, false, false, true, false); // P0 and ball
        assert_eq!(c.register(0x02) & 0x40, 0x40); // CXP0FB bit 6 = P0-BL
        assert_eq!(c.register(0x02) & 0x80, 0x00);

        c.clear();
        assert_eq!(c.register(0x02), 0);
    }

    #[test]
    fn test_priority_resolution() {
        let mut v = Video::new();
        v.colup0 = 0x40;
        v.colupf = 0x0E;
        v.player0.grp = 0xFF;
        v.player0.reset_position();
        for _ in 0..8 {
            v.player0.tick();
        }
        assert!(v.player0.is_drawing());
        v.playfield.commit_pf0(0xF0);

        // players beat playfield by default
        let (color, element) = v.pixel(Some(0));
        assert_eq!(element, Element::Player0);
        assert_eq!(color, 0x40);

        // CTRLPF bit 2 flips it
        v.playfield.set_ctrlpf(0x04);
        let (color, element) = v.pixel(Some(0));
        assert_eq!(element, Element::Playfield);
        assert_eq!(color, 0x0E);
    }

    #[test]
    fn test_score_mode_colors() {
        let mut v = Video::new();
        v.colup0 = 0x40;
        v.colup1 = 0x80;
        v.playfield.set_ctrlpf(0x02);
        v.playfield.commit_pf0(0xF0);
        v.playfield.commit_pf1(0xFF);
        v.playfield.commit_pf2(0xFF);

        let (left, _) = v.pixel(Some(0));
        let (right, _) = v.pixel(Some(80));
        assert_eq!(left, 0x40);
        assert_eq!(right, 0x80);
    }

    #[test]
    fn test_hmclr_resets_motion() {
        let mut v = Video::new();
        let mut delay = DelayQueue::new();
        v.update_registers(&mut delay, &write(registers::HMP0, 0x70));
        v.update_registers(&mut delay, &write(registers::HMCLR, 0));
        assert_eq!(v.player0.hm, 0x08);
    }
}
