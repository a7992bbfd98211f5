//! Missile sprite.
//!
//! A missile is a 1/2/4/8 clock wide pulse sharing its copy decode points
//! with the owning player's NUSIZ setting. RESMP locks the missile counter
//! to the player's position and suppresses output until released.

use serde::{Deserialize, Serialize};

use super::Moveable;

const START_DELAY: u8 = 4;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Missile {
    /// enable latch (ENAMx, committed through the delay queue)
    pub enabled: bool,
    /// raw NUSIZ value shared with the owning player
    pub nusiz: u8,
    /// locked to the player position (RESMPx bit 1)
    pub locked_to_player: bool,

    pub hm: u8,
    pub(crate) more_hmove: bool,

    pub(crate) position: u8,
    scan: Option<u8>,
    start_delay: Option<u8>,
}

impl Missile {
    pub fn new() -> Self {
        Self {
            hm: 0x08,
            ..Self::default()
        }
    }

    fn copy_starts(&self) -> &'static [u8] {
        match self.nusiz & 0x07 {
            0x01 => &[0, 16],
            0x02 => &[0, 32],
            0x03 => &[0, 16, 32],
            0x04 => &[0, 64],
            0x06 => &[0, 32, 64],
            _ => &[0],
        }
    }

    /// Width in color clocks from NUSIZ bits 4-5.
    fn width(&self) -> u8 {
        1 << ((self.nusiz >> 4) & 0x03)
    }

    pub fn reset_position(&mut self) {
        self.position = 0;
        self.start_delay = Some(START_DELAY);
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    /// Track the owning player while RESMP holds the lock.
    pub fn lock_to(&mut self, player_position: u8) {
        self.position = player_position;
        self.scan = None;
        self.start_delay = None;
    }

    pub fn pixel(&self) -> bool {
        self.enabled && !self.locked_to_player && self.scan.is_some()
    }
}

impl Moveable for Missile {
    fn hm(&self) -> u8 {
        self.hm
    }

    fn more_hmove(&self) -> bool {
        self.more_hmove
    }

    fn set_more_hmove(&mut self, v: bool) {
        self.more_hmove = v;
    }

    fn tick(&mut self) {
        self.position = (self.position + 1) % 160;

        if let Some(scan) = self.scan {
            let next = scan + 1;
            self.scan = if next >= self.width() { None } else { Some(next) };
        }

        if let Some(d) = self.start_delay {
            if d == 0 {
                self.start_delay = None;
                self.scan = Some(0);
            } else {
                self.start_delay = Some(d - 1);
            }
        }

        if self.copy_starts().contains(&self.position) {
            self.start_delay = Some(START_DELAY);
        }
    }
}
