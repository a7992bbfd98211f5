//! Ball sprite.
//!
//! The ball is a single 1/2/4/8 clock pulse with no copies. Unlike the
//! players and missiles it has no start delay, so it appears at its reset
//! position, and its enable latch is double-buffered for vertical delay
//! (latched by GRP1 writes).

use serde::{Deserialize, Serialize};

use super::Moveable;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Ball {
    /// enable latch (ENABL, committed through the delay queue)
    pub enabled: bool,
    /// old enable latch, latched by a write to GRP1
    pub enabled_old: bool,
    /// vertical delay: draw from `enabled_old` (VDELBL)
    pub vdelay: bool,
    /// width in color clocks (CTRLPF bits 4-5)
    pub width: u8,

    pub hm: u8,
    pub(crate) more_hmove: bool,

    pub(crate) position: u8,
    scan: Option<u8>,
}

impl Ball {
    pub fn new() -> Self {
        Self {
            width: 1,
            hm: 0x08,
            ..Self::default()
        }
    }

    pub fn set_ctrlpf(&mut self, value: u8) {
        self.width = 1 << ((value >> 4) & 0x03);
    }

    pub fn reset_position(&mut self) {
        self.position = 0;
        self.scan = Some(0);
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    pub fn pixel(&self) -> bool {
        let enabled = if self.vdelay {
            self.enabled_old
        } else {
            self.enabled
        };
        enabled && self.scan.is_some()
    }
}

impl Moveable for Ball {
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
            self.scan = if next >= self.width { None } else { Some(next) };
        }

        if self.position == 0 {
            self.scan = Some(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawn_pixels(b: &mut Ball, ticks: usize) -> Vec<usize> {
        let mut out = Vec::new();
        for t in 0..ticks {
            b.tick();
            if b.pixel() {
                out.push(t);
            }
        }
        out
    }

    #[test]
    fn test_ball_draws_at_reset_position() {
        let mut b = Ball::new();
        b.enabled = true;
        b.reset_position();
        // visible immediately at the reset position, before any tick
        assert!(b.pixel());
    }

    #[test]
    fn test_ball_width() {
        let mut b = Ball::new();
        b.enabled = true;
        b.set_ctrlpf(0x20); // 4 clocks
        b.reset_position();
        // the reset pixel plus three more while the scan runs
        assert!(b.pixel());
        assert_eq!(drawn_pixels(&mut b, 150).len(), 3);
    }

    #[test]
    fn test_ball_redraws_on_wrap() {
        let mut b = Ball::new();
        b.enabled = true;
        b.reset_position();
        let px = drawn_pixels(&mut b, 160);
        // scan restarts when the counter wraps back to zero
        assert_eq!(px, vec![159]);
    }

    #[test]
    fn test_vertical_delay_uses_old_latch() {
        let mut b = Ball::new();
        b.enabled = true;
        b.enabled_old = false;
        b.vdelay = true;
        b.reset_position();
        assert!(!b.pixel());
    }
}
