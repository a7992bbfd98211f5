//! Delay queue for latched TIA register effects.
//!
//! Most TIA state changes do not take effect on the color clock they are
//! requested; the silicon latches them for a handful of clocks first
//! (playfield commits take five, sprite position resets two or four, and so
//! on). Rather than one countdown per register, a single fixed-capacity
//! queue carries "fire `value` into `target` in `n` ticks" entries.
//!
//! Scheduling a target that already has a pending entry replaces it:
//! last-write-wins, which is what back-to-back CPU writes to the same
//! register do on hardware.

use serde::{Deserialize, Serialize};

/// Destinations a delayed value can fire into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// commit a playfield register to the working pattern
    Pf0,
    Pf1,
    Pf2,
    /// reset a sprite position counter
    ResetP0,
    ResetP1,
    ResetM0,
    ResetM1,
    ResetBl,
    /// enable latches for missiles and ball
    EnaM0,
    EnaM1,
    EnaBl,
    /// scheduled HSYNC machine events
    HsyncOff,
    ColorBurstOff,
    HblankOff,
    NewScanline,
}

const CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Slot {
    remaining: u8,
    target: Target,
    value: u8,
}

/// Events that fired during a [`DelayQueue::tick`], in slot order.
#[derive(Debug, Clone, Copy)]
pub struct Fired {
    items: [(Target, u8); CAPACITY],
    len: usize,
}

impl Fired {
    pub fn iter(&self) -> impl Iterator<Item = (Target, u8)> + '_ {
        self.items[..self.len].iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DelayQueue {
    slots: [Option<Slot>; CAPACITY],
}

impl DelayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `value` to fire into `target` after exactly `ticks` calls to
    /// [`tick`](Self::tick). A pending entry for the same target is
    /// replaced.
    pub fn schedule(&mut self, ticks: u8, target: Target, value: u8) {
        let ticks = ticks.max(1);

        for slot in self.slots.iter_mut().flatten() {
            if slot.target == target {
                slot.remaining = ticks;
                slot.value = value;
                return;
            }
        }

        for slot in self.slots.iter_mut() {
            if slot.is_none() {
                *slot = Some(Slot {
                    remaining: ticks,
                    target,
                    value,
                });
                return;
            }
        }

        // the queue is sized for the worst case the TIA can produce;
        // overflowing it means an emulator defect, not a bad program
        unreachable!("delay queue overflow");
    }

    /// Drop any pending entry for `target`.
    pub fn cancel(&mut self, target: Target) {
        for slot in self.slots.iter_mut() {
            if slot.map_or(false, |s| s.target == target) {
                *slot = None;
            }
        }
    }

    /// Advance one color clock. Entries reaching zero fire, in slot order.
    pub fn tick(&mut self) -> Fired {
        let mut fired = Fired {
            items: [(Target::Pf0, 0); CAPACITY],
            len: 0,
        };

        for slot in self.slots.iter_mut() {
            let due = match slot {
                Some(s) => {
                    s.remaining -= 1;
                    s.remaining == 0
                }
                None => false,
            };
            if due {
                if let Some(s) = slot.take() {
                    fired.items[fired.len] = (s.target, s.value);
                    fired.len += 1;
                }
            }
        }

        fired
    }
}
