//! RIOT (6532): 128 bytes of RAM, two I/O ports and the interval timer.
//!
//! The timer decrements at CPU-cycle granularity through one of four
//! divisors (1, 8, 64, 1024) selected by which write register armed it.
//! On underflow it switches to the 1-cycle divisor and raises the expired
//! latch, readable (and cleared) through TIMINT.
//!
//! The ports are re-latched from [`Input`] every cycle; CPU writes drive
//! only the bits their data-direction register marks as outputs.

use serde::{Deserialize, Serialize};

use crate::bus::ChipWrite;
use crate::input::Input;

mod serde_ram {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(arr: &[u8; 128], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        arr.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 128], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = Vec::<u8>::deserialize(deserializer)?;
        let mut arr = [0u8; 128];
        if vec.len() == 128 {
            arr.copy_from_slice(&vec);
        }
        Ok(arr)
    }
}

/// Register offsets within the RIOT I/O page (address & 0x1F).
pub mod registers {
    pub const SWCHA: u8 = 0x00;
    pub const SWACNT: u8 = 0x01;
    pub const SWCHB: u8 = 0x02;
    pub const SWBCNT: u8 = 0x03;
    pub const INTIM: u8 = 0x04;
    pub const TIMINT: u8 = 0x05;
    pub const TIM1T: u8 = 0x14;
    pub const TIM8T: u8 = 0x15;
    pub const TIM64T: u8 = 0x16;
    pub const T1024T: u8 = 0x17;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Riot {
    #[serde(with = "serde_ram")]
    ram: [u8; 128],

    timer: u8,
    interval: u16,
    interval_ticks: u16,
    expired: bool,

    /// CPU-written port values; only output bits reach the pins
    swcha_out: u8,
    swacnt: u8,
    swchb_out: u8,
    swbcnt: u8,

    /// latched pin state, re-sampled from input every cycle
    swcha: u8,
    swchb: u8,
}

impl Default for Riot {
    fn default() -> Self {
        Self::new()
    }
}

impl Riot {
    pub fn new() -> Self {
        Self {
            ram: [0; 128],
            timer: 0,
            interval: 1024,
            interval_ticks: 0,
            expired: false,
            swcha_out: 0,
            swacnt: 0,
            swchb_out: 0,
            swbcnt: 0,
            swcha: 0xFF,
            swchb: 0x0B,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // -- RAM ---------------------------------------------------------------

    pub fn ram_read(&self, addr: u16) -> u8 {
        self.ram[(addr & 0x7F) as usize]
    }

    pub fn ram_write(&mut self, addr: u16, value: u8) {
        self.ram[(addr & 0x7F) as usize] = value;
    }

    pub fn ram(&self) -> &[u8; 128] {
        &self.ram
    }

    // -- stepping ----------------------------------------------------------

    /// One CPU cycle: service a pending register write, re-latch the ports
    /// and advance the timer and analog inputs.
    pub fn step(&mut self, inbox: &mut Option<ChipWrite>, input: &mut Input) {
        if let Some(w) = inbox.take() {
            self.service_write(w);
        }

        input.step();

        // keypad rows follow the driven port lines; undriven lines float
        // high
        input.set_row_select(self.swcha_out | !self.swacnt);

        // pins: driven bits from the CPU, the rest from the controllers
        self.swcha = (self.swcha_out & self.swacnt) | (input.swcha() & !self.swacnt);
        self.swchb = (self.swchb_out & self.swbcnt) | (input.swchb() & !self.swbcnt);

        self.tick_timer();
    }

    fn tick_timer(&mut self) {
        self.interval_ticks += 1;
        if self.interval_ticks < self.interval {
            return;
        }
        self.interval_ticks = 0;

        if self.timer == 0 {
            // underflow: wrap and fall back to single-cycle decrements
            self.expired = true;
            self.interval = 1;
            self.timer = 0xFF;
        } else {
            self.timer -= 1;
            if self.timer == 0 {
                self.expired = true;
                self.interval = 1;
            }
        }
    }

    fn service_write(&mut self, w: ChipWrite) {
        match w.reg {
            registers::SWCHA => self.swcha_out = w.value,
            registers::SWACNT => self.swacnt = w.value,
            registers::SWCHB => self.swchb_out = w.value,
            registers::SWBCNT => self.swbcnt = w.value,
            registers::TIM1T => self.arm_timer(w.value, 1),
            registers::TIM8T => self.arm_timer(w.value, 8),
            registers::TIM64T => self.arm_timer(w.value, 64),
            registers::T1024T => self.arm_timer(w.value, 1024),
            _ => {}
        }
    }

    fn arm_timer(&mut self, value: u8, interval: u16) {
        self.timer = value;
        self.interval = interval;
        self.interval_ticks = 0;
        self.expired = false;
    }

    // -- register access ---------------------------------------------------

    /// CPU read of an I/O page register. Reading TIMINT clears the expired
    /// latch.
    pub fn register_read(&mut self, reg: u8) -> u8 {
        match reg & 0x07 {
            0x00 => self.swcha,
            0x01 => self.swacnt,
            0x02 => self.swchb,
            0x03 => self.swbcnt,
            0x04 | 0x06 => self.timer,
            _ => {
                let v = if self.expired { 0x80 } else { 0x00 };
                self.expired = false;
                v
            }
        }
    }

    /// Side-effect-free register read for the debugger.
    pub fn peek_register(&self, reg: u8) -> u8 {
        match reg & 0x07 {
            0x00 => self.swcha,
            0x01 => self.swacnt,
            0x02 => self.swchb,
            0x03 => self.swbcnt,
            0x04 | 0x06 => self.timer,
            _ => {
                if self.expired {
                    0x80
                } else {
                    0x00
                }
            }
        }
    }

    pub fn timer_value(&self) -> u8 {
        self.timer
    }

    pub fn timer_interval(&self) -> u16 {
        self.interval
    }

    pub fn timer_expired(&self) -> bool {
        self.expired
    }
}
