//! TIA audio: two voices of polynomial noise and square tones.
//!
//! Each voice has a 4-bit control word (AUDC) selecting the generator, a
//! 5-bit frequency divider (AUDF) and a 4-bit volume (AUDV). The generators
//! are clocked at roughly 31.4 kHz, twice per scanline; the mixed sample
//! rides along in the television signal as an AudioUpdate/AudioData pair
//! and the consumer decimates to its own rate.

use serde::{Deserialize, Serialize};

use super::registers;
use crate::bus::ChipWrite;

/// Color clocks (within a scanline) on which the audio generators advance.
const AUDIO_CLOCK_A: u16 = 8;
const AUDIO_CLOCK_B: u16 = 148;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Channel {
    audc: u8,
    audf: u8,
    audv: u8,

    /// divider counter driven by AUDF
    div: u8,
    /// 4-bit polynomial shift register
    poly4: u8,
    /// 5-bit polynomial shift register
    poly5: u8,
    /// 9-bit polynomial shift register
    poly9: u16,
    /// divide-by-N counter for the pure tones
    tone: u8,
    /// current output bit
    out: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            audc: 0,
            audf: 0,
            audv: 0,
            div: 0,
            // polynomial registers must not start at zero or they stay there
            poly4: 0x0F,
            poly5: 0x1F,
            poly9: 0x1FF,
            tone: 0,
            out: false,
        }
    }
}

impl Channel {
    fn poly4_next(&mut self) -> bool {
        let fb = ((self.poly4 >> 3) ^ (self.poly4 >> 2)) & 0x01;
        self.poly4 = ((self.poly4 << 1) | fb) & 0x0F;
        self.poly4 & 0x01 != 0
    }

    fn poly5_next(&mut self) -> bool {
        let fb = ((self.poly5 >> 4) ^ (self.poly5 >> 2)) & 0x01;
        self.poly5 = ((self.poly5 << 1) | fb) & 0x1F;
        self.poly5 & 0x01 != 0
    }

    fn poly9_next(&mut self) -> bool {
        let fb = ((self.poly9 >> 8) ^ (self.poly9 >> 4)) & 0x01;
        self.poly9 = ((self.poly9 << 1) | fb) & 0x1FF;
        self.poly9 & 0x01 != 0
    }

    /// Advance the divide-by-N pure tone, toggling every `n` clocks.
    fn tone_next(&mut self, n: u8) -> bool {
        self.tone += 1;
        if self.tone >= n {
            self.tone = 0;
            self.out = !self.out;
        }
        self.out
    }

    /// One 31.4 kHz generator clock.
    fn clock(&mut self) {
        self.div += 1;
        if self.div <= self.audf {
            return;
        }
        self.div = 0;

        self.out = match self.audc {
            0x0 | 0xB => true,         // constant volume
            0x1 => self.poly4_next(),  // 4-bit poly
            0x2 => {
                // 4-bit poly gated by a div-15 counter
                if self.tone_next(15) {
                    self.poly4_next()
                } else {
                    self.out
                }
            }
            0x3 => {
                // 5-bit poly clocking the 4-bit poly
                if self.poly5_next() {
                    self.poly4_next()
                } else {
                    self.out
                }
            }
            0x4 | 0x5 => self.tone_next(1),  // div-2 pure tone
            0x6 | 0xA => self.tone_next(15), // div-31 tone
            0x7 | 0x9 => self.poly5_next(),  // 5-bit poly
            0x8 => self.poly9_next(),        // 9-bit poly
            0xC | 0xD => self.tone_next(3),  // div-6 tone
            0xE => self.tone_next(46),       // div-93 tone
            _ => {
                // 0xF: 5-bit poly, div-6 rate
                if self.tone_next(3) {
                    self.poly5_next()
                } else {
                    self.out
                }
            }
        };
    }

    fn sample(&self) -> u8 {
        if self.out {
            self.audv & 0x0F
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Audio {
    channel0: Channel,
    channel1: Channel,
    last_sample: u8,
}

impl Audio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service an audio register write. Returns true when consumed.
    pub fn update_registers(&mut self, w: &ChipWrite) -> bool {
        match w.reg {
            registers::AUDC0 => self.channel0.audc = w.value & 0x0F,
            registers::AUDC1 => self.channel1.audc = w.value & 0x0F,
            registers::AUDF0 => self.channel0.audf = w.value & 0x1F,
            registers::AUDF1 => self.channel1.audf = w.value & 0x1F,
            registers::AUDV0 => self.channel0.audv = w.value & 0x0F,
            registers::AUDV1 => self.channel1.audv = w.value & 0x0F,
            _ => return false,
        }
        true
    }

    /// Produce the (AudioUpdate, AudioData) pair for this color clock.
    pub fn mix(&mut self, line_clock: u16) -> (bool, u8) {
        if line_clock == AUDIO_CLOCK_A || line_clock == AUDIO_CLOCK_B {
            self.channel0.clock();
            self.channel1.clock();
            self.last_sample = self.channel0.sample() + self.channel1.sample();
            (true, self.last_sample)
        } else {
            (false, self.last_sample)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(reg: u8, value: u8) -> ChipWrite {
        ChipWrite { reg, value }
    }

    #[test]
    fn test_register_service() {
        let mut audio = Audio::new();
        assert!(audio.update_registers(&write(registers::AUDC0, 0x04)));
        assert!(audio.update_registers(&write(registers::AUDV0, 0x0A)));
        assert!(audio.update_registers(&write(registers::AUDF0, 0x00)));
        assert!(!audio.update_registers(&write(registers::COLUBK, 0)));
    }

    #[test]
    fn test_updates_twice_per_scanline() {
        let mut audio = Audio::new();
        let updates = (0..228).filter(|&clk| audio.mix(clk).0).count();
        assert_eq!(updates, 2);
    }

    #[test]
    fn test_pure_tone_toggles() {
        let mut audio = Audio::new();
        audio.update_registers(&write(registers::AUDC0, 0x04));
        audio.update_registers(&write(registers::AUDV0, 0x0F));
        audio.update_registers(&write(registers::AUDF0, 0x00));

        // a div-2 tone at AUDF=0 flips the output on every generator clock
        let mut samples = Vec::new();
        for _ in 0..4 {
            audio.mix(AUDIO_CLOCK_A);
            samples.push(audio.last_sample);
        }
        assert!(samples.iter().any(|&s| s == 0x0F));
        assert!(samples.iter().any(|&s| s == 0x00));
    }

    #[test]
    fn test_volume_zero_is_silent() {
        let mut audio = Audio::new();
        audio.update_registers(&write(registers::AUDC0, 0x04));
        audio.update_registers(&write(registers::AUDV0, 0x00));
        for clk in 0..228 {
            let (_, sample) = audio.mix(clk);
            assert_eq!(sample, 0);
        }
    }

    #[test]
    fn test_poly4_cycle_length() {
        let mut ch = Channel::default();
        let start = ch.poly4;
        let mut len = 0;
        loop {
            ch.poly4_next();
            len += 1;
            if ch.poly4 == start || len > 32 {
                break;
            }
        }
        assert_eq!(len, 15);
    }
}
