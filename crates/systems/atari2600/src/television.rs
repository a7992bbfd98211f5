//! Television signal sink.
//!
//! The TIA hands over one [`SignalAttributes`] record per color clock. The
//! television assembles those into scanlines and frames, enforces the
//! specification's scanline budget, and fans pixels and audio out to any
//! registered renderer and mixer.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vcs_core::types::Frame;

#[derive(Debug, Error)]
pub enum TelevisionError {
    #[error("unknown television request: {0}")]
    UnknownRequest(String),
    #[error("television out of specification ({scanlines} scanlines)")]
    OutOfSpec { scanlines: u16 },
}

/// Broadcast specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Specification {
    Ntsc,
    Pal,
}

impl Specification {
    /// Nominal scanlines per frame.
    pub fn scanlines_total(self) -> u16 {
        match self {
            Specification::Ntsc => 262,
            Specification::Pal => 312,
        }
    }

    /// Scanlines of vertical sync and blank before the visible window.
    pub fn visible_top(self) -> u16 {
        match self {
            Specification::Ntsc => 40,
            Specification::Pal => 48,
        }
    }

    /// Height of the visible window.
    pub fn visible_scanlines(self) -> u16 {
        match self {
            Specification::Ntsc => 192,
            Specification::Pal => 228,
        }
    }

    /// Accepted deviation from the nominal scanline count. Software-timed
    /// frames drift a line or two; sloppier than this is out of spec.
    pub fn tolerance(self) -> u16 {
        10
    }

    pub fn frames_per_second(self) -> f32 {
        match self {
            Specification::Ntsc => 60.0,
            Specification::Pal => 50.0,
        }
    }
}

/// One color clock of television signal.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SignalAttributes {
    pub hsync: bool,
    pub vsync: bool,
    pub cburst: bool,
    pub hblank: bool,
    pub vblank: bool,
    /// resolved palette index; None is video black
    pub pixel: Option<u8>,
    /// debug color, resolved even inside blanking
    pub alt_pixel: u8,
    pub audio_update: bool,
    pub audio_data: u8,
    /// explicit new-scanline marker from the TIA's sync machinery
    pub new_scanline: bool,
}

/// Receives resolved pixels. `x` counts visible color clocks from the left
/// edge, `y` scanlines from the top of the frame.
pub trait PixelRenderer {
    fn pixel(&mut self, x: u16, y: u16, color: Option<u8>, alt: u8);
    fn new_frame(&mut self);
}

/// Receives one sample per audio update (roughly 31.4 kHz).
pub trait AudioMixer {
    fn mix(&mut self, sample: u8);
}

/// Frame-assembling television.
#[derive(Serialize, Deserialize)]
pub struct Television {
    spec: Specification,

    /// color clock within the current scanline
    horiz: u16,
    /// scanline within the current frame
    scanline: u16,
    frame_count: u64,

    prev_vsync: bool,
    last_signal: SignalAttributes,

    /// requested frame rate; defaults to the specification's nominal rate
    target_fps: f32,
    #[serde(skip)]
    last_frame_at: Option<std::time::Instant>,
    #[serde(skip)]
    actual_fps: f32,

    /// frame being assembled; 160 visible clocks wide, full field tall
    working: Vec<u8>,
    /// most recently completed visible window
    #[serde(skip)]
    completed: Option<Frame>,

    #[serde(skip)]
    renderers: Vec<Box<dyn PixelRenderer>>,
    #[serde(skip)]
    mixers: Vec<Box<dyn AudioMixer>>,
}

impl std::fmt::Debug for Television {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Television")
            .field("spec", &self.spec)
            .field("horiz", &self.horiz)
            .field("scanline", &self.scanline)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

/// Sentinel palette value for video black in the working buffer.
const BLACK: u8 = 0xFF;

impl Television {
    pub fn new(spec: Specification) -> Self {
        let field = 160 * (spec.scanlines_total() + spec.tolerance()) as usize;
        Self {
            spec,
            horiz: 0,
            scanline: 0,
            frame_count: 0,
            prev_vsync: false,
            last_signal: SignalAttributes::default(),
            target_fps: spec.frames_per_second(),
            last_frame_at: None,
            actual_fps: 0.0,
            working: vec![BLACK; field],
            completed: None,
            renderers: Vec::new(),
            mixers: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.horiz = 0;
        self.scanline = 0;
        self.prev_vsync = false;
        self.working.fill(BLACK);
    }

    pub fn spec(&self) -> Specification {
        self.spec
    }

    pub fn last_signal(&self) -> SignalAttributes {
        self.last_signal
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    /// Ask for a frame rate other than the specification's nominal one.
    /// The core never throttles; hosts read this back to pace themselves.
    pub fn set_fps(&mut self, fps: f32) {
        self.target_fps = fps;
    }

    pub fn fps(&self) -> f32 {
        self.target_fps
    }

    /// Measured rate of completed frames, from wall-clock gaps between
    /// vertical syncs.
    pub fn actual_fps(&self) -> f32 {
        self.actual_fps
    }

    pub fn add_pixel_renderer(&mut self, renderer: Box<dyn PixelRenderer>) {
        self.renderers.push(renderer);
    }

    pub fn add_audio_mixer(&mut self, mixer: Box<dyn AudioMixer>) {
        self.mixers.push(mixer);
    }

    /// The most recently completed frame's visible window, if a full frame
    /// has been seen.
    pub fn frame(&self) -> Option<&Frame> {
        self.completed.as_ref()
    }

    /// Accept one color clock of signal.
    ///
    /// The returned `OutOfSpec` error is advisory: state stays consistent
    /// and the caller is expected to keep feeding signals.
    pub fn signal(&mut self, sig: SignalAttributes) -> Result<(), TelevisionError> {
        let mut result = Ok(());

        // vertical sync: a frame ends on the falling edge of VSYNC
        if self.prev_vsync && !sig.vsync {
            result = self.new_frame();
        }
        self.prev_vsync = sig.vsync;

        // record the visible portion of the line
        if let Some(color) = sig.pixel {
            if self.horiz >= 68 {
                let x = self.horiz - 68;
                if x < 160 {
                    let row = self.scanline as usize;
                    let idx = row * 160 + x as usize;
                    if idx < self.working.len() {
                        self.working[idx] = color;
                    }
                    for r in &mut self.renderers {
                        r.pixel(x, self.scanline, Some(color), sig.alt_pixel);
                    }
                }
            }
        }

        if sig.audio_update {
            for m in &mut self.mixers {
                m.mix(sig.audio_data);
            }
        }

        self.horiz += 1;

        if sig.new_scanline {
            self.horiz = 0;
            self.scanline += 1;

            // a rolling picture with no VSYNC in sight: resynchronise so
            // the working buffer cannot run away
            if self.scanline >= self.spec.scanlines_total() + self.spec.tolerance() {
                let scanlines = self.scanline;
                self.scanline = 0;
                self.working.fill(BLACK);
                return Err(TelevisionError::OutOfSpec { scanlines });
            }
        }

        self.last_signal = sig;
        result
    }

    fn new_frame(&mut self) -> Result<(), TelevisionError> {
        let scanlines = self.scanline;
        self.frame_count += 1;

        let now = std::time::Instant::now();
        if let Some(previous) = self.last_frame_at {
            let elapsed = now.duration_since(previous).as_secs_f32();
            if elapsed > 0.0 {
                self.actual_fps = 1.0 / elapsed;
            }
        }
        self.last_frame_at = Some(now);

        // extract the visible window
        let top = self.spec.visible_top() as usize;
        let height = self.spec.visible_scanlines() as usize;
        let mut frame = Frame::new(160, height as u32);
        for y in 0..height {
            for x in 0..160 {
                let color = self
                    .working
                    .get((top + y) * 160 + x)
                    .copied()
                    .unwrap_or(BLACK);
                // renderers see palette indices; the frame stores them in
                // the low byte with black fully opaque
                frame.pixels[y * 160 + x] = if color == BLACK {
                    0xFF00_0000
                } else {
                    0xFF00_0000 | color as u32
                };
            }
        }
        self.completed = Some(frame);

        for r in &mut self.renderers {
            r.new_frame();
        }

        self.working.fill(BLACK);
        self.scanline = 0;

        let nominal = self.spec.scanlines_total();
        let tolerance = self.spec.tolerance();
        if scanlines + tolerance < nominal || scanlines > nominal + tolerance {
            return Err(TelevisionError::OutOfSpec { scanlines });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_signal() -> SignalAttributes {
        SignalAttributes::default()
    }

    fn feed_scanline(tv: &mut Television, pixel: Option<u8>) {
        for clk in 0..228 {
            let mut sig = blank_signal();
            if clk >= 68 {
                sig.pixel = pixel;
            }
            sig.new_scanline = clk == 227;
            let _ = tv.signal(sig);
        }
    }

    #[test]
    fn test_scanline_counting() {
        let mut tv = Television::new(Specification::Ntsc);
        feed_scanline(&mut tv, None);
        assert_eq!(tv.scanline(), 1);
        feed_scanline(&mut tv, None);
        assert_eq!(tv.scanline(), 2);
    }

    #[test]
    fn test_frame_on_vsync_falling_edge() {
        let mut tv = Television::new(Specification::Ntsc);

        // a well-formed NTSC field: 3 vsync lines then 259 more
        for line in 0..262 {
            for clk in 0..228u16 {
                let mut sig = blank_signal();
                sig.vsync = line < 3;
                sig.new_scanline = clk == 227;
                let _ = tv.signal(sig);
            }
        }
        // next field's vsync pulse ends the frame; the very first falling
        // edge (after the three opening vsync lines) already counted one
        let mut sig = blank_signal();
        sig.vsync = true;
        let _ = tv.signal(sig);
        sig.vsync = false;
        assert!(tv.signal(sig).is_ok());
        assert_eq!(tv.frame_count(), 2);
    }

    #[test]
    fn test_out_of_spec_scanline_count() {
        let mut tv = Television::new(Specification::Ntsc);

        let mut out_of_spec = false;
        for _ in 0..(262 + 20) {
            feed_scanline(&mut tv, None);
            if tv.scanline() == 0 {
                out_of_spec = true;
            }
        }
        assert!(out_of_spec, "runaway frame should trip the spec check");
    }

    #[test]
    fn test_visible_window_extraction() {
        let mut tv = Television::new(Specification::Ntsc);

        for line in 0..262 {
            let pixel = if line >= 40 && line < 232 { Some(0x1A) } else { None };
            feed_scanline(&mut tv, pixel);
        }
        let mut sig = blank_signal();
        sig.vsync = true;
        let _ = tv.signal(sig);
        sig.vsync = false;
        let _ = tv.signal(sig);

        let frame = tv.frame().expect("frame completed");
        assert_eq!(frame.width, 160);
        assert_eq!(frame.height, 192);
        assert!(frame.pixels.iter().all(|&p| p == 0xFF00_001A));
    }

    #[test]
    fn test_audio_fanout() {
        struct Counter(std::rc::Rc<std::cell::Cell<usize>>);
        impl AudioMixer for Counter {
            fn mix(&mut self, _sample: u8) {
                self.0.set(self.0.get() + 1);
            }
        }

        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut tv = Television::new(Specification::Ntsc);
        tv.add_audio_mixer(Box::new(Counter(count.clone())));

        let mut sig = blank_signal();
        sig.audio_update = true;
        let _ = tv.signal(sig);
        let _ = tv.signal(sig);
        assert_eq!(count.get(), 2);
    }
}
