//! Input: hand controllers and the console panel.
//!
//! Controller state arrives through [`Input::handle`] as port events and is
//! folded into the lines the chips actually see: SWCHA direction bits for
//! the RIOT, INPT0-5 for the TIA read registers. Paddles are modelled as
//! charging capacitors (VBLANK bit 7 grounds them, the charge rate follows
//! the paddle position), and VBLANK bit 6 turns the fire-button inputs into
//! latches.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("bad input event for port {port}: {event}")]
    BadEvent { port: usize, event: String },
    #[error("input device on port {port} is unplugged")]
    Unplugged { port: usize },
}

/// Per-port controller events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Left(bool),
    Right(bool),
    Up(bool),
    Down(bool),
    Fire(bool),
    /// paddle position in [0,1]
    PaddleSet(f32),
    PaddleFire(bool),
    /// key in '0'..'9', '*' or '#'
    KeyboardDown(char),
    KeyboardUp,
    Unplug,
}

/// Console switch events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelEvent {
    SetPlayer0Pro(bool),
    SetPlayer1Pro(bool),
    SetColor(bool),
    TogglePlayer0Pro,
    TogglePlayer1Pro,
    ToggleColor,
    PressSelect(bool),
    PressReset(bool),
}

/// Default paddle charge per CPU cycle at minimum resistance. Hardware
/// values vary between paddle revisions; this one fills the capacitor in
/// roughly half a frame. Tunable through [`Input::set_paddle_sensitivity`].
const DEFAULT_PADDLE_SENSITIVITY: f32 = 0.0001;

const KEYPAD_ROWS: [[char; 3]; 4] = [
    ['1', '2', '3'],
    ['4', '5', '6'],
    ['7', '8', '9'],
    ['*', '0', '#'],
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Port {
    plugged: bool,

    up: bool,
    down: bool,
    left: bool,
    right: bool,
    fire: bool,
    /// sticky copy of `fire` while VBLANK bit 6 holds the latch
    fire_latched: bool,

    paddle_position: f32,
    paddle_charge: f32,
    paddle_fire: bool,

    keypad_held: Option<char>,
}

impl Default for Port {
    fn default() -> Self {
        Self {
            plugged: true,
            up: false,
            down: false,
            left: false,
            right: false,
            fire: false,
            fire_latched: false,
            paddle_position: 0.5,
            paddle_charge: 0.0,
            paddle_fire: false,
            keypad_held: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Panel {
    reset_pressed: bool,
    select_pressed: bool,
    color: bool,
    player0_pro: bool,
    player1_pro: bool,
}

impl Default for Panel {
    fn default() -> Self {
        Self {
            reset_pressed: false,
            select_pressed: false,
            color: true,
            player0_pro: false,
            player1_pro: false,
        }
    }
}

impl Panel {
    /// SWCHB value: switches are active low, difficulty bits read 1 for
    /// the professional position.
    fn swchb(&self) -> u8 {
        let mut v = 0u8;
        if !self.reset_pressed {
            v |= 0x01;
        }
        if !self.select_pressed {
            v |= 0x02;
        }
        if self.color {
            v |= 0x08;
        }
        if self.player0_pro {
            v |= 0x40;
        }
        if self.player1_pro {
            v |= 0x80;
        }
        v
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    ports: [Port; 2],
    panel: Panel,

    paddle_sensitivity: f32,
    /// VBLANK bit 7: paddle capacitors held at ground
    ground_paddles: bool,
    /// VBLANK bit 6: INPT4/5 act as latches
    latch_buttons: bool,

    /// SWCHA lines driven by the RIOT (for keypad row selection)
    row_select: u8,
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

impl Input {
    pub fn new() -> Self {
        Self {
            ports: [Port::default(), Port::default()],
            panel: Panel::default(),
            paddle_sensitivity: DEFAULT_PADDLE_SENSITIVITY,
            ground_paddles: false,
            latch_buttons: false,
            row_select: 0xFF,
        }
    }

    pub fn reset(&mut self) {
        let sensitivity = self.paddle_sensitivity;
        *self = Self::new();
        self.paddle_sensitivity = sensitivity;
    }

    pub fn set_paddle_sensitivity(&mut self, sensitivity: f32) {
        self.paddle_sensitivity = sensitivity;
    }

    /// Apply a controller event to a port.
    pub fn handle(&mut self, port: usize, event: Event) -> Result<(), InputError> {
        if port > 1 {
            return Err(InputError::BadEvent {
                port,
                event: format!("{:?}", event),
            });
        }
        let p = &mut self.ports[port];

        if let Event::Unplug = event {
            *p = Port::default();
            p.plugged = false;
            return Ok(());
        }
        if !p.plugged {
            return Err(InputError::Unplugged { port });
        }

        match event {
            Event::Left(v) => p.left = v,
            Event::Right(v) => p.right = v,
            Event::Up(v) => p.up = v,
            Event::Down(v) => p.down = v,
            Event::Fire(v) => {
                p.fire = v;
                if v {
                    p.fire_latched = true;
                }
            }
            Event::PaddleSet(pos) => {
                if !(0.0..=1.0).contains(&pos) {
                    return Err(InputError::BadEvent {
                        port,
                        event: format!("paddle position {}", pos),
                    });
                }
                p.paddle_position = pos;
            }
            Event::PaddleFire(v) => p.paddle_fire = v,
            Event::KeyboardDown(key) => {
                if !KEYPAD_ROWS.iter().flatten().any(|&k| k == key) {
                    return Err(InputError::BadEvent {
                        port,
                        event: format!("keypad key {:?}", key),
                    });
                }
                p.keypad_held = Some(key);
            }
            Event::KeyboardUp => p.keypad_held = None,
            Event::Unplug => unreachable!(),
        }
        Ok(())
    }

    /// Apply a console panel event.
    pub fn handle_panel(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::SetPlayer0Pro(v) => self.panel.player0_pro = v,
            PanelEvent::SetPlayer1Pro(v) => self.panel.player1_pro = v,
            PanelEvent::SetColor(v) => self.panel.color = v,
            PanelEvent::TogglePlayer0Pro => self.panel.player0_pro = !self.panel.player0_pro,
            PanelEvent::TogglePlayer1Pro => self.panel.player1_pro = !self.panel.player1_pro,
            PanelEvent::ToggleColor => self.panel.color = !self.panel.color,
            PanelEvent::PressSelect(v) => self.panel.select_pressed = v,
            PanelEvent::PressReset(v) => self.panel.reset_pressed = v,
        }
    }

    /// VBLANK bits 6 and 7, forwarded by the TIA when the register is
    /// serviced.
    pub fn set_vblank_bits(&mut self, value: u8) {
        self.latch_buttons = value & 0x40 != 0;
        if !self.latch_buttons {
            for p in &mut self.ports {
                p.fire_latched = false;
            }
        }

        self.ground_paddles = value & 0x80 != 0;
        if self.ground_paddles {
            for p in &mut self.ports {
                p.paddle_charge = 0.0;
            }
        }
    }

    /// One CPU cycle of analog simulation: paddle capacitors charge at a
    /// rate set by the paddle position until they trip the input threshold.
    pub fn step(&mut self) {
        if self.ground_paddles {
            return;
        }
        let sensitivity = self.paddle_sensitivity;
        for p in &mut self.ports {
            if p.paddle_charge < 1.0 {
                let rate = sensitivity * (1.05 - p.paddle_position);
                p.paddle_charge = (p.paddle_charge + rate).min(1.0);
            }
        }
    }

    /// The RIOT's driven SWCHA lines, used for keypad row selection.
    pub fn set_row_select(&mut self, lines: u8) {
        self.row_select = lines;
    }

    /// External SWCHA lines: joystick directions, active low. Player 0 in
    /// the high nibble.
    pub fn swcha(&self) -> u8 {
        let mut v = 0xFFu8;
        let p0 = &self.ports[0];
        if p0.up {
            v &= !0x10;
        }
        if p0.down {
            v &= !0x20;
        }
        if p0.left {
            v &= !0x40;
        }
        if p0.right {
            v &= !0x80;
        }
        // paddle fire buttons also pull SWCHA lines low
        if p0.paddle_fire {
            v &= !0x80;
        }

        let p1 = &self.ports[1];
        if p1.up {
            v &= !0x01;
        }
        if p1.down {
            v &= !0x02;
        }
        if p1.left {
            v &= !0x04;
        }
        if p1.right {
            v &= !0x08;
        }
        if p1.paddle_fire {
            v &= !0x08;
        }

        v
    }

    /// SWCHB value from the console switches.
    pub fn swchb(&self) -> u8 {
        self.panel.swchb()
    }

    /// TIA input registers INPT0..INPT5 (index 0..5), bit 7 significant.
    pub fn inpt(&self, index: u8) -> u8 {
        match index {
            // INPT0-3: paddle charge, or keypad columns 0/1
            0 | 1 => self.port_analog(0, index),
            2 | 3 => self.port_analog(1, index - 2),
            // INPT4/5: joystick fire (active low) or keypad column 2
            4 => self.port_fire(0),
            _ => self.port_fire(1),
        }
    }

    fn port_analog(&self, port: usize, column: u8) -> u8 {
        let p = &self.ports[port];
        if p.keypad_held.is_some() {
            return self.keypad_column(port, column);
        }
        // the first paddle on each port; the second is unconnected here
        if column == 0 && p.paddle_charge >= 1.0 {
            0x80
        } else {
            0x00
        }
    }

    fn port_fire(&self, port: usize) -> u8 {
        let p = &self.ports[port];
        if p.keypad_held.is_some() {
            return self.keypad_column(port, 2);
        }
        if !p.plugged {
            return 0x80;
        }
        let pressed = if self.latch_buttons {
            p.fire_latched
        } else {
            p.fire
        };
        if pressed {
            0x00
        } else {
            0x80
        }
    }

    /// Keypad column sense: low when the held key's row is driven low and
    /// the key sits in this column.
    fn keypad_column(&self, port: usize, column: u8) -> u8 {
        let held = match self.ports[port].keypad_held {
            Some(k) => k,
            None => return 0x80,
        };

        for (row, keys) in KEYPAD_ROWS.iter().enumerate() {
            if keys[column as usize] != held {
                continue;
            }
            // port 0 rows on SWCHA bits 4-7, port 1 rows on bits 0-3
            let bit = if port == 0 { 0x10 << row } else { 0x01 << row };
            if self.row_select & bit == 0 {
                return 0x00;
            }
        }
        0x80
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joystick_directions_active_low() {
        let mut input = Input::new();
        assert_eq!(input.swcha(), 0xFF);

        input.handle(0, Event::Right(true)).unwrap();
        assert_eq!(input.swcha() & 0x80, 0x00);

        input.handle(1, Event::Up(true)).unwrap();
        assert_eq!(input.swcha() & 0x01, 0x00);

        input.handle(0, Event::Right(false)).unwrap();
        assert_eq!(input.swcha() & 0x80, 0x80);
    }

    #[test]
    fn test_fire_button() {
        let mut input = Input::new();
        assert_eq!(input.inpt(4), 0x80);
        input.handle(0, Event::Fire(true)).unwrap();
        assert_eq!(input.inpt(4), 0x00);
        input.handle(0, Event::Fire(false)).unwrap();
        assert_eq!(input.inpt(4), 0x80);
    }

    #[test]
    fn test_button_latch_via_vblank() {
        let mut input = Input::new();
        input.set_vblank_bits(0x40);

        input.handle(0, Event::Fire(true)).unwrap();
        input.handle(0, Event::Fire(false)).unwrap();
        // latched low even after release
        assert_eq!(input.inpt(4), 0x00);

        // clearing the latch mode releases it
        input.set_vblank_bits(0x00);
        assert_eq!(input.inpt(4), 0x80);
    }

    #[test]
    fn test_paddle_charges_over_time() {
        let mut input = Input::new();
        input.handle(0, Event::PaddleSet(0.0)).unwrap();
        assert_eq!(input.inpt(0), 0x00);

        for _ in 0..20_000 {
            input.step();
        }
        assert_eq!(input.inpt(0), 0x80);
    }

    #[test]
    fn test_vblank_grounds_paddles() {
        let mut input = Input::new();
        input.handle(0, Event::PaddleSet(0.0)).unwrap();
        for _ in 0..20_000 {
            input.step();
        }
        assert_eq!(input.inpt(0), 0x80);

        input.set_vblank_bits(0x80);
        assert_eq!(input.inpt(0), 0x00);
    }

    #[test]
    fn test_paddle_position_slows_charging() {
        let mut fast = Input::new();
        fast.handle(0, Event::PaddleSet(0.0)).unwrap();
        let mut slow = Input::new();
        slow.handle(0, Event::PaddleSet(1.0)).unwrap();

        let mut fast_cycles = 0u32;
        while fast.inpt(0) == 0x00 {
            fast.step();
            fast_cycles += 1;
        }
        let mut slow_cycles = 0u32;
        while slow.inpt(0) == 0x00 {
            slow.step();
            slow_cycles += 1;
        }
        assert!(slow_cycles > fast_cycles * 2);
    }

    #[test]
    fn test_keypad_scanning() {
        let mut input = Input::new();
        input.handle(0, Event::KeyboardDown('5')).unwrap();

        // '5' is row 1, column 1: INPT1 goes low only when row 1 is driven
        input.set_row_select(0xFF);
        assert_eq!(input.inpt(1), 0x80);

        input.set_row_select(!0x20); // drive port 0 row 1 low
        assert_eq!(input.inpt(1), 0x00);
        // other columns stay high
        assert_eq!(input.inpt(0), 0x80);
        assert_eq!(input.inpt(4), 0x80);

        input.handle(0, Event::KeyboardUp).unwrap();
        assert_eq!(input.inpt(1), 0x80);
    }

    #[test]
    fn test_unplug() {
        let mut input = Input::new();
        input.handle(0, Event::Unplug).unwrap();
        match input.handle(0, Event::Fire(true)) {
            Err(InputError::Unplugged { port: 0 }) => {}
            other => panic!("expected Unplugged, got {:?}", other),
        }
    }

    #[test]
    fn test_panel_switches() {
        let mut input = Input::new();
        // color on, nothing pressed, both difficulty amateur
        assert_eq!(input.swchb(), 0x0B);

        input.handle_panel(PanelEvent::PressReset(true));
        assert_eq!(input.swchb() & 0x01, 0x00);
        input.handle_panel(PanelEvent::PressReset(false));

        input.handle_panel(PanelEvent::SetPlayer0Pro(true));
        assert_eq!(input.swchb() & 0x40, 0x40);

        input.handle_panel(PanelEvent::ToggleColor);
        assert_eq!(input.swchb() & 0x08, 0x00);
    }

    #[test]
    fn test_bad_events() {
        let mut input = Input::new();
        assert!(input.handle(2, Event::Fire(true)).is_err());
        assert!(input.handle(0, Event::PaddleSet(1.5)).is_err());
        assert!(input.handle(0, Event::KeyboardDown('x')).is_err());
    }
}
