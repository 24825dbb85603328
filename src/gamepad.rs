//! Canonical gamepad state shared by every controller family.
//!
//! Codecs fill a [`GamepadState`] from a notification and read it back
//! when building a frame.  [`SharedGamepad`] publishes the latest decoded
//! state from the BLE event context to the application without a lock.

use core::hint::spin_loop;
use core::sync::atomic::{fence, AtomicU16, AtomicU32, Ordering};

/// Every digital input a supported controller can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Button {
    A = 0,
    B = 1,
    X = 2,
    Y = 3,
    /// Left bumper.
    Lb = 4,
    /// Right bumper.
    Rb = 5,
    /// Left stick click.
    Ls = 6,
    /// Right stick click.
    Rs = 7,
    DpadUp = 8,
    DpadDown = 9,
    DpadLeft = 10,
    DpadRight = 11,
    Start = 12,
    Select = 13,
    Home = 14,
    Share = 15,
}

impl Button {
    pub const ALL: [Button; 16] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::Lb,
        Button::Rb,
        Button::Ls,
        Button::Rs,
        Button::DpadUp,
        Button::DpadDown,
        Button::DpadLeft,
        Button::DpadRight,
        Button::Start,
        Button::Select,
        Button::Home,
        Button::Share,
    ];

    const fn mask(self) -> u16 {
        1 << self as u8
    }
}

/// Hat switch position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DPad {
    #[default]
    Neutral,
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
}

impl DPad {
    pub const ALL: [DPad; 9] = [
        DPad::Neutral,
        DPad::Up,
        DPad::UpRight,
        DPad::Right,
        DPad::DownRight,
        DPad::Down,
        DPad::DownLeft,
        DPad::Left,
        DPad::UpLeft,
    ];

    /// Collapse four direction flags into one position.
    ///
    /// Up wins over down and right wins over left when a state carries
    /// contradicting flags.
    pub const fn from_flags(up: bool, right: bool, down: bool, left: bool) -> Self {
        match (up, down, right, left) {
            (true, _, true, _) => DPad::UpRight,
            (true, _, false, true) => DPad::UpLeft,
            (true, _, false, false) => DPad::Up,
            (false, true, true, _) => DPad::DownRight,
            (false, true, false, true) => DPad::DownLeft,
            (false, true, false, false) => DPad::Down,
            (false, false, true, _) => DPad::Right,
            (false, false, false, true) => DPad::Left,
            (false, false, false, false) => DPad::Neutral,
        }
    }

    /// `(up, right, down, left)`
    pub const fn flags(self) -> (bool, bool, bool, bool) {
        match self {
            DPad::Neutral => (false, false, false, false),
            DPad::Up => (true, false, false, false),
            DPad::UpRight => (true, true, false, false),
            DPad::Right => (false, true, false, false),
            DPad::DownRight => (false, true, true, false),
            DPad::Down => (false, false, true, false),
            DPad::DownLeft => (false, false, true, true),
            DPad::Left => (false, false, false, true),
            DPad::UpLeft => (true, false, false, true),
        }
    }
}

/// Device-independent snapshot of a controller.
///
/// Axis and trigger values are raw counts in the active codec's range
/// (`0..=max`); the codec rejects frames and states that do not fit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GamepadState {
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub lb: bool,
    pub rb: bool,
    pub ls: bool,
    pub rs: bool,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
    pub start: bool,
    pub select: bool,
    pub home: bool,
    pub share: bool,
    pub left_x: u16,
    pub left_y: u16,
    pub right_x: u16,
    pub right_y: u16,
    pub lt: u16,
    pub rt: u16,
}

impl GamepadState {
    /// All buttons released, sticks at `stick_center`, triggers at rest.
    pub const fn centered(stick_center: u16) -> Self {
        Self {
            a: false,
            b: false,
            x: false,
            y: false,
            lb: false,
            rb: false,
            ls: false,
            rs: false,
            dpad_up: false,
            dpad_down: false,
            dpad_left: false,
            dpad_right: false,
            start: false,
            select: false,
            home: false,
            share: false,
            left_x: stick_center,
            left_y: stick_center,
            right_x: stick_center,
            right_y: stick_center,
            lt: 0,
            rt: 0,
        }
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.button_bits() & button.mask() != 0
    }

    pub fn set(&mut self, button: Button, pressed: bool) {
        let slot = match button {
            Button::A => &mut self.a,
            Button::B => &mut self.b,
            Button::X => &mut self.x,
            Button::Y => &mut self.y,
            Button::Lb => &mut self.lb,
            Button::Rb => &mut self.rb,
            Button::Ls => &mut self.ls,
            Button::Rs => &mut self.rs,
            Button::DpadUp => &mut self.dpad_up,
            Button::DpadDown => &mut self.dpad_down,
            Button::DpadLeft => &mut self.dpad_left,
            Button::DpadRight => &mut self.dpad_right,
            Button::Start => &mut self.start,
            Button::Select => &mut self.select,
            Button::Home => &mut self.home,
            Button::Share => &mut self.share,
        };
        *slot = pressed;
    }

    pub fn dpad(&self) -> DPad {
        DPad::from_flags(self.dpad_up, self.dpad_right, self.dpad_down, self.dpad_left)
    }

    pub fn set_dpad(&mut self, dpad: DPad) {
        let (up, right, down, left) = dpad.flags();
        self.dpad_up = up;
        self.dpad_right = right;
        self.dpad_down = down;
        self.dpad_left = left;
    }

    /// `[left_x, left_y, right_x, right_y, lt, rt]`
    pub const fn axes(&self) -> [u16; 6] {
        [
            self.left_x,
            self.left_y,
            self.right_x,
            self.right_y,
            self.lt,
            self.rt,
        ]
    }

    /// Buttons packed one bit per [`Button`], bit index = discriminant.
    pub const fn button_bits(&self) -> u16 {
        (self.a as u16)
            | (self.b as u16) << 1
            | (self.x as u16) << 2
            | (self.y as u16) << 3
            | (self.lb as u16) << 4
            | (self.rb as u16) << 5
            | (self.ls as u16) << 6
            | (self.rs as u16) << 7
            | (self.dpad_up as u16) << 8
            | (self.dpad_down as u16) << 9
            | (self.dpad_left as u16) << 10
            | (self.dpad_right as u16) << 11
            | (self.start as u16) << 12
            | (self.select as u16) << 13
            | (self.home as u16) << 14
            | (self.share as u16) << 15
    }

    pub fn from_parts(button_bits: u16, axes: [u16; 6]) -> Self {
        let mut state = Self::default();
        for button in Button::ALL {
            state.set(button, button_bits & button.mask() != 0);
        }
        let [left_x, left_y, right_x, right_y, lt, rt] = axes;
        state.left_x = left_x;
        state.left_y = left_y;
        state.right_x = right_x;
        state.right_y = right_y;
        state.lt = lt;
        state.rt = rt;
        state
    }
}

/// Lock-free holder for the latest [`GamepadState`].
///
/// Single writer.  A sequence counter guards the fields: the writer makes it
/// odd while it stores, readers retry until they see the same even value on
/// both sides of their loads.  The writer never waits; callers must not
/// publish from more than one context.
pub struct SharedGamepad {
    seq: AtomicU32,
    buttons: AtomicU16,
    axes: [AtomicU16; 6],
}

impl SharedGamepad {
    pub const fn new(initial: GamepadState) -> Self {
        let [left_x, left_y, right_x, right_y, lt, rt] = initial.axes();
        Self {
            seq: AtomicU32::new(0),
            buttons: AtomicU16::new(initial.button_bits()),
            axes: [
                AtomicU16::new(left_x),
                AtomicU16::new(left_y),
                AtomicU16::new(right_x),
                AtomicU16::new(right_y),
                AtomicU16::new(lt),
                AtomicU16::new(rt),
            ],
        }
    }

    pub fn publish(&self, state: &GamepadState) {
        let seq = self.begin_write();
        self.buttons.store(state.button_bits(), Ordering::Relaxed);
        for (slot, value) in self.axes.iter().zip(state.axes()) {
            slot.store(value, Ordering::Relaxed);
        }
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    pub fn snapshot(&self) -> GamepadState {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                spin_loop();
                continue;
            }
            let buttons = self.buttons.load(Ordering::Relaxed);
            let mut axes = [0u16; 6];
            for (value, slot) in axes.iter_mut().zip(self.axes.iter()) {
                *value = slot.load(Ordering::Relaxed);
            }
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return GamepadState::from_parts(buttons, axes);
            }
        }
    }

    /// Mark a write in progress; returns the even value it replaced.
    fn begin_write(&self) -> u32 {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        seq
    }
}
