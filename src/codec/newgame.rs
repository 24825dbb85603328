//! Newgame controller notification layout.
//!
//! Layout (9 bytes):
//! ```text
//! Byte 0: Left stick X   (u8)
//! Byte 1: Left stick Y   (u8)
//! Byte 2: Right stick X  (u8)
//! Byte 3: Right stick Y  (u8)
//! Byte 4: Hat nibble     (0 = up, clockwise to 7 = up-left, 0xF = centre)
//! Byte 5: Bit 0 = A, Bit 1 = B, Bit 3 = X, Bit 4 = Y,
//!         Bit 6 = LB, Bit 7 = RB
//! Byte 6: Bit 0 = LS, Bit 1 = RS, Bit 2 = Select, Bit 3 = Start,
//!         Bit 4 = Home
//! Byte 7: Left trigger   (u8)
//! Byte 8: Right trigger  (u8)
//! ```
//!
//! The frame has no share bit; [`GamepadState::share`] always decodes as
//! released.

use super::hat::HatTable;
use super::{bit, check_max, expect_capacity, expect_exact_len, mask_if, ReportCodec};
use crate::error::Error;
use crate::gamepad::{Button, GamepadState};

/// Notification size in bytes.
pub const NEWGAME_FRAME_LEN: usize = 9;

pub const STICK_MAX: u16 = 0xFF;
pub const STICK_CENTER: u16 = 0x80;
pub const TRIGGER_MAX: u16 = 0xFF;

const IDX_LEFT_X: usize = 0;
const IDX_LEFT_Y: usize = 1;
const IDX_RIGHT_X: usize = 2;
const IDX_RIGHT_Y: usize = 3;
const IDX_HAT: usize = 4;
const IDX_BUTTONS_MAIN: usize = 5;
const IDX_BUTTONS_CENTER: usize = 6;
const IDX_LT: usize = 7;
const IDX_RT: usize = 8;

const MAIN_A: u8 = 0b0000_0001;
const MAIN_B: u8 = 0b0000_0010;
const MAIN_X: u8 = 0b0000_1000;
const MAIN_Y: u8 = 0b0001_0000;
const MAIN_LB: u8 = 0b0100_0000;
const MAIN_RB: u8 = 0b1000_0000;

const CENTER_LS: u8 = 0b0000_0001;
const CENTER_RS: u8 = 0b0000_0010;
const CENTER_SELECT: u8 = 0b0000_0100;
const CENTER_START: u8 = 0b0000_1000;
const CENTER_HOME: u8 = 0b0001_0000;

// Up covers 0, 1 and 7; each diagonal sits in two ranges.
static HAT: HatTable = HatTable {
    up: &[0..=1, 7..=7],
    right: &[1..=3],
    down: &[3..=5],
    left: &[5..=7],
    codes: [0xF, 0, 1, 2, 3, 4, 5, 6, 7],
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Newgame;

impl ReportCodec for Newgame {
    fn frame_len(&self) -> usize {
        NEWGAME_FRAME_LEN
    }

    fn decode(&self, data: &[u8], state: &mut GamepadState) -> Result<(), Error> {
        expect_exact_len(data, NEWGAME_FRAME_LEN)?;

        let main = data[IDX_BUTTONS_MAIN];
        let center = data[IDX_BUTTONS_CENTER];

        let mut next = GamepadState {
            a: bit(main, MAIN_A),
            b: bit(main, MAIN_B),
            x: bit(main, MAIN_X),
            y: bit(main, MAIN_Y),
            lb: bit(main, MAIN_LB),
            rb: bit(main, MAIN_RB),
            ls: bit(center, CENTER_LS),
            rs: bit(center, CENTER_RS),
            start: bit(center, CENTER_START),
            select: bit(center, CENTER_SELECT),
            home: bit(center, CENTER_HOME),
            share: false,
            left_x: u16::from(data[IDX_LEFT_X]),
            left_y: u16::from(data[IDX_LEFT_Y]),
            right_x: u16::from(data[IDX_RIGHT_X]),
            right_y: u16::from(data[IDX_RIGHT_Y]),
            lt: u16::from(data[IDX_LT]),
            rt: u16::from(data[IDX_RT]),
            ..GamepadState::default()
        };
        next.set_dpad(HAT.decode(data[IDX_HAT]));

        *state = next;
        Ok(())
    }

    fn encode(&self, state: &GamepadState, buf: &mut [u8]) -> Result<usize, Error> {
        expect_capacity(buf, NEWGAME_FRAME_LEN)?;
        check_max(
            &[state.left_x, state.left_y, state.right_x, state.right_y],
            STICK_MAX,
        )?;
        check_max(&[state.lt, state.rt], TRIGGER_MAX)?;

        let mut frame = [0u8; NEWGAME_FRAME_LEN];
        // Ranges were checked above, the casts cannot truncate.
        frame[IDX_LEFT_X] = state.left_x as u8;
        frame[IDX_LEFT_Y] = state.left_y as u8;
        frame[IDX_RIGHT_X] = state.right_x as u8;
        frame[IDX_RIGHT_Y] = state.right_y as u8;
        frame[IDX_LT] = state.lt as u8;
        frame[IDX_RT] = state.rt as u8;
        frame[IDX_HAT] = HAT.encode(state.dpad());
        frame[IDX_BUTTONS_MAIN] = mask_if(state.a, MAIN_A)
            | mask_if(state.b, MAIN_B)
            | mask_if(state.x, MAIN_X)
            | mask_if(state.y, MAIN_Y)
            | mask_if(state.lb, MAIN_LB)
            | mask_if(state.rb, MAIN_RB);
        frame[IDX_BUTTONS_CENTER] = mask_if(state.ls, CENTER_LS)
            | mask_if(state.rs, CENTER_RS)
            | mask_if(state.select, CENTER_SELECT)
            | mask_if(state.start, CENTER_START)
            | mask_if(state.home, CENTER_HOME);

        buf[..NEWGAME_FRAME_LEN].copy_from_slice(&frame);
        Ok(NEWGAME_FRAME_LEN)
    }

    fn supports(&self, button: Button) -> bool {
        button != Button::Share
    }

    fn neutral(&self) -> GamepadState {
        GamepadState::centered(STICK_CENTER)
    }
}
