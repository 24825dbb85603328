//! Xbox-style controller notification layout.
//!
//! Layout (16 bytes):
//! ```text
//! Byte 0-1:   Left stick X   (u16 LE, 0..=0xFFFF)
//! Byte 2-3:   Left stick Y   (u16 LE)
//! Byte 4-5:   Right stick X  (u16 LE)
//! Byte 6-7:   Right stick Y  (u16 LE)
//! Byte 8-9:   Left trigger   (u16 LE, 0..=0x3FF)
//! Byte 10-11: Right trigger  (u16 LE, 0..=0x3FF)
//! Byte 12:    Hat nibble     (0 = centre, 1 = up, clockwise to 8 = up-left)
//! Byte 13:    Bit 0 = A, Bit 1 = B, Bit 3 = X, Bit 4 = Y,
//!             Bit 6 = LB, Bit 7 = RB
//! Byte 14:    Bit 2 = Select, Bit 3 = Start, Bit 4 = Home,
//!             Bit 5 = LS, Bit 6 = RS
//! Byte 15:    Bit 0 = Share
//! ```

use super::hat::HatTable;
use super::{
    bit, check_max, expect_capacity, expect_exact_len, mask_if, read_u16_le, write_u16_le,
    ReportCodec,
};
use crate::error::Error;
use crate::gamepad::GamepadState;

/// Notification size in bytes.
pub const XBOX_FRAME_LEN: usize = 16;

pub const STICK_MAX: u16 = 0xFFFF;
pub const STICK_CENTER: u16 = 0x8000;
/// Triggers are 10-bit.
pub const TRIGGER_MAX: u16 = 0x03FF;

const IDX_LEFT_X: usize = 0;
const IDX_LEFT_Y: usize = 2;
const IDX_RIGHT_X: usize = 4;
const IDX_RIGHT_Y: usize = 6;
const IDX_LT: usize = 8;
const IDX_RT: usize = 10;
const IDX_HAT: usize = 12;
const IDX_BUTTONS_MAIN: usize = 13;
const IDX_BUTTONS_CENTER: usize = 14;
const IDX_BUTTONS_SHARE: usize = 15;

const MAIN_A: u8 = 0b0000_0001;
const MAIN_B: u8 = 0b0000_0010;
const MAIN_X: u8 = 0b0000_1000;
const MAIN_Y: u8 = 0b0001_0000;
const MAIN_LB: u8 = 0b0100_0000;
const MAIN_RB: u8 = 0b1000_0000;

const CENTER_SELECT: u8 = 0b0000_0100;
const CENTER_START: u8 = 0b0000_1000;
const CENTER_HOME: u8 = 0b0001_0000;
const CENTER_LS: u8 = 0b0010_0000;
const CENTER_RS: u8 = 0b0100_0000;

const SHARE_SHARE: u8 = 0b0000_0001;

static HAT: HatTable = HatTable {
    up: &[1..=2, 8..=8],
    right: &[2..=4],
    down: &[4..=6],
    left: &[6..=8],
    codes: [0, 1, 2, 3, 4, 5, 6, 7, 8],
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Xbox;

impl ReportCodec for Xbox {
    fn frame_len(&self) -> usize {
        XBOX_FRAME_LEN
    }

    fn decode(&self, data: &[u8], state: &mut GamepadState) -> Result<(), Error> {
        expect_exact_len(data, XBOX_FRAME_LEN)?;

        let lt = read_u16_le(data, IDX_LT);
        let rt = read_u16_le(data, IDX_RT);
        check_max(&[lt, rt], TRIGGER_MAX)?;

        let main = data[IDX_BUTTONS_MAIN];
        let center = data[IDX_BUTTONS_CENTER];
        let share = data[IDX_BUTTONS_SHARE];

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
            share: bit(share, SHARE_SHARE),
            left_x: read_u16_le(data, IDX_LEFT_X),
            left_y: read_u16_le(data, IDX_LEFT_Y),
            right_x: read_u16_le(data, IDX_RIGHT_X),
            right_y: read_u16_le(data, IDX_RIGHT_Y),
            lt,
            rt,
            ..GamepadState::default()
        };
        next.set_dpad(HAT.decode(data[IDX_HAT]));

        *state = next;
        Ok(())
    }

    fn encode(&self, state: &GamepadState, buf: &mut [u8]) -> Result<usize, Error> {
        expect_capacity(buf, XBOX_FRAME_LEN)?;
        check_max(&[state.lt, state.rt], TRIGGER_MAX)?;

        let mut frame = [0u8; XBOX_FRAME_LEN];
        write_u16_le(&mut frame, IDX_LEFT_X, state.left_x);
        write_u16_le(&mut frame, IDX_LEFT_Y, state.left_y);
        write_u16_le(&mut frame, IDX_RIGHT_X, state.right_x);
        write_u16_le(&mut frame, IDX_RIGHT_Y, state.right_y);
        write_u16_le(&mut frame, IDX_LT, state.lt);
        write_u16_le(&mut frame, IDX_RT, state.rt);
        frame[IDX_HAT] = HAT.encode(state.dpad());
        frame[IDX_BUTTONS_MAIN] = mask_if(state.a, MAIN_A)
            | mask_if(state.b, MAIN_B)
            | mask_if(state.x, MAIN_X)
            | mask_if(state.y, MAIN_Y)
            | mask_if(state.lb, MAIN_LB)
            | mask_if(state.rb, MAIN_RB);
        frame[IDX_BUTTONS_CENTER] = mask_if(state.select, CENTER_SELECT)
            | mask_if(state.start, CENTER_START)
            | mask_if(state.home, CENTER_HOME)
            | mask_if(state.ls, CENTER_LS)
            | mask_if(state.rs, CENTER_RS);
        frame[IDX_BUTTONS_SHARE] = mask_if(state.share, SHARE_SHARE);

        buf[..XBOX_FRAME_LEN].copy_from_slice(&frame);
        Ok(XBOX_FRAME_LEN)
    }

    fn neutral(&self) -> GamepadState {
        GamepadState::centered(STICK_CENTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamepad::DPad;

    #[test]
    fn decode_sticks_are_little_endian() {
        let mut data = [0u8; XBOX_FRAME_LEN];
        data[0..2].copy_from_slice(&[0x34, 0x12]);
        data[6..8].copy_from_slice(&[0xFF, 0xFF]);
        data[8..10].copy_from_slice(&[0xFF, 0x03]);

        let mut state = GamepadState::default();
        Xbox.decode(&data, &mut state).unwrap();
        assert_eq!(state.left_x, 0x1234);
        assert_eq!(state.right_y, 0xFFFF);
        assert_eq!(state.lt, TRIGGER_MAX);
        assert_eq!(state.dpad(), DPad::Neutral);
    }

    #[test]
    fn decode_rejects_trigger_wider_than_ten_bits() {
        let mut data = [0u8; XBOX_FRAME_LEN];
        data[10..12].copy_from_slice(&[0x00, 0x04]); // 0x400
        let mut state = GamepadState::centered(STICK_CENTER);
        assert_eq!(Xbox.decode(&data, &mut state), Err(Error::OutOfRange));
        assert_eq!(state, GamepadState::centered(STICK_CENTER));
    }

    #[test]
    fn decode_center_and_share_groups() {
        let mut data = [0u8; XBOX_FRAME_LEN];
        data[IDX_BUTTONS_CENTER] = CENTER_HOME | CENTER_RS;
        data[IDX_BUTTONS_SHARE] = SHARE_SHARE;
        let mut state = GamepadState::default();
        Xbox.decode(&data, &mut state).unwrap();
        assert!(state.home && state.rs && state.share);
        assert!(!state.start && !state.select && !state.ls);
    }

    #[test]
    fn hat_values_follow_clockwise_order() {
        let mut data = [0u8; XBOX_FRAME_LEN];
        let mut state = GamepadState::default();
        let expected = [
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
        for (value, dpad) in expected.iter().enumerate() {
            data[IDX_HAT] = value as u8;
            Xbox.decode(&data, &mut state).unwrap();
            assert_eq!(state.dpad(), *dpad, "hat value {}", value);
        }
    }

    #[test]
    fn encode_rejects_trigger_out_of_range() {
        let mut state = GamepadState::default();
        state.rt = TRIGGER_MAX + 1;
        let mut buf = [0xAAu8; XBOX_FRAME_LEN];
        assert_eq!(Xbox.encode(&state, &mut buf), Err(Error::OutOfRange));
        assert_eq!(buf, [0xAA; XBOX_FRAME_LEN]);
    }

    #[test]
    fn encode_neutral_hat_is_zero() {
        let mut buf = [0xFFu8; XBOX_FRAME_LEN];
        Xbox.encode(&GamepadState::default(), &mut buf).unwrap();
        assert_eq!(buf, [0u8; XBOX_FRAME_LEN]);
    }
}
