//! Rumble / feedback output report.
//!
//! Layout (8 bytes), written to the HID service's writable characteristic:
//! ```text
//! Byte 0: Motor select   Bit 0 = centre, Bit 1 = shake,
//!                        Bit 2 = right,  Bit 3 = left
//! Byte 1: Centre power   (0..=100 %)
//! Byte 2: Shake power    (0..=100 %)
//! Byte 3: Right power    (0..=100 %)
//! Byte 4: Left power     (0..=100 %)
//! Byte 5: Time active    (10 ms units)
//! Byte 6: Time silent    (10 ms units)
//! Byte 7: Repeat count
//! ```

use crate::error::Error;

use super::MIN_FRAME_LEN;

/// Output report size in bytes.
pub const OUTPUT_REPORT_LEN: usize = MIN_FRAME_LEN;

/// Highest accepted motor power.
pub const POWER_MAX: u8 = 100;

const SELECT_CENTER: u8 = 0b0000_0001;
const SELECT_SHAKE: u8 = 0b0000_0010;
const SELECT_RIGHT: u8 = 0b0000_0100;
const SELECT_LEFT: u8 = 0b0000_1000;

/// Per-motor values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Motors<T> {
    pub center: T,
    pub shake: T,
    pub right: T,
    pub left: T,
}

impl<T: Copy> Motors<T> {
    pub const fn all(value: T) -> Self {
        Self {
            center: value,
            shake: value,
            right: value,
            left: value,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RumbleReport {
    pub select: Motors<bool>,
    pub power: Motors<u8>,
    pub time_active: u8,
    pub time_silent: u8,
    pub repeat: u8,
}

impl RumbleReport {
    /// Every motor stopped.
    pub const fn all_off() -> Self {
        Self {
            select: Motors::all(false),
            power: Motors::all(0),
            time_active: 0,
            time_silent: 0,
            repeat: 0,
        }
    }

    /// Every motor at full power for one second, once.
    pub const fn full_power_for_1sec() -> Self {
        Self {
            select: Motors::all(true),
            power: Motors::all(POWER_MAX),
            time_active: 100,
            time_silent: 0,
            repeat: 0,
        }
    }

    /// Serialise into `buf`; returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.len() < OUTPUT_REPORT_LEN {
            return Err(Error::ContractViolation);
        }
        let powers = [
            self.power.center,
            self.power.shake,
            self.power.right,
            self.power.left,
        ];
        if powers.iter().any(|&p| p > POWER_MAX) {
            return Err(Error::OutOfRange);
        }

        let mut select = 0u8;
        if self.select.center {
            select |= SELECT_CENTER;
        }
        if self.select.shake {
            select |= SELECT_SHAKE;
        }
        if self.select.right {
            select |= SELECT_RIGHT;
        }
        if self.select.left {
            select |= SELECT_LEFT;
        }

        buf[0] = select;
        buf[1..5].copy_from_slice(&powers);
        buf[5] = self.time_active;
        buf[6] = self.time_silent;
        buf[7] = self.repeat;
        Ok(OUTPUT_REPORT_LEN)
    }

    pub fn to_frame(&self) -> Result<[u8; OUTPUT_REPORT_LEN], Error> {
        let mut frame = [0u8; OUTPUT_REPORT_LEN];
        self.encode(&mut frame)?;
        Ok(frame)
    }
}
