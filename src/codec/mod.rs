//! Controller report codecs.
//!
//! Each controller family ships its own fixed-length notification layout.
//! A codec turns that layout into the canonical [`GamepadState`] and back.
//!
//! - [`xbox::Xbox`]: 16-byte frame, 16-bit sticks, 10-bit triggers
//! - [`newgame::Newgame`]: 9-byte frame, 8-bit sticks and triggers
//!
//! [`CodecFamily`] dispatches between the built-in families; other
//! families plug in by implementing [`ReportCodec`].

pub mod hat;
pub mod newgame;
pub mod output;
pub mod xbox;


use crate::error::Error;
use crate::gamepad::{Button, GamepadState};

/// Shortest frame any family declares.
pub const MIN_FRAME_LEN: usize = 8;

/// Encode/decode contract for one controller family.
pub trait ReportCodec {
    /// Exact notification length, and the minimum encode capacity.
    fn frame_len(&self) -> usize;

    /// Overwrite every field of `state` from one notification.
    ///
    /// `state` is left untouched when this returns an error.
    fn decode(&self, data: &[u8], state: &mut GamepadState) -> Result<(), Error>;

    /// Write `state` in the family layout; returns the bytes written.
    ///
    /// `buf` is left untouched when this returns an error.
    fn encode(&self, state: &GamepadState, buf: &mut [u8]) -> Result<usize, Error>;

    /// Whether the family layout carries `button` at all.
    fn supports(&self, _button: Button) -> bool {
        true
    }

    /// Resting state before the first notification arrives.
    fn neutral(&self) -> GamepadState {
        GamepadState::default()
    }
}

/// Built-in controller families.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecFamily {
    #[default]
    Xbox,
    Newgame,
}

impl ReportCodec for CodecFamily {
    fn frame_len(&self) -> usize {
        match self {
            CodecFamily::Xbox => xbox::Xbox.frame_len(),
            CodecFamily::Newgame => newgame::Newgame.frame_len(),
        }
    }

    fn decode(&self, data: &[u8], state: &mut GamepadState) -> Result<(), Error> {
        match self {
            CodecFamily::Xbox => xbox::Xbox.decode(data, state),
            CodecFamily::Newgame => newgame::Newgame.decode(data, state),
        }
    }

    fn encode(&self, state: &GamepadState, buf: &mut [u8]) -> Result<usize, Error> {
        match self {
            CodecFamily::Xbox => xbox::Xbox.encode(state, buf),
            CodecFamily::Newgame => newgame::Newgame.encode(state, buf),
        }
    }

    fn supports(&self, button: Button) -> bool {
        match self {
            CodecFamily::Xbox => xbox::Xbox.supports(button),
            CodecFamily::Newgame => newgame::Newgame.supports(button),
        }
    }

    fn neutral(&self) -> GamepadState {
        match self {
            CodecFamily::Xbox => xbox::Xbox.neutral(),
            CodecFamily::Newgame => newgame::Newgame.neutral(),
        }
    }
}

// Byte-offset helpers shared by the family layouts

fn expect_exact_len(data: &[u8], expected: usize) -> Result<(), Error> {
    if data.len() != expected {
        return Err(Error::InvalidLength {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn expect_capacity(buf: &[u8], expected: usize) -> Result<(), Error> {
    if buf.len() < expected {
        return Err(Error::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

#[inline]
fn bit(byte: u8, mask: u8) -> bool {
    byte & mask != 0
}

#[inline]
fn mask_if(on: bool, mask: u8) -> u8 {
    if on {
        mask
    } else {
        0
    }
}

#[inline]
fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from(data[offset]) | (u16::from(data[offset + 1]) << 8)
}

#[inline]
fn write_u16_le(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset] = (value & 0xFF) as u8;
    buf[offset + 1] = (value >> 8) as u8;
}

fn check_max(values: &[u16], max: u16) -> Result<(), Error> {
    if values.iter().any(|&v| v > max) {
        return Err(Error::OutOfRange);
    }
    Ok(())
}
