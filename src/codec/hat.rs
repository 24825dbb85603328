//! Hat switch (d-pad) nibble tables.
//!
//! Decoding runs one inclusive range test per direction, in the order
//! up, right, down, left.  Ranges may overlap: a value inside both the
//! up and the right range is a diagonal.  [`DPad::from_flags`] settles
//! the rare contradicting pair (up wins over down, right over left).
//!
//! Encoding is a plain lookup indexed by [`DPad`] discriminant.

use core::ops::RangeInclusive;

use crate::gamepad::DPad;

/// Only the low nibble of the hat byte carries the direction.
pub const HAT_NIBBLE_MASK: u8 = 0x0F;

pub struct HatTable {
    pub up: &'static [RangeInclusive<u8>],
    pub right: &'static [RangeInclusive<u8>],
    pub down: &'static [RangeInclusive<u8>],
    pub left: &'static [RangeInclusive<u8>],
    /// Wire value per position, in [`DPad::ALL`] order.
    pub codes: [u8; 9],
}

impl HatTable {
    pub fn decode(&self, raw: u8) -> DPad {
        let nibble = raw & HAT_NIBBLE_MASK;
        let hit = |ranges: &[RangeInclusive<u8>]| ranges.iter().any(|r| r.contains(&nibble));
        DPad::from_flags(
            hit(self.up),
            hit(self.right),
            hit(self.down),
            hit(self.left),
        )
    }

    pub fn encode(&self, dpad: DPad) -> u8 {
        self.codes[dpad as usize]
    }

    pub fn neutral(&self) -> u8 {
        self.encode(DPad::Neutral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TABLE: HatTable = HatTable {
        up: &[0..=1, 7..=7],
        right: &[1..=3],
        down: &[3..=5],
        left: &[5..=7],
        codes: [0xF, 0, 1, 2, 3, 4, 5, 6, 7],
    };

    #[test]
    fn overlapping_ranges_produce_diagonals() {
        assert_eq!(TABLE.decode(1), DPad::UpRight);
        assert_eq!(TABLE.decode(3), DPad::DownRight);
        assert_eq!(TABLE.decode(5), DPad::DownLeft);
        assert_eq!(TABLE.decode(7), DPad::UpLeft);
    }

    #[test]
    fn high_nibble_is_ignored() {
        assert_eq!(TABLE.decode(0xF2), DPad::Right);
        assert_eq!(TABLE.decode(0x0F), DPad::Neutral);
    }

    #[test]
    fn encode_then_decode_is_identity() {
        for dpad in DPad::ALL {
            assert_eq!(TABLE.decode(TABLE.encode(dpad)), dpad);
        }
        assert_eq!(TABLE.neutral(), 0xF);
    }
}
