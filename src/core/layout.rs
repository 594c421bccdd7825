//! Bit placement of signals inside a frame.
//!
//! Bits are addressed as `byte * 8 + bit`, with bit 0 the least significant
//! bit of a byte.
//!
//! - Little-endian: the start bit holds the LSB of the value and the field
//!   advances upwards: `[start, start + width - 1]`.
//! - Big-endian (DBC sawtooth): the start bit holds the MSB; inside a byte the
//!   field advances towards bit 0, then continues at bit 7 of the next byte.

use crate::types::signal::ByteOrder;

/// Frame positions of a field, most significant value bit first.
///
/// Positions may lie beyond the frame; callers compare them with the frame size.
pub fn bit_positions(start_bit: u16, width: u16, byte_order: ByteOrder) -> Vec<u32> {
    let width = width as u32;
    let start = start_bit as u32;
    match byte_order {
        ByteOrder::LittleEndian => (0..width).rev().map(|i| start + i).collect(),
        ByteOrder::BigEndian => {
            let mut out = Vec::with_capacity(width as usize);
            let mut byte = start / 8;
            let mut bit = start % 8;
            for _ in 0..width {
                out.push(byte * 8 + bit);
                if bit == 0 {
                    byte += 1;
                    bit = 7;
                } else {
                    bit -= 1;
                }
            }
            out
        }
    }
}

/// First position of `positions` outside a frame of `byte_length` bytes.
pub fn first_out_of_frame(positions: &[u32], byte_length: u16) -> Option<u32> {
    let total = byte_length as u32 * 8;
    positions.iter().copied().find(|&p| p >= total)
}

/// Occupancy mask over a frame of up to 64 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitMask {
    words: [u64; 8],
}

impl BitMask {
    /// Mask of the in-frame positions; positions past 512 bits are ignored.
    pub fn from_positions(positions: &[u32]) -> Self {
        let mut mask = BitMask::default();
        for &p in positions {
            if let Some(word) = mask.words.get_mut((p / 64) as usize) {
                *word |= 1u64 << (p % 64);
            }
        }
        mask
    }

    pub fn intersects(&self, other: &BitMask) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_positions() {
        assert_eq!(bit_positions(4, 8, ByteOrder::LittleEndian), vec![11, 10, 9, 8, 7, 6, 5, 4]);
    }

    #[test]
    fn test_big_endian_sawtooth() {
        // 8-bit field starting at bit 3: low nibble of byte 0 then high nibble of byte 1.
        assert_eq!(
            bit_positions(3, 8, ByteOrder::BigEndian),
            vec![3, 2, 1, 0, 15, 14, 13, 12]
        );
        // 16-bit Motorola at start 7 covers bytes 0 and 1 entirely.
        let p = bit_positions(7, 16, ByteOrder::BigEndian);
        assert_eq!(p.first(), Some(&7));
        assert_eq!(p.last(), Some(&8));
        assert_eq!(first_out_of_frame(&p, 2), None);
        assert_eq!(first_out_of_frame(&p, 1), Some(15));
    }

    #[test]
    fn test_out_of_frame() {
        let p = bit_positions(60, 8, ByteOrder::LittleEndian);
        assert_eq!(first_out_of_frame(&p, 8), Some(67));
    }

    #[test]
    fn test_mask_overlap() {
        let a = BitMask::from_positions(&bit_positions(0, 8, ByteOrder::LittleEndian));
        let b = BitMask::from_positions(&bit_positions(4, 8, ByteOrder::LittleEndian));
        let c = BitMask::from_positions(&bit_positions(8, 8, ByteOrder::LittleEndian));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.count(), 8);
    }
}
