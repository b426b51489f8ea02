use std::fmt::Debug;
use std::mem::size_of;

/// Helper methods to manipulate bits and bytes of register-sized values,
/// the indices (`bit_idx`, `byte_nth`) are counted from lsb to msb (right to left).
pub trait Bits
where
    Self: Copy + Into<u64> + TryFrom<u64>,
    <Self as TryFrom<u64>>::Error: Debug,
{
    fn is_bit_on(self, bit_idx: u8) -> bool {
        debug_assert!(bit_idx < (size_of::<Self>() * 8) as u8);
        (self.into() >> bit_idx) & 1 != 0
    }

    fn get_byte(self, byte_nth: u8) -> u8 {
        debug_assert!((byte_nth as usize) < size_of::<Self>());
        ((self.into() >> (byte_nth * 8)) & 0xFF) as u8
    }

    fn set_byte(&mut self, byte_nth: u8, value: u8) {
        debug_assert!((byte_nth as usize) < size_of::<Self>());
        let mask: u64 = !(0xFF << (byte_nth * 8));
        let raw = ((*self).into() & mask) | (u64::from(value) << (byte_nth * 8));
        *self = Self::try_from(raw).unwrap();
    }
}

impl Bits for u8 {}
impl Bits for u32 {}
impl Bits for u64 {}
