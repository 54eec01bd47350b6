use core::ops::{BitAnd, BitOr, Not};

use num::Num;

/// Align value downwards.
///
/// Returns the greatest x with alignment `align` so that x <= addr. The alignment must be
///  a power of 2.
#[inline]
pub fn align_down<T: Num + Copy + BitAnd<Output = T> + Not<Output = T>>(value: T, align: T) -> T {
    value & !(align - T::one())
}

/// Align value upwards.
///
/// Returns the smallest x with alignment `align` so that x >= addr. The alignment must be
/// a power of 2.
#[inline]
pub fn align_up<T: Num + Copy + BitAnd<Output = T> + BitOr<Output = T>>(value: T, align: T) -> T {
    let align_mask = align - T::one();
    if value & align_mask == T::zero() {
        value // already aligned
    } else {
        (value | align_mask) + T::one()
    }
}

/// Check whether `value` is a multiple of `align`. The alignment must be a power of 2.
#[inline]
pub fn is_aligned<T: Num + Copy + BitAnd<Output = T>>(value: T, align: T) -> bool {
    value & (align - T::one()) == T::zero()
}
