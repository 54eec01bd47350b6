use core::{
    fmt,
    ops::{Add, AddAssign, Sub},
};

use pagemap_utils::align;

macro_rules! addr_common {
    ( $t:ident ) => {
        impl Add<u64> for $t {
            type Output = Self;

            fn add(self, rhs: u64) -> Self {
                $t(self.0 + rhs)
            }
        }

        impl AddAssign<u64> for $t {
            fn add_assign(&mut self, rhs: u64) {
                self.0 += rhs;
            }
        }

        impl Sub<$t> for $t {
            type Output = u64;

            fn sub(self, rhs: $t) -> u64 {
                self.0 - rhs.0
            }
        }

        impl fmt::Binary for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Binary::fmt(&self.0, f)
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::LowerHex for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }

        impl fmt::UpperHex for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::UpperHex::fmt(&self.0, f)
            }
        }

        impl From<u64> for $t {
            fn from(v: u64) -> Self {
                $t(v)
            }
        }

        impl From<$t> for u64 {
            fn from(v: $t) -> u64 {
                v.0
            }
        }

        impl $t {
            pub const fn new(v: u64) -> $t {
                $t(v)
            }

            #[inline]
            pub const fn as_u64(self) -> u64 {
                self.0
            }

            /// Whether the address is a multiple of `alignment` (a power of two).
            #[inline]
            pub fn is_aligned(self, alignment: u64) -> bool {
                align::is_aligned(self.0, alignment)
            }

            #[inline]
            pub fn align_down(self, alignment: u64) -> $t {
                $t(align::align_down(self.0, alignment))
            }
        }
    };
}

/// Represent a physical memory address.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PAddr(u64);

addr_common!(PAddr);

/// Represent a linear (virtual) address in some address space.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VAddr(u64);

addr_common!(VAddr);
