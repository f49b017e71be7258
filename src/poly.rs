pub mod crt;
pub mod gcd;
pub mod mainvar;
pub mod polynomial;

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::ops::{Add as OpAdd, AddAssign, Sub};

/// The number of exponents that can be stored without heap allocation.
pub const INLINED_EXPONENTS: usize = 6;

/// An exponent of a polynomial variable.
pub trait Exponent:
    Hash
    + Debug
    + Display
    + Ord
    + Sub<Output = Self>
    + OpAdd<Output = Self>
    + AddAssign
    + Clone
    + Copy
    + PartialEq
    + Eq
    + Send
    + Sync
    + 'static
{
    fn zero() -> Self;
    fn one() -> Self;
    /// Convert the exponent to `u32`. This is always possible, as `u32` is
    /// the largest supported exponent type.
    fn to_u32(&self) -> u32;
    /// Convert from `u32`. This function may panic if the exponent is too large.
    fn from_u32(n: u32) -> Self;
    /// The largest representable exponent, as `u32`.
    fn max_value() -> u32;
    fn is_zero(&self) -> bool;
    fn checked_add(&self, other: &Self) -> Option<Self>;
}

macro_rules! exponent_impl {
    ($t: ty) => {
        impl Exponent for $t {
            #[inline]
            fn zero() -> Self {
                0
            }

            #[inline]
            fn one() -> Self {
                1
            }

            #[inline]
            fn to_u32(&self) -> u32 {
                *self as u32
            }

            #[inline]
            fn from_u32(n: u32) -> Self {
                if n <= <$t>::MAX as u32 {
                    n as $t
                } else {
                    panic!("Exponent {} too large for {}", n, stringify!($t));
                }
            }

            #[inline]
            fn max_value() -> u32 {
                <$t>::MAX as u32
            }

            #[inline]
            fn is_zero(&self) -> bool {
                *self == 0
            }

            #[inline]
            fn checked_add(&self, other: &Self) -> Option<Self> {
                <$t>::checked_add(*self, *other)
            }
        }
    };
}

exponent_impl!(u8);
exponent_impl!(u16);
exponent_impl!(u32);
