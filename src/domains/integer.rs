//! Arbitrary-precision signed integers with a machine-word fast path.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Rem, Sub, SubAssign};

use rand::Rng;
use rug::ops::{Pow, RemRounding};
use rug::{Complete, Integer as MultiPrecisionInteger};

use super::{EuclideanDomain, Ring};

/// The integer ring.
pub type Z = IntegerRing;
/// The integer ring.
pub const Z: IntegerRing = IntegerRing::new();

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct IntegerRing;

impl IntegerRing {
    pub const fn new() -> IntegerRing {
        IntegerRing
    }
}

impl Default for IntegerRing {
    fn default() -> Self {
        Self::new()
    }
}

/// A signed integer that stays on the machine word as long as it fits.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Integer {
    Natural(i64),
    Large(MultiPrecisionInteger),
}

impl From<i64> for Integer {
    #[inline]
    fn from(value: i64) -> Self {
        Integer::Natural(value)
    }
}

impl From<i32> for Integer {
    #[inline]
    fn from(value: i32) -> Self {
        Integer::Natural(value as i64)
    }
}

impl From<u32> for Integer {
    #[inline]
    fn from(value: u32) -> Self {
        Integer::Natural(value as i64)
    }
}

impl From<u64> for Integer {
    #[inline]
    fn from(value: u64) -> Self {
        if value <= i64::MAX as u64 {
            Integer::Natural(value as i64)
        } else {
            Integer::Large(value.into())
        }
    }
}

impl From<MultiPrecisionInteger> for Integer {
    /// Convert from a multi-precision integer, downgrading to the machine
    /// word when possible.
    #[inline]
    fn from(n: MultiPrecisionInteger) -> Self {
        if let Some(v) = n.to_i64() {
            Integer::Natural(v)
        } else {
            Integer::Large(n)
        }
    }
}

impl Display for Integer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Integer::Natural(n) => Display::fmt(n, f),
            Integer::Large(n) => Display::fmt(n, f),
        }
    }
}

impl std::fmt::Debug for Integer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl PartialEq<i64> for Integer {
    #[inline]
    fn eq(&self, other: &i64) -> bool {
        match self {
            Integer::Natural(n) => n == other,
            Integer::Large(_) => false,
        }
    }
}

impl PartialOrd for Integer {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Integer {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Integer::Natural(a), Integer::Natural(b)) => a.cmp(b),
            (Integer::Natural(a), Integer::Large(b)) => a.partial_cmp(b).unwrap(),
            (Integer::Large(a), Integer::Natural(b)) => a.partial_cmp(b).unwrap(),
            (Integer::Large(a), Integer::Large(b)) => a.cmp(b),
        }
    }
}

impl Integer {
    #[inline]
    pub fn zero() -> Integer {
        Integer::Natural(0)
    }

    #[inline]
    pub fn one() -> Integer {
        Integer::Natural(1)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        match self {
            Integer::Natural(n) => *n == 0,
            Integer::Large(_) => false,
        }
    }

    #[inline]
    pub fn is_one(&self) -> bool {
        match self {
            Integer::Natural(n) => *n == 1,
            Integer::Large(_) => false,
        }
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        match self {
            Integer::Natural(n) => *n < 0,
            Integer::Large(n) => n.cmp0() == Ordering::Less,
        }
    }

    #[inline]
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Integer::Natural(n) => Some(*n),
            Integer::Large(_) => None,
        }
    }

    pub fn to_multi_prec(&self) -> MultiPrecisionInteger {
        match self {
            Integer::Natural(n) => MultiPrecisionInteger::from(*n),
            Integer::Large(n) => n.clone(),
        }
    }

    pub fn abs(&self) -> Integer {
        match self {
            Integer::Natural(n) => match n.checked_abs() {
                Some(v) => Integer::Natural(v),
                None => Integer::Large(MultiPrecisionInteger::from(*n).abs()),
            },
            Integer::Large(n) => Integer::from(n.clone().abs()),
        }
    }

    /// Compare absolute values.
    pub fn abs_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Integer::Natural(a), Integer::Natural(b)) => {
                a.unsigned_abs().cmp(&b.unsigned_abs())
            }
            (Integer::Large(a), Integer::Large(b)) => a.as_abs().cmp(&b.as_abs()),
            (Integer::Natural(a), Integer::Large(b)) => b
                .as_abs()
                .partial_cmp(&a.unsigned_abs())
                .unwrap_or(Ordering::Equal)
                .reverse(),
            (Integer::Large(a), Integer::Natural(b)) => a
                .as_abs()
                .partial_cmp(&b.unsigned_abs())
                .unwrap_or(Ordering::Equal),
        }
    }

    /// The number of bits in the absolute value. Zero has bit length 0.
    pub fn bit_length(&self) -> u32 {
        match self {
            Integer::Natural(n) => 64 - n.unsigned_abs().leading_zeros(),
            Integer::Large(n) => n.significant_bits(),
        }
    }

    pub fn gcd(&self, other: &Integer) -> Integer {
        match (self, other) {
            (Integer::Natural(a), Integer::Natural(b)) => {
                // u64 arithmetic avoids the i64::MIN overflow
                let mut a = a.unsigned_abs();
                let mut b = b.unsigned_abs();
                while b != 0 {
                    let r = a % b;
                    a = b;
                    b = r;
                }
                Integer::from(a)
            }
            _ => Integer::from(self.to_multi_prec().gcd(&other.to_multi_prec())),
        }
    }

    pub fn pow(&self, e: u32) -> Integer {
        if e == 0 {
            return Integer::one();
        }
        match self {
            Integer::Natural(n) => match n.checked_pow(e) {
                Some(v) => Integer::Natural(v),
                None => Integer::from(MultiPrecisionInteger::from(*n).pow(e)),
            },
            Integer::Large(n) => Integer::from(n.pow(e).complete()),
        }
    }

    /// Euclidean quotient and remainder; the remainder is non-negative.
    pub fn quot_rem(&self, b: &Integer) -> (Integer, Integer) {
        debug_assert!(!b.is_zero());

        match (self, b) {
            (Integer::Natural(a), Integer::Natural(b)) => {
                if let (Some(q), Some(r)) = (a.checked_div_euclid(*b), a.checked_rem_euclid(*b)) {
                    (Integer::Natural(q), Integer::Natural(r))
                } else {
                    let (q, r) = MultiPrecisionInteger::from(*a)
                        .div_rem_euc(MultiPrecisionInteger::from(*b));
                    (Integer::from(q), Integer::from(r))
                }
            }
            _ => {
                let (q, r) = self.to_multi_prec().div_rem_euc(b.to_multi_prec());
                (Integer::from(q), Integer::from(r))
            }
        }
    }

    /// Ceiling of `self / b` for positive `b`.
    pub fn div_ceil(&self, b: &Integer) -> Integer {
        let (q, r) = self.quot_rem(b);
        if r.is_zero() {
            q
        } else {
            &q + &Integer::one()
        }
    }

    /// Shift left by `n` bits.
    pub fn shl(&self, n: u32) -> Integer {
        match self {
            Integer::Natural(v) => {
                if v.unsigned_abs().leading_zeros() > n + 1 {
                    Integer::Natural(v << n)
                } else {
                    Integer::from(MultiPrecisionInteger::from(*v) << n)
                }
            }
            Integer::Large(v) => Integer::from((v << n).complete()),
        }
    }

    /// The smallest `k` such that `base^k >= self`, for `self >= 1`.
    pub fn clog(&self, base: u32) -> usize {
        debug_assert!(base >= 2);
        let mut acc = Integer::one();
        let base = Integer::from(base);
        let mut k = 0;
        while &acc < self {
            acc = &acc * &base;
            k += 1;
        }
        k
    }

    /// The inverse of `self` modulo `m`, if it exists.
    pub fn invmod(&self, m: &Integer) -> Option<Integer> {
        self.to_multi_prec()
            .invert(&m.to_multi_prec())
            .ok()
            .map(Integer::from)
    }

    /// The least-absolute residue of `self` mod `m`, in `(-m/2, m/2]`.
    pub fn symmetric_mod(&self, m: &Integer) -> Integer {
        let c = self.quot_rem(m).1;
        if &(&c + &c) > m {
            &c - m
        } else {
            c
        }
    }

    /// Garner's algorithm for the Chinese remainder theorem: reconstruct
    /// the `x` with `x = n1 mod p1` and `x = n2 mod p2` in the symmetric
    /// range `(-p1*p2/2, p1*p2/2]`. The moduli must be coprime.
    pub fn chinese_remainder(n1: &Integer, n2: &Integer, p1: &Integer, p2: &Integer) -> Integer {
        let p1 = p1.to_multi_prec();
        let p2 = p2.to_multi_prec();
        let n1 = n1.to_multi_prec();
        let n2 = n2.to_multi_prec();

        let gamma1 = (p1.clone() % &p2)
            .invert(&p2)
            .unwrap_or_else(|_| panic!("Could not invert {} in {}", p1, p2));

        // mixed-radix digit for p2
        let v1 = ((n2 - &n1) * gamma1).rem_euc(&p2);

        let r = v1 * &p1 + n1;

        let m = p1 * p2;
        let r = r.rem_euc(&m);
        if r.clone() * 2u32 > m {
            Integer::from(r - m)
        } else {
            Integer::from(r)
        }
    }
}

macro_rules! binary_op {
    ($trait: ident, $f: ident, $checked: ident) => {
        impl $trait for &Integer {
            type Output = Integer;

            fn $f(self, other: &Integer) -> Integer {
                match (self, other) {
                    (Integer::Natural(a), Integer::Natural(b)) => match a.$checked(*b) {
                        Some(v) => Integer::Natural(v),
                        None => Integer::from(MultiPrecisionInteger::from(*a).$f(*b)),
                    },
                    _ => Integer::from(self.to_multi_prec().$f(other.to_multi_prec())),
                }
            }
        }

        impl $trait for Integer {
            type Output = Integer;

            #[inline]
            fn $f(self, other: Integer) -> Integer {
                (&self).$f(&other)
            }
        }
    };
}

binary_op!(Add, add, checked_add);
binary_op!(Sub, sub, checked_sub);
binary_op!(Mul, mul, checked_mul);

impl Neg for &Integer {
    type Output = Integer;

    fn neg(self) -> Integer {
        match self {
            Integer::Natural(n) => match n.checked_neg() {
                Some(v) => Integer::Natural(v),
                None => Integer::from(-MultiPrecisionInteger::from(*n)),
            },
            Integer::Large(n) => Integer::from((-n).complete()),
        }
    }
}

impl Neg for Integer {
    type Output = Integer;

    #[inline]
    fn neg(self) -> Integer {
        -&self
    }
}

impl Div for &Integer {
    type Output = Integer;

    #[inline]
    fn div(self, other: &Integer) -> Integer {
        self.quot_rem(other).0
    }
}

impl Rem for &Integer {
    type Output = Integer;

    #[inline]
    fn rem(self, other: &Integer) -> Integer {
        self.quot_rem(other).1
    }
}

impl Div for Integer {
    type Output = Integer;

    #[inline]
    fn div(self, other: Integer) -> Integer {
        (&self).div(&other)
    }
}

impl Rem for Integer {
    type Output = Integer;

    #[inline]
    fn rem(self, other: Integer) -> Integer {
        (&self).rem(&other)
    }
}

impl AddAssign<&Integer> for Integer {
    #[inline]
    fn add_assign(&mut self, other: &Integer) {
        *self = &*self + other;
    }
}

impl SubAssign<&Integer> for Integer {
    #[inline]
    fn sub_assign(&mut self, other: &Integer) {
        *self = &*self - other;
    }
}

impl MulAssign<&Integer> for Integer {
    #[inline]
    fn mul_assign(&mut self, other: &Integer) {
        *self = &*self * other;
    }
}

impl Display for IntegerRing {
    fn fmt(&self, _: &mut Formatter<'_>) -> std::fmt::Result {
        Ok(())
    }
}

impl Ring for IntegerRing {
    type Element = Integer;

    #[inline]
    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        a + b
    }

    #[inline]
    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        a - b
    }

    #[inline]
    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        a * b
    }

    #[inline]
    fn add_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a += b;
    }

    #[inline]
    fn sub_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a -= b;
    }

    #[inline]
    fn mul_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a *= b;
    }

    #[inline]
    fn add_mul_assign(&self, a: &mut Self::Element, b: &Self::Element, c: &Self::Element) {
        *a += &(b * c);
    }

    #[inline]
    fn neg(&self, a: &Self::Element) -> Self::Element {
        -a
    }

    #[inline]
    fn zero(&self) -> Self::Element {
        Integer::zero()
    }

    #[inline]
    fn one(&self) -> Self::Element {
        Integer::one()
    }

    #[inline]
    fn pow(&self, b: &Self::Element, e: u64) -> Self::Element {
        debug_assert!(e <= u32::MAX as u64);
        b.pow(e as u32)
    }

    #[inline]
    fn is_zero(a: &Self::Element) -> bool {
        a.is_zero()
    }

    #[inline]
    fn is_one(&self, a: &Self::Element) -> bool {
        a.is_one()
    }

    fn sample(&self, rng: &mut impl rand::RngCore, range: (i64, i64)) -> Self::Element {
        Integer::Natural(rng.gen_range(range.0..range.1))
    }
}

impl EuclideanDomain for IntegerRing {
    #[inline]
    fn rem(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        a % b
    }

    #[inline]
    fn quot_rem(&self, a: &Self::Element, b: &Self::Element) -> (Self::Element, Self::Element) {
        a.quot_rem(b)
    }

    #[inline]
    fn gcd(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        a.gcd(b)
    }
}

#[cfg(test)]
mod test {
    use super::Integer;

    #[test]
    fn fast_path_overflow() {
        let a = Integer::from(i64::MAX);
        let b = &a + &a;
        assert_eq!(b, Integer::Large(rug::Integer::from(i64::MAX) * 2u32));

        let c = &b - &a;
        assert_eq!(c, a);

        assert_eq!(
            -&Integer::from(i64::MIN),
            &Integer::from(i64::MAX) + &Integer::from(1)
        );
    }

    #[test]
    fn euclidean() {
        let (q, r) = Integer::from(-7).quot_rem(&Integer::from(3));
        assert_eq!(q, Integer::from(-3));
        assert_eq!(r, Integer::from(2));

        assert_eq!(Integer::from(-12).gcd(&Integer::from(18)), 6);
        assert_eq!(Integer::from(17).div_ceil(&Integer::from(5)), 4);
    }

    #[test]
    fn symmetric_mod() {
        assert_eq!(Integer::from(8).symmetric_mod(&Integer::from(15)), -7);
        assert_eq!(Integer::from(7).symmetric_mod(&Integer::from(15)), 7);
        // the upper boundary m/2 is included
        assert_eq!(Integer::from(5).symmetric_mod(&Integer::from(10)), 5);
        assert_eq!(Integer::from(-3).symmetric_mod(&Integer::from(7)), -3);
    }

    #[test]
    fn chinese_remainder() {
        let r = Integer::chinese_remainder(
            &Integer::from(2),
            &Integer::from(3),
            &Integer::from(3),
            &Integer::from(5),
        );
        assert_eq!(r, -7);

        let r = Integer::chinese_remainder(
            &Integer::from(-1),
            &Integer::from(4),
            &Integer::from(7),
            &Integer::from(11),
        );
        // r = 48 mod 77, symmetric: -29
        assert_eq!(r, -29);
    }

    #[test]
    fn bits_and_log() {
        assert_eq!(Integer::from(0).bit_length(), 0);
        assert_eq!(Integer::from(1).bit_length(), 1);
        assert_eq!(Integer::from(255).bit_length(), 8);
        assert_eq!(Integer::from(100).clog(10), 2);
        assert_eq!(Integer::from(101).clog(10), 3);
        assert_eq!(Integer::from(1).clog(7), 0);
    }

    #[test]
    fn invmod() {
        let i = Integer::from(3).invmod(&Integer::from(7)).unwrap();
        assert_eq!(i, 5);
        assert!(Integer::from(6).invmod(&Integer::from(10)).is_none());
    }
}
