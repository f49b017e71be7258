//! The word-sized prime fields used for modular images, with Montgomery
//! arithmetic, and the ascending word-prime sequence feeding them.

use std::fmt::{Display, Error, Formatter};

use super::integer::Integer;
use super::{EuclideanDomain, Field, Ring};

/// The first prime candidate handed out by [next_prime]: `2^30`, leaving
/// two guard bits in the image word.
pub const PRIME_FLOOR: u32 = 1 << 30;

/// The largest 32-bit prime; the prime sequence is exhausted past it.
pub const MAX_WORD_PRIME: u32 = 4294967291;

/// A number in a prime field, stored in Montgomery form.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct FiniteFieldElement(pub(crate) u32);

impl Display for FiniteFieldElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        Display::fmt(&self.0, f)
    }
}

/// A 32-bit prime field with Montgomery multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Zp {
    p: u32,
    m: u32,
    one: FiniteFieldElement,
}

impl Zp {
    /// Create a new prime field from an odd prime `p`.
    pub fn new(p: u32) -> Zp {
        debug_assert!(p % 2 == 1);

        Zp {
            p,
            m: Self::neg_inv_pow32(p),
            one: FiniteFieldElement(((1u64 << 32) % p as u64) as u32),
        }
    }

    #[inline]
    pub fn get_prime(&self) -> u32 {
        self.p
    }

    /// `-p^-1 mod 2^32` by Newton lifting; `p` itself is an inverse of
    /// `p` mod 8, and each step doubles the valid bits.
    fn neg_inv_pow32(p: u32) -> u32 {
        let mut inv = p;
        for _ in 0..4 {
            inv = inv.wrapping_mul(2u32.wrapping_sub(p.wrapping_mul(inv)));
        }
        inv.wrapping_neg()
    }

    /// Montgomery reduction: `t * 2^-32 mod p` for `t < p * 2^32`.
    #[inline(always)]
    fn redc(&self, t: u64) -> u32 {
        let q = (t as u32).wrapping_mul(self.m);
        let (sum, carry) = t.overflowing_add(q as u64 * self.p as u64);
        let r = (sum >> 32) as u32;

        if carry {
            r.wrapping_sub(self.p)
        } else if r >= self.p {
            r - self.p
        } else {
            r
        }
    }

    /// Convert a representative in `[0, p)` to Montgomery form.
    #[inline(always)]
    pub fn to_element(&self, a: u32) -> FiniteFieldElement {
        FiniteFieldElement((((a as u64) << 32) % self.p as u64) as u32)
    }

    /// Convert an element back to standard form in `[0, p)`.
    #[inline(always)]
    pub fn from_element(&self, a: &FiniteFieldElement) -> u32 {
        self.redc(a.0 as u64)
    }

    /// Lift an element to the symmetric range `(-p/2, p/2]`.
    pub fn to_symmetric_integer(&self, a: &FiniteFieldElement) -> Integer {
        let r = self.from_element(a) as i64;
        let p = self.p as i64;

        if r * 2 > p {
            Integer::from(r - p)
        } else {
            Integer::from(r)
        }
    }
}

impl Display for Zp {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "Z_{}", self.p)
    }
}

impl Ring for Zp {
    type Element = FiniteFieldElement;

    #[inline(always)]
    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        let (r, wrapped) = a.0.overflowing_add(b.0);

        FiniteFieldElement(if wrapped || r >= self.p {
            r.wrapping_sub(self.p)
        } else {
            r
        })
    }

    #[inline(always)]
    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        let (r, borrowed) = a.0.overflowing_sub(b.0);

        FiniteFieldElement(if borrowed { r.wrapping_add(self.p) } else { r })
    }

    #[inline(always)]
    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        FiniteFieldElement(self.redc(a.0 as u64 * b.0 as u64))
    }

    #[inline(always)]
    fn add_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.add(a, b);
    }

    #[inline(always)]
    fn sub_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.sub(a, b);
    }

    #[inline(always)]
    fn mul_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.mul(a, b);
    }

    #[inline(always)]
    fn add_mul_assign(&self, a: &mut Self::Element, b: &Self::Element, c: &Self::Element) {
        self.add_assign(a, &self.mul(b, c));
    }

    #[inline]
    fn neg(&self, a: &Self::Element) -> Self::Element {
        if a.0 == 0 {
            *a
        } else {
            FiniteFieldElement(self.p - a.0)
        }
    }

    #[inline]
    fn zero(&self) -> Self::Element {
        FiniteFieldElement(0)
    }

    #[inline]
    fn one(&self) -> Self::Element {
        self.one
    }

    #[inline]
    fn pow(&self, b: &Self::Element, mut e: u64) -> Self::Element {
        if e == 0 {
            return self.one();
        }

        let mut x = *b;
        let mut y = self.one();
        while e != 1 {
            if e % 2 == 1 {
                y = self.mul(&y, &x);
            }

            x = self.mul(&x, &x);
            e /= 2;
        }

        self.mul(&x, &y)
    }

    #[inline]
    fn is_zero(a: &Self::Element) -> bool {
        a.0 == 0
    }

    #[inline]
    fn is_one(&self, a: &Self::Element) -> bool {
        a == &self.one
    }

    fn sample(&self, rng: &mut impl rand::RngCore, range: (i64, i64)) -> Self::Element {
        use rand::Rng;
        let r = rng.gen_range(range.0.max(0)..range.1.min(self.p as i64));
        self.to_element(r as u32)
    }
}

impl EuclideanDomain for Zp {
    #[inline]
    fn rem(&self, _: &Self::Element, _: &Self::Element) -> Self::Element {
        FiniteFieldElement(0)
    }

    #[inline]
    fn quot_rem(&self, a: &Self::Element, b: &Self::Element) -> (Self::Element, Self::Element) {
        (self.mul(a, &self.inv(b)), FiniteFieldElement(0))
    }

    #[inline]
    fn gcd(&self, _: &Self::Element, _: &Self::Element) -> Self::Element {
        self.one()
    }
}

impl Field for Zp {
    #[inline]
    fn div(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        self.mul(a, &self.inv(b))
    }

    #[inline]
    fn div_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.div(a, b);
    }

    /// Computes x^-1 mod p.
    fn inv(&self, a: &Self::Element) -> Self::Element {
        debug_assert!(a.0 != 0, "0 is not invertible");

        // the extended Euclidean algorithm on the standard representative;
        // the Bezout coefficient of x is its inverse
        let x = self.from_element(a) as i64;
        let p = self.p as i64;

        let (mut r0, mut r1) = (p, x);
        let (mut s0, mut s1) = (0i64, 1i64);
        while r1 != 0 {
            let q = r0 / r1;
            (r0, r1) = (r1, r0 - q * r1);
            (s0, s1) = (s1, s0 - q * s1);
        }
        debug_assert!(r0 == 1);

        self.to_element(s0.rem_euclid(p) as u32)
    }
}

/// Reduction into a prime field.
pub trait ToFiniteField {
    fn to_finite_field(&self, field: &Zp) -> FiniteFieldElement;
}

impl ToFiniteField for Integer {
    fn to_finite_field(&self, field: &Zp) -> FiniteFieldElement {
        match self {
            Integer::Natural(n) => {
                field.to_element(n.rem_euclid(field.get_prime() as i64) as u32)
            }
            Integer::Large(r) => field.to_element(r.mod_u(field.get_prime())),
        }
    }
}

/// Deterministic Miller-Rabin for 32-bit candidates. The witness set
/// {2, 7, 61} is exact for all n < 4_759_123_141.
pub fn is_prime(n: u32) -> bool {
    if n < 2 || n % 2 == 0 {
        return n == 2;
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for &a in &[2u64, 7, 61] {
        let a = a % n as u64;
        if a == 0 {
            continue;
        }

        let mut x = 1u64;
        let mut b = a;
        let mut e = d;
        while e > 0 {
            if e % 2 == 1 {
                x = x * b % n as u64;
            }
            b = b * b % n as u64;
            e /= 2;
        }

        if x == 1 || x == (n - 1) as u64 {
            continue;
        }

        for _ in 0..s - 1 {
            x = x * x % n as u64;
            if x == (n - 1) as u64 {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

/// The smallest prime strictly greater than `p`, or `None` when the
/// word-sized sequence is exhausted.
pub fn next_prime(p: u32) -> Option<u32> {
    if p >= MAX_WORD_PRIME {
        return None;
    }

    let mut candidate = if p % 2 == 0 { p + 1 } else { p + 2 };
    while !is_prime(candidate) {
        candidate += 2;
    }
    Some(candidate)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn montgomery_roundtrip() {
        let field = Zp::new(4293491017);
        for x in [0u32, 1, 2, 12345, 4293491016] {
            assert_eq!(field.from_element(&field.to_element(x)), x);
        }
    }

    #[test]
    fn field_ops() {
        let field = Zp::new(101);
        let a = field.to_element(40);
        let b = field.to_element(92);

        assert_eq!(field.from_element(&field.add(&a, &b)), (40 + 92) % 101);
        assert_eq!(field.from_element(&field.mul(&a, &b)), 40 * 92 % 101);
        assert_eq!(field.from_element(&field.sub(&a, &b)), (40 + 101 - 92) % 101);

        let inv = field.inv(&a);
        assert!(field.is_one(&field.mul(&a, &inv)));

        assert_eq!(field.from_element(&field.pow(&a, 100)), 1);
    }

    #[test]
    fn symmetric_lift() {
        let field = Zp::new(17);
        assert_eq!(field.to_symmetric_integer(&field.to_element(8)), 8);
        assert_eq!(field.to_symmetric_integer(&field.to_element(9)), -8);
    }

    #[test]
    fn primes() {
        assert!(is_prime(2));
        assert!(is_prime(61));
        assert!(is_prime(MAX_WORD_PRIME));
        assert!(!is_prime(1));
        assert!(!is_prime(4293491015));

        assert_eq!(next_prime(PRIME_FLOOR), Some(1073741827));
        assert_eq!(next_prime(MAX_WORD_PRIME), None);

        let mut p = PRIME_FLOOR;
        for _ in 0..100 {
            p = next_prime(p).unwrap();
            assert!(is_prime(p));
        }
    }
}
