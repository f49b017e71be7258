//! Polynomials in a distinguished main variable `X` with multivariate
//! coefficients, the working representation of the modular GCD engine.

use std::fmt::Display;

use smallvec::SmallVec;

use crate::domains::integer::{Integer, IntegerRing};
use crate::domains::{EuclideanDomain, Ring};

use super::polynomial::MultivariatePolynomial;
use super::{Exponent, INLINED_EXPONENTS};

/// A polynomial in `X` over the multivariate polynomials in the remaining
/// variables, stored as (exponent, coefficient) pairs with strictly
/// decreasing exponents and no zero coefficients.
#[derive(Clone)]
pub struct MainVarPoly<R: Ring, E: Exponent> {
    pub exps: Vec<u32>,
    pub coeffs: Vec<MultivariatePolynomial<R, E>>,
    pub nvars: usize,
    pub field: R,
}

impl<R: Ring, E: Exponent> MainVarPoly<R, E> {
    #[inline]
    pub fn new(nvars: usize, field: R) -> Self {
        Self {
            exps: vec![],
            coeffs: vec![],
            nvars,
            field,
        }
    }

    pub fn new_from(&self) -> Self {
        Self::new(self.nvars, self.field.clone())
    }

    /// The constant polynomial 1.
    pub fn one(&self) -> Self {
        let helper = MultivariatePolynomial::<R, E>::new(self.nvars, self.field.clone(), None);
        Self {
            exps: vec![0],
            coeffs: vec![helper.one()],
            nvars: self.nvars,
            field: self.field.clone(),
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.exps.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.exps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exps.is_empty()
    }

    /// The exponent of the leading `X` term.
    #[inline]
    pub fn degree(&self) -> u32 {
        debug_assert!(!self.is_zero());
        self.exps[0]
    }

    /// The coefficient of the leading `X` term.
    #[inline]
    pub fn leading_coeff(&self) -> &MultivariatePolynomial<R, E> {
        debug_assert!(!self.is_zero());
        &self.coeffs[0]
    }

    /// The leading scalar: the leading coefficient of the leading
    /// coefficient polynomial.
    #[inline]
    pub fn lcoeff_scalar(&self) -> R::Element {
        self.leading_coeff().lcoeff()
    }

    /// The coefficient of `X^exp`, if present.
    pub fn coefficient_of(&self, exp: u32) -> Option<&MultivariatePolynomial<R, E>> {
        // exponents are strictly decreasing
        self.exps
            .binary_search_by(|e| exp.cmp(e))
            .ok()
            .map(|i| &self.coeffs[i])
    }

    /// Append a term with an exponent below all existing ones. Zero
    /// coefficients are skipped.
    pub fn push(&mut self, exp: u32, coeff: MultivariatePolynomial<R, E>) {
        if coeff.is_zero() {
            return;
        }

        debug_assert!(self.exps.last().map(|l| exp < *l).unwrap_or(true));
        self.exps.push(exp);
        self.coeffs.push(coeff);
    }

    /// Verify the exponent ordering and coefficient canonicity.
    pub fn check_consistency(&self) {
        assert_eq!(self.exps.len(), self.coeffs.len());
        for (i, c) in self.coeffs.iter().enumerate() {
            assert!(!c.is_zero());
            assert_eq!(c.nvars, self.nvars);
            c.check_consistency();
            if i > 0 {
                assert!(self.exps[i] < self.exps[i - 1]);
            }
        }
    }

    /// Separate variable 0 of `poly` into the `X` layer; the coefficients
    /// keep the remaining variables, shifted down by one.
    pub fn from_polynomial(poly: &MultivariatePolynomial<R, E>) -> Self {
        let nvars = poly.nvars - 1;
        let mut res = Self::new(nvars, poly.field.clone());

        // variable 0 is the most significant in the term order, so the
        // groups are contiguous runs with ascending inner monomials
        let mut bounds: Vec<(u32, usize, usize)> = vec![];
        for t in 0..poly.nterms {
            let e = poly.exponents(t)[0].to_u32();
            match bounds.last_mut() {
                Some((ge, _, stop)) if *ge == e => *stop = t + 1,
                _ => bounds.push((e, t, t + 1)),
            }
        }

        for (e, start, stop) in bounds.into_iter().rev() {
            let mut c = MultivariatePolynomial::new(nvars, poly.field.clone(), Some(stop - start));
            for t in start..stop {
                c.coefficients.push(poly.coefficients[t].clone());
                c.exponents.extend_from_slice(&poly.exponents(t)[1..]);
                c.nterms += 1;
            }
            res.push(e, c);
        }
        res
    }

    /// Reattach the `X` layer as variable 0 of a flat polynomial.
    pub fn to_polynomial(&self) -> MultivariatePolynomial<R, E> {
        let nvars = self.nvars + 1;
        let mut res = MultivariatePolynomial::new(nvars, self.field.clone(), None);

        // iterate with increasing main exponent so the appends stay ordered
        for (e, c) in self.exps.iter().zip(&self.coeffs).rev() {
            for t in 0..c.nterms {
                let mut exps: SmallVec<[E; INLINED_EXPONENTS]> = SmallVec::with_capacity(nvars);
                exps.push(E::from_u32(*e));
                exps.extend_from_slice(c.exponents(t));

                res.append_monomial(c.coefficients[t].clone(), &exps);
            }
        }
        res
    }

    /// Multiply all coefficients by a scalar.
    pub fn mul_coeff(&mut self, v: &R::Element) {
        debug_assert!(!R::is_zero(v));
        for c in &mut self.coeffs {
            for cc in &mut c.coefficients {
                self.field.mul_assign(cc, v);
            }
        }
    }
}

impl<R: EuclideanDomain, E: Exponent> MainVarPoly<R, E> {
    /// The gcd of all scalar coefficients.
    pub fn content(&self) -> R::Element {
        let mut c = self.field.zero();
        for p in &self.coeffs {
            if self.field.is_one(&c) {
                break;
            }
            c = self.field.gcd(&c, &p.content());
        }
        c
    }

    /// Divide all coefficients exactly by a scalar.
    pub fn div_coeff(&mut self, v: &R::Element) {
        if self.field.is_one(v) {
            return;
        }

        for c in &mut self.coeffs {
            for cc in &mut c.coefficients {
                let (q, r) = self.field.quot_rem(cc, v);
                debug_assert!(R::is_zero(&r));
                *cc = q;
            }
        }
    }
}

impl<E: Exponent> MainVarPoly<IntegerRing, E> {
    /// The height: the largest absolute value of any coefficient.
    pub fn height(&self) -> Integer {
        let mut h = Integer::zero();
        for c in &self.coeffs {
            for cc in &c.coefficients {
                if h.abs_cmp(cc) == std::cmp::Ordering::Less {
                    h = cc.abs();
                }
            }
        }
        h
    }
}

impl<R: Ring, E: Exponent> PartialEq for MainVarPoly<R, E> {
    fn eq(&self, other: &Self) -> bool {
        self.exps == other.exps && self.coeffs == other.coeffs
    }
}

impl<R: Ring, E: Exponent> Eq for MainVarPoly<R, E> {}

impl<R: Ring, E: Exponent> std::fmt::Debug for MainVarPoly<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl<R: Ring, E: Exponent> Display for MainVarPoly<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }

        for (i, (e, c)) in self.exps.iter().zip(&self.coeffs).enumerate() {
            if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "({})*X^{}", c, e)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::domains::integer::{Integer, Z};
    use crate::poly::polynomial::MultivariatePolynomial;

    use super::MainVarPoly;

    #[test]
    fn roundtrip() {
        // p = 2 x^2 y + 3 x - y + 5 in (x, y), main variable x
        let mut p = MultivariatePolynomial::<_, u16>::new(2, Z, None);
        p.append_monomial(Integer::from(2), &[2, 1]);
        p.append_monomial(Integer::from(3), &[1, 0]);
        p.append_monomial(Integer::from(-1), &[0, 1]);
        p.append_monomial(Integer::from(5), &[0, 0]);

        let u = MainVarPoly::from_polynomial(&p);
        u.check_consistency();
        assert_eq!(u.len(), 3);
        assert_eq!(u.degree(), 2);
        assert_eq!(u.exps, vec![2, 1, 0]);
        assert_eq!(u.lcoeff_scalar(), 2);

        assert_eq!(u.to_polynomial(), p);
    }

    #[test]
    fn content_and_height() {
        let mut p = MultivariatePolynomial::<_, u16>::new(2, Z, None);
        p.append_monomial(Integer::from(6), &[1, 1]);
        p.append_monomial(Integer::from(-9), &[1, 0]);
        p.append_monomial(Integer::from(12), &[0, 2]);

        let mut u = MainVarPoly::from_polynomial(&p);
        assert_eq!(u.content(), 3);
        assert_eq!(u.height(), 12);

        u.div_coeff(&Integer::from(3));
        assert_eq!(u.height(), 4);
        assert_eq!(u.coefficient_of(1).unwrap().nterms(), 2);
        assert!(u.coefficient_of(2).is_none());
    }
}
