//! Sparse multivariate polynomials with a dense exponent representation
//! per term.

use std::cmp::Ordering;
use std::fmt::Display;

use ahash::HashMap;
use smallvec::SmallVec;

use crate::domains::{EuclideanDomain, Field, Ring};

use super::{Exponent, INLINED_EXPONENTS};

/// A multivariate polynomial with sparse terms. The terms are stored in
/// increasing lexicographic order of the exponent vectors, so the leading
/// term comes last. There are no zero coefficients.
#[derive(Clone)]
pub struct MultivariatePolynomial<F: Ring, E: Exponent> {
    pub coefficients: Vec<F::Element>,
    pub exponents: Vec<E>,
    pub nterms: usize,
    pub nvars: usize,
    pub field: F,
}

impl<F: Ring, E: Exponent> MultivariatePolynomial<F, E> {
    /// Constructs a zero polynomial.
    #[inline]
    pub fn new(nvars: usize, field: F, cap: Option<usize>) -> Self {
        Self {
            coefficients: Vec::with_capacity(cap.unwrap_or(0)),
            exponents: Vec::with_capacity(cap.unwrap_or(0) * nvars),
            nterms: 0,
            nvars,
            field,
        }
    }

    /// Constructs a zero polynomial with the same variable count and field
    /// as `self`.
    #[inline]
    pub fn new_from(&self, cap: Option<usize>) -> Self {
        Self::new(self.nvars, self.field.clone(), cap)
    }

    /// Constructs a constant polynomial with the same shape as `self`.
    pub fn new_from_constant(&self, coeff: F::Element) -> Self {
        let mut poly = self.new_from(Some(1));
        if !F::is_zero(&coeff) {
            poly.coefficients.push(coeff);
            poly.exponents.resize(poly.nvars, E::zero());
            poly.nterms = 1;
        }
        poly
    }

    /// Constructs a polynomial with a single term.
    pub fn new_from_monomial(&self, coeff: F::Element, exponents: &[E]) -> Self {
        debug_assert_eq!(self.nvars, exponents.len());

        let mut poly = self.new_from(Some(1));
        if !F::is_zero(&coeff) {
            poly.coefficients.push(coeff);
            poly.exponents.extend_from_slice(exponents);
            poly.nterms = 1;
        }
        poly
    }

    pub fn one(&self) -> Self {
        self.new_from_constant(self.field.one())
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.nterms == 0
    }

    pub fn is_one(&self) -> bool {
        self.nterms == 1
            && self.field.is_one(&self.coefficients[0])
            && self.exponents.iter().all(|x| x.is_zero())
    }

    /// Returns true if the polynomial has at most one term, with all
    /// exponents zero.
    pub fn is_constant(&self) -> bool {
        if self.is_zero() {
            return true;
        }
        if self.nterms >= 2 {
            return false;
        }
        self.exponents.iter().all(|e| e.is_zero())
    }

    /// The constant term.
    pub fn get_constant(&self) -> F::Element {
        if self.is_zero() || !self.exponents(0).iter().all(|e| e.is_zero()) {
            return self.field.zero();
        }

        self.coefficients[0].clone()
    }

    #[inline]
    pub fn nterms(&self) -> usize {
        self.nterms
    }

    /// The exponents of the `index`th term.
    #[inline]
    pub fn exponents(&self, index: usize) -> &[E] {
        &self.exponents[index * self.nvars..(index + 1) * self.nvars]
    }

    #[inline]
    pub fn exponents_mut(&mut self, index: usize) -> &mut [E] {
        &mut self.exponents[index * self.nvars..(index + 1) * self.nvars]
    }

    /// The exponents of the leading term.
    #[inline]
    pub fn last_exponents(&self) -> &[E] {
        debug_assert!(self.nterms > 0);
        &self.exponents[(self.nterms - 1) * self.nvars..self.nterms * self.nvars]
    }

    /// The coefficient of the leading term.
    #[inline]
    pub fn lcoeff(&self) -> F::Element {
        debug_assert!(self.nterms > 0);
        self.coefficients.last().unwrap().clone()
    }

    /// The degree in variable `x`.
    pub fn degree(&self, x: usize) -> E {
        let mut max = E::zero();
        for t in 0..self.nterms {
            let e = self.exponents(t)[x];
            if e > max {
                max = e;
            }
        }
        max
    }

    /// The largest degree in any variable.
    pub fn max_degree(&self) -> E {
        let mut max = E::zero();
        for e in &self.exponents {
            if *e > max {
                max = *e;
            }
        }
        max
    }

    /// Compare exponent vectors lexicographically.
    #[inline]
    pub fn cmp_exponents(a: &[E], b: &[E]) -> Ordering {
        debug_assert_eq!(a.len(), b.len());
        a.cmp(b)
    }

    /// Verify the term ordering and the absence of explicit zeros.
    pub fn check_consistency(&self) {
        assert_eq!(self.coefficients.len(), self.nterms);
        assert_eq!(self.exponents.len(), self.nterms * self.nvars);

        for t in 0..self.nterms {
            assert!(!F::is_zero(&self.coefficients[t]));
            if t > 0 {
                assert!(Self::cmp_exponents(self.exponents(t), self.exponents(t - 1))
                    == Ordering::Greater);
            }
        }
    }

    /// Add a monomial to the polynomial, preserving the term order and
    /// merging equal monomials.
    pub fn append_monomial(&mut self, coefficient: F::Element, exponents: &[E]) {
        if F::is_zero(&coefficient) {
            return;
        }

        debug_assert_eq!(exponents.len(), self.nvars);

        // common case: the new monomial is the largest
        if self.nterms == 0
            || Self::cmp_exponents(exponents, self.last_exponents()) == Ordering::Greater
        {
            self.coefficients.push(coefficient);
            self.exponents.extend_from_slice(exponents);
            self.nterms += 1;
            return;
        }

        // binary search for the insertion point
        let mut l = 0;
        let mut r = self.nterms;
        while l < r {
            let m = l + (r - l) / 2;
            match Self::cmp_exponents(exponents, self.exponents(m)) {
                Ordering::Equal => {
                    self.field.add_assign(&mut self.coefficients[m], &coefficient);
                    if F::is_zero(&self.coefficients[m]) {
                        self.coefficients.remove(m);
                        self.exponents.drain(m * self.nvars..(m + 1) * self.nvars);
                        self.nterms -= 1;
                    }
                    return;
                }
                Ordering::Greater => l = m + 1,
                Ordering::Less => r = m,
            }
        }

        self.coefficients.insert(l, coefficient);
        for (i, e) in exponents.iter().enumerate() {
            self.exponents.insert(l * self.nvars + i, *e);
        }
        self.nterms += 1;
    }

    /// Multiply by a scalar.
    pub fn mul_coeff(mut self, other: &F::Element) -> Self {
        if F::is_zero(other) {
            return self.new_from(None);
        }

        for c in &mut self.coefficients {
            self.field.mul_assign(c, other);
        }
        self
    }

    /// Evaluate variable `n` at `v`.
    pub fn replace(&self, n: usize, v: &F::Element) -> Self {
        let mut accum: HashMap<SmallVec<[E; INLINED_EXPONENTS]>, F::Element> =
            HashMap::default();

        // cache v^e for the powers that occur
        let maxdeg = self.degree(n).to_u32() as usize;
        let mut powers: Vec<Option<F::Element>> = vec![None; maxdeg + 1];

        for t in 0..self.nterms {
            let e = self.exponents(t)[n].to_u32() as usize;
            let p = powers[e]
                .get_or_insert_with(|| self.field.pow(v, e as u64))
                .clone();

            let c = self.field.mul(&self.coefficients[t], &p);

            let mut key: SmallVec<[E; INLINED_EXPONENTS]> = self.exponents(t).into();
            key[n] = E::zero();

            match accum.entry(key) {
                std::collections::hash_map::Entry::Occupied(mut o) => {
                    self.field.add_assign(o.get_mut(), &c);
                }
                std::collections::hash_map::Entry::Vacant(vac) => {
                    vac.insert(c);
                }
            }
        }

        let mut terms: Vec<_> = accum
            .into_iter()
            .filter(|(_, c)| !F::is_zero(c))
            .collect();
        terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut res = self.new_from(Some(terms.len()));
        for (e, c) in terms {
            res.coefficients.push(c);
            res.exponents.extend_from_slice(&e);
            res.nterms += 1;
        }
        res
    }

    /// Group the terms by their exponents in all variables except `x`,
    /// yielding pairs of (exponents with `x` cleared, univariate polynomial
    /// in `x`), sorted by ascending key.
    pub fn to_univariate_buckets(
        &self,
        x: usize,
    ) -> Vec<(SmallVec<[E; INLINED_EXPONENTS]>, Self)> {
        let mut map: HashMap<SmallVec<[E; INLINED_EXPONENTS]>, Self> = HashMap::default();

        for t in 0..self.nterms {
            let mut key: SmallVec<[E; INLINED_EXPONENTS]> = self.exponents(t).into();
            let mut e: SmallVec<[E; INLINED_EXPONENTS]> =
                smallvec::smallvec![E::zero(); self.nvars];
            e[x] = key[x];
            key[x] = E::zero();

            map.entry(key)
                .or_insert_with(|| self.new_from(None))
                .append_monomial(self.coefficients[t].clone(), &e);
        }

        let mut buckets: Vec<_> = map.into_iter().collect();
        buckets.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        buckets
    }
}

impl<F: EuclideanDomain, E: Exponent> MultivariatePolynomial<F, E> {
    /// The content: the gcd of all coefficients.
    pub fn content(&self) -> F::Element {
        if self.is_zero() {
            return self.field.zero();
        }

        let mut c = self.coefficients[0].clone();
        for cc in self.coefficients.iter().skip(1) {
            if self.field.is_one(&c) {
                break;
            }
            c = self.field.gcd(&c, cc);
        }
        c
    }

    /// Divide each coefficient exactly by `other`.
    pub fn div_coeff(mut self, other: &F::Element) -> Self {
        debug_assert!(!F::is_zero(other));

        if self.field.is_one(other) {
            return self;
        }

        for c in &mut self.coefficients {
            let (q, r) = self.field.quot_rem(c, other);
            debug_assert!(F::is_zero(&r));
            *c = q;
        }
        self
    }
}

impl<F: Field, E: Exponent> MultivariatePolynomial<F, E> {
    /// Multivariate long division returning the quotient if the division
    /// is exact.
    pub fn try_div(&self, div: &Self) -> Option<Self> {
        debug_assert_eq!(self.nvars, div.nvars);
        debug_assert!(!div.is_zero());

        if self.is_zero() {
            return Some(self.clone());
        }

        let mut rem = self.clone();
        let mut quot = self.new_from(Some(self.nterms));
        let div_lead = div.last_exponents();
        let div_lcoeff_inv = self.field.inv(&div.lcoeff());

        let mut qexp: SmallVec<[E; INLINED_EXPONENTS]> =
            smallvec::smallvec![E::zero(); self.nvars];

        while !rem.is_zero() {
            let lead = rem.last_exponents();
            for ((q, l), d) in qexp.iter_mut().zip(lead).zip(div_lead) {
                if l < d {
                    return None;
                }
                *q = *l - *d;
            }

            let qc = self.field.mul(&rem.lcoeff(), &div_lcoeff_inv);

            // rem -= qc * x^qexp * div
            for t in 0..div.nterms {
                let mut e: SmallVec<[E; INLINED_EXPONENTS]> = div.exponents(t).into();
                for (ei, qi) in e.iter_mut().zip(&qexp) {
                    *ei += *qi;
                }
                let c = self.field.neg(&self.field.mul(&div.coefficients[t], &qc));
                rem.append_monomial(c, &e);
            }

            quot.append_monomial(qc, &qexp);
        }

        Some(quot)
    }

    /// Make the leading coefficient 1.
    pub fn make_monic(mut self) -> Self {
        if self.is_zero() {
            return self;
        }

        let inv = self.field.inv(&self.lcoeff());
        for c in &mut self.coefficients {
            self.field.mul_assign(c, &inv);
        }
        self
    }

    /// The dense coefficient vector of a polynomial in the single
    /// variable `x`.
    pub fn to_dense_univariate(&self, x: usize) -> Vec<F::Element> {
        let mut coeffs = vec![self.field.zero(); self.degree(x).to_u32() as usize + 1];
        for t in 0..self.nterms {
            debug_assert!(self
                .exponents(t)
                .iter()
                .enumerate()
                .all(|(i, e)| i == x || e.is_zero()));
            coeffs[self.exponents(t)[x].to_u32() as usize] = self.coefficients[t].clone();
        }
        coeffs
    }

    /// Build a polynomial in variable `x` from a dense coefficient vector.
    pub fn from_dense_univariate(&self, x: usize, coeffs: &[F::Element]) -> Self {
        let mut res = self.new_from(Some(coeffs.len()));
        let mut e: SmallVec<[E; INLINED_EXPONENTS]> = smallvec::smallvec![E::zero(); self.nvars];
        for (i, c) in coeffs.iter().enumerate() {
            if !F::is_zero(c) {
                e[x] = E::from_u32(i as u32);
                res.append_monomial(c.clone(), &e);
            }
        }
        res
    }

    /// The univariate GCD in variable `x` using Euclid's algorithm. The
    /// result is monic. Both inputs must be polynomials in `x` only.
    pub fn univariate_gcd(&self, other: &Self, x: usize) -> Self {
        if self.is_zero() {
            return other.clone().make_monic();
        }
        if other.is_zero() {
            return self.clone().make_monic();
        }

        let mut c = self.to_dense_univariate(x);
        let mut d = other.to_dense_univariate(x);
        if c.len() < d.len() {
            std::mem::swap(&mut c, &mut d);
        }

        while !d.is_empty() {
            dense_univariate_rem(&self.field, &mut c, &d);
            while c.last().map(F::is_zero).unwrap_or(false) {
                c.pop();
            }
            std::mem::swap(&mut c, &mut d);
        }

        // normalize
        let inv = self.field.inv(c.last().unwrap());
        for x in &mut c {
            self.field.mul_assign(x, &inv);
        }

        self.from_dense_univariate(x, &c)
    }
}

/// Reduce the dense polynomial `a` modulo `b` in place; `b` must be
/// normalized (nonzero leading coefficient).
fn dense_univariate_rem<F: Field>(field: &F, a: &mut Vec<F::Element>, b: &[F::Element]) {
    debug_assert!(!b.is_empty() && !F::is_zero(b.last().unwrap()));

    let lead_inv = field.inv(b.last().unwrap());

    while a.len() >= b.len() {
        let q = field.mul(a.last().unwrap(), &lead_inv);
        let shift = a.len() - b.len();
        for (i, bc) in b.iter().enumerate() {
            let t = field.mul(bc, &q);
            field.sub_assign(&mut a[shift + i], &t);
        }

        debug_assert!(F::is_zero(a.last().unwrap()));
        a.pop();
        while a.last().map(F::is_zero).unwrap_or(false) {
            a.pop();
        }
    }
}

impl<F: Ring, E: Exponent> PartialEq for MultivariatePolynomial<F, E> {
    fn eq(&self, other: &Self) -> bool {
        self.nvars == other.nvars
            && self.nterms == other.nterms
            && self.exponents == other.exponents
            && self.coefficients == other.coefficients
    }
}

impl<F: Ring, E: Exponent> Eq for MultivariatePolynomial<F, E> {}

impl<F: Ring, E: Exponent> std::ops::Add for &MultivariatePolynomial<F, E> {
    type Output = MultivariatePolynomial<F, E>;

    fn add(self, other: Self) -> MultivariatePolynomial<F, E> {
        debug_assert_eq!(self.nvars, other.nvars);

        // merge the two sorted term lists
        let mut res = self.new_from(Some(self.nterms + other.nterms));
        let mut i = 0;
        let mut j = 0;

        while i < self.nterms || j < other.nterms {
            let which = if i == self.nterms {
                Ordering::Greater
            } else if j == other.nterms {
                Ordering::Less
            } else {
                MultivariatePolynomial::<F, E>::cmp_exponents(
                    self.exponents(i),
                    other.exponents(j),
                )
            };

            match which {
                Ordering::Less => {
                    res.coefficients.push(self.coefficients[i].clone());
                    res.exponents.extend_from_slice(self.exponents(i));
                    res.nterms += 1;
                    i += 1;
                }
                Ordering::Greater => {
                    res.coefficients.push(other.coefficients[j].clone());
                    res.exponents.extend_from_slice(other.exponents(j));
                    res.nterms += 1;
                    j += 1;
                }
                Ordering::Equal => {
                    let c = self.field.add(&self.coefficients[i], &other.coefficients[j]);
                    if !F::is_zero(&c) {
                        res.coefficients.push(c);
                        res.exponents.extend_from_slice(self.exponents(i));
                        res.nterms += 1;
                    }
                    i += 1;
                    j += 1;
                }
            }
        }

        res
    }
}

impl<F: Ring, E: Exponent> std::ops::Neg for MultivariatePolynomial<F, E> {
    type Output = Self;

    fn neg(mut self) -> Self {
        for c in &mut self.coefficients {
            *c = self.field.neg(c);
        }
        self
    }
}

impl<F: Ring, E: Exponent> std::ops::Sub for &MultivariatePolynomial<F, E> {
    type Output = MultivariatePolynomial<F, E>;

    fn sub(self, other: Self) -> MultivariatePolynomial<F, E> {
        self + &(-other.clone())
    }
}

impl<F: Ring, E: Exponent> std::ops::Mul for &MultivariatePolynomial<F, E> {
    type Output = MultivariatePolynomial<F, E>;

    fn mul(self, other: Self) -> MultivariatePolynomial<F, E> {
        debug_assert_eq!(self.nvars, other.nvars);

        let mut accum: HashMap<SmallVec<[E; INLINED_EXPONENTS]>, F::Element> =
            HashMap::default();

        for t1 in 0..self.nterms {
            for t2 in 0..other.nterms {
                let mut e: SmallVec<[E; INLINED_EXPONENTS]> = self.exponents(t1).into();
                for (ei, oi) in e.iter_mut().zip(other.exponents(t2)) {
                    *ei = ei
                        .checked_add(oi)
                        .expect("Overflow in adding exponents");
                }

                let c = self.field.mul(&self.coefficients[t1], &other.coefficients[t2]);
                match accum.entry(e) {
                    std::collections::hash_map::Entry::Occupied(mut o) => {
                        self.field.add_assign(o.get_mut(), &c);
                    }
                    std::collections::hash_map::Entry::Vacant(v) => {
                        v.insert(c);
                    }
                }
            }
        }

        let mut terms: Vec<_> = accum
            .into_iter()
            .filter(|(_, c)| !F::is_zero(c))
            .collect();
        terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut res = self.new_from(Some(terms.len()));
        for (e, c) in terms {
            res.coefficients.push(c);
            res.exponents.extend_from_slice(&e);
            res.nterms += 1;
        }
        res
    }
}

impl<F: Ring, E: Exponent> std::fmt::Debug for MultivariatePolynomial<F, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl<F: Ring, E: Exponent> Display for MultivariatePolynomial<F, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }

        for t in (0..self.nterms).rev() {
            if t + 1 < self.nterms {
                write!(f, "+")?;
            }

            write!(f, "{}", self.coefficients[t])?;
            for (i, e) in self.exponents(t).iter().enumerate() {
                if !e.is_zero() {
                    write!(f, "*x{}^{}", i, e)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::domains::finite_field::Zp;
    use crate::domains::integer::{Integer, Z};

    use super::MultivariatePolynomial;

    fn from_terms(terms: &[(i64, [u16; 2])]) -> MultivariatePolynomial<Z, u16> {
        let mut p = MultivariatePolynomial::new(2, Z, Some(terms.len()));
        for (c, e) in terms {
            p.append_monomial(Integer::from(*c), e);
        }
        p
    }

    #[test]
    fn append_order() {
        // insert out of order and twice on the same monomial
        let p = from_terms(&[(3, [0, 1]), (5, [2, 0]), (1, [1, 1]), (-3, [0, 1]), (7, [0, 0])]);
        assert_eq!(p.nterms(), 3);
        p.check_consistency();
        assert_eq!(p.last_exponents(), &[2, 0]);
        assert_eq!(p.lcoeff(), 5);
    }

    #[test]
    fn arithmetic() {
        let a = from_terms(&[(1, [1, 0]), (1, [0, 1])]);
        let b = from_terms(&[(1, [1, 0]), (-1, [0, 1])]);

        let prod = &a * &b;
        assert_eq!(prod, from_terms(&[(1, [2, 0]), (-1, [0, 2])]));

        let sum = &prod + &from_terms(&[(1, [0, 2])]);
        assert_eq!(sum, from_terms(&[(1, [2, 0])]));

        assert!((&a - &a).is_zero());
    }

    #[test]
    fn content_division() {
        let a = from_terms(&[(6, [1, 1]), (9, [1, 0])]);
        assert_eq!(a.content(), 3);
        let b = a.div_coeff(&Integer::from(3));
        assert_eq!(b, from_terms(&[(2, [1, 1]), (3, [1, 0])]));
    }

    #[test]
    fn try_div() {
        let field = Zp::new(101);
        let mut a = MultivariatePolynomial::<_, u16>::new(2, field, None);
        // (x + y)(x + 2y) = x^2 + 3xy + 2y^2
        a.append_monomial(field.to_element(1), &[2, 0]);
        a.append_monomial(field.to_element(3), &[1, 1]);
        a.append_monomial(field.to_element(2), &[0, 2]);

        let mut d = MultivariatePolynomial::<_, u16>::new(2, field, None);
        d.append_monomial(field.to_element(1), &[1, 0]);
        d.append_monomial(field.to_element(1), &[0, 1]);

        let q = a.try_div(&d).unwrap();
        assert_eq!(&q * &d, a);

        let mut bad = MultivariatePolynomial::<_, u16>::new(2, field, None);
        bad.append_monomial(field.to_element(1), &[1, 0]);
        bad.append_monomial(field.to_element(5), &[0, 1]);
        assert!(a.try_div(&bad).is_none());
    }

    #[test]
    fn univariate_gcd() {
        let field = Zp::new(101);
        // (x+1)^2 (x+2)  and (x+1)(x+3)
        let mut x1 = MultivariatePolynomial::<_, u16>::new(1, field, None);
        x1.append_monomial(field.to_element(1), &[1]);
        x1.append_monomial(field.to_element(1), &[0]);

        let mut x2 = MultivariatePolynomial::<_, u16>::new(1, field, None);
        x2.append_monomial(field.to_element(1), &[1]);
        x2.append_monomial(field.to_element(2), &[0]);

        let mut x3 = MultivariatePolynomial::<_, u16>::new(1, field, None);
        x3.append_monomial(field.to_element(1), &[1]);
        x3.append_monomial(field.to_element(3), &[0]);

        let a = &(&x1 * &x1) * &x2;
        let b = &x1 * &x3;

        let g = a.univariate_gcd(&b, 0);
        assert_eq!(g, x1);
    }

    #[test]
    fn replace() {
        let field = Zp::new(101);
        let mut a = MultivariatePolynomial::<_, u16>::new(2, field, None);
        // x^2 y + 3 x + y
        a.append_monomial(field.to_element(1), &[2, 1]);
        a.append_monomial(field.to_element(3), &[1, 0]);
        a.append_monomial(field.to_element(1), &[0, 1]);

        let at2 = a.replace(0, &field.to_element(2));
        // 4y + 6 + y = 5y + 6
        let mut expected = MultivariatePolynomial::<_, u16>::new(2, field, None);
        expected.append_monomial(field.to_element(5), &[0, 1]);
        expected.append_monomial(field.to_element(6), &[0, 0]);
        assert_eq!(at2, expected);
    }
}
