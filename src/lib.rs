//! Parallel modular GCD engine for multivariate polynomials with
//! integer coefficients.
//!
//! The crate computes `G = gcd(A, B)` together with the cofactors
//! `Abar = A/G` and `Bbar = B/G` using Brown's modular algorithm: the
//! inputs are reduced modulo a sequence of word-sized primes, the GCD of
//! each image is computed densely over the prime field, and the integer
//! coefficients are reconstructed with a compiled Chinese-remainder
//! program until a height-based divisibility bound certifies the result.
//!
//! Both phases are parallel: prime images are distributed over master
//! threads (each optionally owning workers for the dense modular GCD),
//! and the CRT lift is distributed over the exponents of the main
//! variable.
//!
//! # Example
//!
//! ```rust
//! use modgcd::domains::integer::{Integer, Z};
//! use modgcd::poly::polynomial::MultivariatePolynomial;
//!
//! // a = x^2 - y^2, b = x^2 + 3xy + 2y^2, gcd = x + y
//! let mut a = MultivariatePolynomial::<_, u16>::new(2, Z, None);
//! a.append_monomial(Integer::from(1), &[2, 0]);
//! a.append_monomial(Integer::from(-1), &[0, 2]);
//!
//! let mut b = MultivariatePolynomial::<_, u16>::new(2, Z, None);
//! b.append_monomial(Integer::from(1), &[2, 0]);
//! b.append_monomial(Integer::from(3), &[1, 1]);
//! b.append_monomial(Integer::from(2), &[0, 2]);
//!
//! let g = a.gcd_brown(&b, 2).unwrap();
//! assert_eq!(g.nterms(), 2);
//! ```

pub mod domains;
pub mod poly;
