use modgcd::domains::integer::{Integer, Z};
use modgcd::poly::gcd::gcd_brown_mainvar;
use modgcd::poly::mainvar::MainVarPoly;
use modgcd::poly::polynomial::MultivariatePolynomial;

fn poly(nvars: usize, terms: &[(i64, &[u16])]) -> MultivariatePolynomial<Z, u16> {
    let mut p = MultivariatePolynomial::new(nvars, Z, Some(terms.len()));
    for (c, e) in terms {
        p.append_monomial(Integer::from(*c), *e);
    }
    p
}

/// Run the engine on flat polynomials and return (g, abar, bbar) flattened
/// back.
fn engine(
    a: &MultivariatePolynomial<Z, u16>,
    b: &MultivariatePolynomial<Z, u16>,
    num_workers: usize,
) -> (
    MultivariatePolynomial<Z, u16>,
    MultivariatePolynomial<Z, u16>,
    MultivariatePolynomial<Z, u16>,
) {
    let au = MainVarPoly::from_polynomial(a);
    let bu = MainVarPoly::from_polynomial(b);
    let (g, abar, bbar) = gcd_brown_mainvar(au, bu, num_workers).unwrap();
    (
        g.to_polynomial(),
        abar.to_polynomial(),
        bbar.to_polynomial(),
    )
}

#[test]
fn monomial_inputs() {
    // gcd(x^2, x*y) = x
    let a = poly(2, &[(1, &[2, 0])]);
    let b = poly(2, &[(1, &[1, 1])]);

    let (g, abar, bbar) = engine(&a, &b, 0);
    assert_eq!(g, poly(2, &[(1, &[1, 0])]));
    assert_eq!(abar, poly(2, &[(1, &[1, 0])]));
    assert_eq!(bbar, poly(2, &[(1, &[0, 1])]));
}

#[test]
fn shared_linear_factor() {
    // a = (x+y)(x-y), b = (x+y)(x+2y)
    let a = poly(2, &[(1, &[2, 0]), (-1, &[0, 2])]);
    let b = poly(2, &[(1, &[2, 0]), (3, &[1, 1]), (2, &[0, 2])]);

    let (g, abar, bbar) = engine(&a, &b, 1);
    assert_eq!(g, poly(2, &[(1, &[1, 0]), (1, &[0, 1])]));
    assert_eq!(abar, poly(2, &[(1, &[1, 0]), (-1, &[0, 1])]));
    assert_eq!(bbar, poly(2, &[(1, &[1, 0]), (2, &[0, 1])]));

    // the wrapper gives the same gcd
    let gw = a.gcd_brown(&b, 2).unwrap();
    assert_eq!(gw, g);
}

#[test]
fn content_handling() {
    // a = 3x(2y+3), b = 5x(2y+3): the contents 3 and 5 are coprime and the
    // shared factor x(2y+3) survives in full
    let a = poly(2, &[(6, &[1, 1]), (9, &[1, 0])]);
    let b = poly(2, &[(10, &[1, 1]), (15, &[1, 0])]);

    let (g, abar, bbar) = engine(&a, &b, 0);
    assert_eq!(g, poly(2, &[(2, &[1, 1]), (3, &[1, 0])]));
    assert_eq!(abar, poly(2, &[(3, &[0, 0])]));
    assert_eq!(bbar, poly(2, &[(5, &[0, 0])]));

    // cofactor contents are coprime
    assert_eq!(abar.content().gcd(&bbar.content()), Integer::from(1));
}

#[test]
fn zero_input() {
    let zero = poly(2, &[]);
    let b = poly(2, &[(-7, &[1, 0])]);

    // gcd(0, -7x) = 7x, no division performed
    let g = zero.gcd_brown(&b, 1).unwrap();
    assert_eq!(g, poly(2, &[(7, &[1, 0])]));

    let g = b.gcd_brown(&zero, 1).unwrap();
    assert_eq!(g, poly(2, &[(7, &[1, 0])]));

    let g = zero.gcd_brown(&zero, 1).unwrap();
    assert!(g.is_zero());
}

#[test]
fn coprime_inputs() {
    let a = poly(2, &[(1, &[1, 0]), (1, &[0, 0])]);
    let b = poly(2, &[(1, &[0, 1]), (2, &[0, 0])]);

    let (g, abar, bbar) = engine(&a, &b, 1);
    assert!(g.is_one());
    assert_eq!(abar, a);
    assert_eq!(bbar, b);
}

#[test]
fn product_identities() {
    // trivariate with mixed signs and nontrivial leading coefficients
    let g = poly(
        3,
        &[(2, &[2, 1, 0]), (-3, &[1, 0, 1]), (1, &[0, 1, 1]), (7, &[0, 0, 0])],
    );
    let p = poly(3, &[(1, &[2, 0, 0]), (5, &[0, 1, 0]), (-2, &[0, 0, 2])]);
    let q = poly(3, &[(3, &[1, 1, 1]), (1, &[1, 0, 0]), (4, &[0, 0, 1])]);

    let a = &g * &p;
    let b = &g * &q;

    let (gg, abar, bbar) = engine(&a, &b, 2);

    // P1: the identities hold and the leading coefficient is positive
    assert_eq!(&gg * &abar, a);
    assert_eq!(&gg * &bbar, b);
    assert!(!gg.lcoeff().is_negative());

    // p and q are coprime, so the gcd is g exactly (g is primitive)
    assert_eq!(gg, g);

    // P2
    assert_eq!(abar.content().gcd(&bbar.content()), Integer::from(1));
}

#[test]
fn thread_count_invariance() {
    let g = poly(3, &[(1, &[1, 1, 0]), (4, &[0, 0, 1]), (-5, &[0, 0, 0])]);
    let p = poly(3, &[(2, &[1, 0, 0]), (1, &[0, 1, 1]), (3, &[0, 0, 0])]);
    let q = poly(3, &[(1, &[2, 0, 0]), (-1, &[0, 1, 0]), (1, &[0, 0, 0])]);

    let a = &g * &p;
    let b = &g * &q;

    let (g0, _, _) = engine(&a, &b, 0);
    for workers in [1, 2, 4] {
        let (gk, _, _) = engine(&a, &b, workers);
        assert_eq!(g0, gk, "gcd differs with {} workers", workers);
    }
}

#[test]
fn large_coefficients() {
    // coefficient growth that needs several primes and exercises the
    // balanced CRT tree in the join
    let big = Integer::from(10).pow(25);

    let mut g = poly(2, &[(1, &[2, 1]), (3, &[0, 1]), (1, &[0, 0])]);
    g.append_monomial(&big * &Integer::from(2), &[1, 0]);

    let mut p = poly(2, &[(1, &[3, 0]), (-7, &[0, 2])]);
    p.append_monomial(big.clone(), &[1, 1]);

    let mut q = poly(2, &[(1, &[2, 2]), (11, &[1, 0])]);
    q.append_monomial(&big * &Integer::from(-3), &[0, 1]);

    let a = &g * &p;
    let b = &g * &q;

    for workers in [0, 3] {
        let (gg, abar, bbar) = engine(&a, &b, workers);
        assert_eq!(&gg * &abar, a);
        assert_eq!(&gg * &bbar, b);
        assert_eq!(gg, g);
    }
}

#[test]
fn univariate_dispatch() {
    // (x^2 - 1, x^2 + 3x + 2) -> x + 1 through the univariate fallback
    let a = poly(1, &[(1, &[2]), (-1, &[0])]);
    let b = poly(1, &[(1, &[2]), (3, &[1]), (2, &[0])]);

    let g = a.gcd_brown(&b, 4).unwrap();
    assert_eq!(g, poly(1, &[(1, &[1]), (1, &[0])]));
}

#[test]
fn constant_inputs() {
    let a = poly(2, &[(12, &[0, 0])]);
    let b = poly(2, &[(18, &[0, 0])]);
    let g = a.gcd_brown(&b, 1).unwrap();
    assert_eq!(g, poly(2, &[(6, &[0, 0])]));
}
