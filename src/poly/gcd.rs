//! Brown's parallel modular GCD for multivariate polynomials over the
//! integers: per-prime dense images computed (optionally in parallel) over
//! word-sized prime fields, lifted back by Chinese remaindering that is
//! itself distributed over the exponents of the main variable, until a
//! height-based divisibility bound certifies the result.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Mutex;

use smallvec::SmallVec;
use tracing::debug;

use crate::domains::finite_field::{
    next_prime, FiniteFieldElement, ToFiniteField, Zp, PRIME_FLOOR,
};
use crate::domains::integer::{Integer, IntegerRing, Z};
use crate::domains::{Field, Ring};

use super::crt::{crt_exp, CrtProgram};
use super::mainvar::MainVarPoly;
use super::polynomial::MultivariatePolynomial;
use super::{Exponent, INLINED_EXPONENTS};

type ZPoly<E> = MultivariatePolynomial<IntegerRing, E>;
type ModPoly<E> = MultivariatePolynomial<Zp, E>;

/// Interpolate a polynomial in `var` from its images at distinct sample
/// points. The Newton form is grown one divided difference per image,
/// then expanded with a Horner scheme.
fn interpolate<E: Exponent>(
    points: &[FiniteFieldElement],
    values: &[ModPoly<E>],
    var: usize,
) -> ModPoly<E> {
    debug_assert_eq!(points.len(), values.len());
    let field = values[0].field;

    // diffs[k] multiplies (x - t_0)...(x - t_{k-1}) in the Newton form
    let mut diffs: Vec<ModPoly<E>> = Vec::with_capacity(values.len());
    for (n, value) in values.iter().enumerate() {
        // subtract the Newton form built so far, evaluated at t_n, and
        // divide by prod_{i<n} (t_n - t_i)
        let mut rest = value.clone();
        let mut scale = field.one();
        for (k, diff) in diffs.iter().enumerate() {
            rest = &rest - &diff.clone().mul_coeff(&scale);
            scale = field.mul(&scale, &field.sub(&points[n], &points[k]));
        }
        diffs.push(rest.mul_coeff(&field.inv(&scale)));
    }

    let mut exps: SmallVec<[E; INLINED_EXPONENTS]> =
        smallvec::smallvec![E::zero(); values[0].nvars];
    exps[var] = E::one();
    let x_poly = values[0].new_from_monomial(field.one(), &exps);

    let mut result = diffs.pop().unwrap();
    while let Some(diff) = diffs.pop() {
        let shifted = &x_poly - &values[0].new_from_constant(points[diffs.len()]);
        result = &(&result * &shifted) + &diff;
    }
    result
}

/// The content of `p` viewed as a polynomial over `Zp[x]`: the monic gcd
/// of the univariate coefficient buckets.
fn univariate_content<E: Exponent>(p: &ModPoly<E>, x: usize) -> ModPoly<E> {
    let mut c = p.new_from(None);
    for (_, b) in p.to_univariate_buckets(x) {
        if c.is_one() {
            break;
        }
        c = c.univariate_gcd(&b, x);
    }
    c
}

/// The leading coefficient of `p` viewed as a polynomial over `Zp[x]`: the
/// univariate bucket of the largest monomial in the other variables.
fn lead_bucket<E: Exponent>(p: &ModPoly<E>, x: usize) -> ModPoly<E> {
    p.to_univariate_buckets(x).pop().unwrap().1
}

/// Evaluate a polynomial in the single variable `x` at `v`.
fn eval_univariate<E: Exponent>(
    p: &ModPoly<E>,
    x: usize,
    v: &FiniteFieldElement,
) -> FiniteFieldElement {
    let field = &p.field;
    let mut r = field.zero();
    for t in 0..p.nterms {
        let e = p.exponents(t)[x].to_u32() as u64;
        field.add_mul_assign(&mut r, &p.coefficients[t], &field.pow(v, e));
    }
    r
}

/// Brown's dense recursive GCD over a prime field.
///
/// `vars` lists the active variables in increasing order; `vars[0]` is the
/// main variable and the last entry is evaluated at descending field
/// points. Returns `(g, a/g, b/g)` with the leading scalar of `g` equal to
/// 1, or `None` when the evaluation points are exhausted.
///
/// When `num_workers > 0`, the per-point images of this level are computed
/// in batches on scoped threads.
pub fn gcd_brown_zp<E: Exponent>(
    a: &ModPoly<E>,
    b: &ModPoly<E>,
    vars: &[usize],
    num_workers: usize,
) -> Option<(ModPoly<E>, ModPoly<E>, ModPoly<E>)> {
    debug_assert!(!a.is_zero() && !b.is_zero());

    if vars.len() == 1 {
        let g = a.univariate_gcd(b, vars[0]);
        let abar = a.try_div(&g)?;
        let bbar = b.try_div(&g)?;
        return Some((g, abar, bbar));
    }

    let field = a.field;
    let x = *vars.last().unwrap();
    let rec_vars = &vars[..vars.len() - 1];

    // remove the content over Zp[x]
    let ca = univariate_content(a, x);
    let cb = univariate_content(b, x);
    let a = a.try_div(&ca).unwrap();
    let b = b.try_div(&cb).unwrap();
    let cg = ca.univariate_gcd(&cb, x);

    let la = lead_bucket(&a, x);
    let lb = lead_bucket(&b, x);
    let gamma = la.univariate_gcd(&lb, x);

    let trivial = || {
        let ca_red = ca.try_div(&cg).unwrap();
        let cb_red = cb.try_div(&cg).unwrap();
        Some((cg.clone(), &a * &ca_red, &b * &cb_red))
    };

    let mut points: Vec<FiniteFieldElement> = vec![];
    let mut images: Vec<ModPoly<E>> = vec![];
    let mut shape: Option<SmallVec<[E; INLINED_EXPONENTS]>> = None;
    let mut prev_candidate: Option<ModPoly<E>> = None;

    // an image with an undetectably wrong shape makes every division
    // attempt fail; give up on this prime once the point count is far past
    // the interpolation bound
    let max_points = (a.degree(x).to_u32().max(b.degree(x).to_u32())
        + gamma.degree(x).to_u32()
        + 4) as usize;

    let mut alpha_raw = field.get_prime() - 1;

    loop {
        // collect a batch of evaluations that keep the leading buckets alive
        let batch = num_workers + 1;
        let mut evals: Vec<(FiniteFieldElement, ModPoly<E>, ModPoly<E>)> = vec![];
        while evals.len() < batch && alpha_raw > 0 {
            let alpha = field.to_element(alpha_raw);
            alpha_raw -= 1;

            if Zp::is_zero(&eval_univariate(&la, x, &alpha))
                || Zp::is_zero(&eval_univariate(&lb, x, &alpha))
            {
                continue;
            }

            evals.push((alpha, a.replace(x, &alpha), b.replace(x, &alpha)));
        }

        if evals.is_empty() {
            debug!("evaluation points exhausted in modular gcd");
            return None;
        }

        let results: Vec<Option<(ModPoly<E>, ModPoly<E>, ModPoly<E>)>> = if evals.len() == 1 {
            vec![gcd_brown_zp(&evals[0].1, &evals[0].2, rec_vars, 0)]
        } else {
            std::thread::scope(|s| {
                let handles: Vec<_> = evals[1..]
                    .iter()
                    .map(|(_, ea, eb)| s.spawn(move || gcd_brown_zp(ea, eb, rec_vars, 0)))
                    .collect();

                let first = gcd_brown_zp(&evals[0].1, &evals[0].2, rec_vars, 0);
                let mut v = vec![first];
                for h in handles {
                    v.push(h.join().unwrap());
                }
                v
            })
        };

        for ((alpha, _, _), res) in evals.into_iter().zip(results) {
            let Some((g_img, _, _)) = res else {
                continue;
            };

            if g_img.is_constant() {
                // the gcd of the primitive parts is trivial
                return trivial();
            }

            let img_shape: SmallVec<[E; INLINED_EXPONENTS]> = g_img.last_exponents().into();
            match &shape {
                Some(s) => match img_shape.as_slice().cmp(s.as_slice()) {
                    Ordering::Less => {
                        // all previous evaluation points were unlucky
                        debug!("unlucky evaluations detected: restarting interpolation");
                        points.clear();
                        images.clear();
                        prev_candidate = None;
                        shape = Some(img_shape);
                    }
                    Ordering::Greater => {
                        debug!("unlucky evaluation point: skipping");
                        continue;
                    }
                    Ordering::Equal => {}
                },
                None => shape = Some(img_shape),
            }

            let gval = eval_univariate(&gamma, x, &alpha);
            points.push(alpha);
            images.push(g_img.make_monic().mul_coeff(&gval));

            if points.len() > max_points {
                debug!("interpolation failed to converge");
                return None;
            }

            let candidate = interpolate(&points, &images, x);
            let stabilized = prev_candidate.as_ref() == Some(&candidate);
            prev_candidate = Some(candidate.clone());

            if stabilized {
                let cont = univariate_content(&candidate, x);
                let pp = candidate.try_div(&cont).unwrap().make_monic();

                if let Some(abar) = a.try_div(&pp) {
                    if let Some(bbar) = b.try_div(&pp) {
                        let g = &pp * &cg;
                        let ca_red = ca.try_div(&cg).unwrap();
                        let cb_red = cb.try_div(&cg).unwrap();
                        return Some((g, &abar * &ca_red, &bbar * &cb_red));
                    }
                }
            }
        }
    }
}

/// Reduce a stacked integer polynomial coefficient-wise into a flat image
/// over `Zp`, with the main variable as variable 0.
fn reduce_mainvar<E: Exponent>(a: &MainVarPoly<IntegerRing, E>, field: &Zp) -> ModPoly<E> {
    let nvars = a.nvars + 1;
    let mut res = ModPoly::new(nvars, *field, None);

    // iterate with increasing main exponent so the appends stay ordered
    for (e, c) in a.exps.iter().zip(&a.coeffs).rev() {
        for t in 0..c.nterms {
            let cf = c.coefficients[t].to_finite_field(field);
            if Zp::is_zero(&cf) {
                continue;
            }

            let mut exps: SmallVec<[E; INLINED_EXPONENTS]> = SmallVec::with_capacity(nvars);
            exps.push(E::from_u32(*e));
            exps.extend_from_slice(c.exponents(t));
            res.append_monomial(cf, &exps);
        }
    }
    res
}

/// Lift a flat image symmetrically into a stacked integer polynomial.
fn lift_image<E: Exponent>(img: &ModPoly<E>, field: &Zp) -> MainVarPoly<IntegerRing, E> {
    let nminor = img.nvars - 1;
    let mut res = MainVarPoly::new(nminor, Z);

    // group boundaries of the main exponent, scanning ascending
    let mut groups: Vec<(u32, usize, usize)> = vec![];
    for t in 0..img.nterms {
        let e = img.exponents(t)[0].to_u32();
        match groups.last_mut() {
            Some((ge, _, stop)) if *ge == e => *stop = t + 1,
            _ => groups.push((e, t, t + 1)),
        }
    }

    for (e, start, stop) in groups.into_iter().rev() {
        let mut c = ZPoly::new(nminor, Z, Some(stop - start));
        for t in start..stop {
            c.coefficients.push(field.to_symmetric_integer(&img.coefficients[t]));
            c.exponents.extend_from_slice(&img.exponents(t)[1..]);
            c.nterms += 1;
        }
        res.push(e, c);
    }
    res
}

/// Merge two coefficient polynomials term by term with Garner's two-modulus
/// combination; terms missing on either side contribute zero.
fn crt_combine_poly<E: Exponent>(
    a: Option<&ZPoly<E>>,
    m: &Integer,
    b: Option<&ZPoly<E>>,
    p: &Integer,
    nvars: usize,
) -> ZPoly<E> {
    let empty = ZPoly::new(nvars, Z, None);
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);

    let zero = Integer::zero();
    let mut res = ZPoly::new(nvars, Z, Some(a.nterms.max(b.nterms)));

    let mut i = 0;
    let mut j = 0;
    while i < a.nterms || j < b.nterms {
        let which = if i == a.nterms {
            Ordering::Greater
        } else if j == b.nterms {
            Ordering::Less
        } else {
            ZPoly::<E>::cmp_exponents(a.exponents(i), b.exponents(j))
        };

        let (exps, n1, n2) = match which {
            Ordering::Less => {
                let r = (a.exponents(i), &a.coefficients[i], &zero);
                i += 1;
                r
            }
            Ordering::Greater => {
                let r = (b.exponents(j), &zero, &b.coefficients[j]);
                j += 1;
                r
            }
            Ordering::Equal => {
                let r = (a.exponents(i), &a.coefficients[i], &b.coefficients[j]);
                i += 1;
                j += 1;
                r
            }
        };

        let c = Integer::chinese_remainder(n1, n2, m, p);
        if !c.is_zero() {
            res.coefficients.push(c);
            res.exponents.extend_from_slice(exps);
            res.nterms += 1;
        }
    }

    res
}

/// Combine an accumulator with modulus `m` and a freshly lifted image with
/// prime modulus `p` into the accumulator mod `m*p`.
fn crt_combine<E: Exponent>(
    acc: &MainVarPoly<IntegerRing, E>,
    m: &Integer,
    img: &MainVarPoly<IntegerRing, E>,
    p: &Integer,
) -> MainVarPoly<IntegerRing, E> {
    let mut res = MainVarPoly::new(acc.nvars, Z);

    let mut i = 0;
    let mut j = 0;
    while i < acc.len() || j < img.len() {
        let ei = acc.exps.get(i).copied();
        let ej = img.exps.get(j).copied();

        let (e, ca, cb) = match (ei, ej) {
            (Some(ei), Some(ej)) if ei == ej => {
                let r = (ei, Some(&acc.coeffs[i]), Some(&img.coeffs[j]));
                i += 1;
                j += 1;
                r
            }
            (Some(ei), Some(ej)) if ei > ej => {
                let r = (ei, Some(&acc.coeffs[i]), None);
                i += 1;
                r
            }
            (Some(_), Some(ej)) => {
                let r = (ej, None, Some(&img.coeffs[j]));
                j += 1;
                r
            }
            (Some(ei), None) => {
                let r = (ei, Some(&acc.coeffs[i]), None);
                i += 1;
                r
            }
            (None, Some(ej)) => {
                let r = (ej, None, Some(&img.coeffs[j]));
                j += 1;
                r
            }
            (None, None) => unreachable!(),
        };

        res.push(e, crt_combine_poly(ca, m, cb, p, acc.nvars));
    }

    res
}

/// The image shape: the main exponent, then the leading monomial of the
/// leading coefficient. The shape order detects unlucky primes (smaller
/// shape wins).
fn shape_cmp<E: Exponent>(
    a: &MainVarPoly<IntegerRing, E>,
    b: &MainVarPoly<IntegerRing, E>,
) -> Ordering {
    match a.degree().cmp(&b.degree()) {
        Ordering::Equal => a
            .leading_coeff()
            .last_exponents()
            .cmp(b.leading_coeff().last_exponents()),
        o => o,
    }
}

/// Compare an accumulator shape against a flat image's leading exponents.
fn shape_cmp_flat<E: Exponent>(acc: &MainVarPoly<IntegerRing, E>, img_lead: &[E]) -> Ordering {
    match acc.degree().cmp(&img_lead[0].to_u32()) {
        Ordering::Equal => acc.leading_coeff().last_exponents().cmp(&img_lead[1..]),
        o => o,
    }
}

/// State shared by all split masters.
struct SplitBase<'a, E: Exponent> {
    prime: &'a Mutex<u32>,
    gcd_is_one: &'a AtomicBool,
    gamma: &'a Integer,
    a: &'a MainVarPoly<IntegerRing, E>,
    b: &'a MainVarPoly<IntegerRing, E>,
    vars: &'a [usize],
}

/// One master's accumulated images.
struct SplitImage<E: Exponent> {
    g: MainVarPoly<IntegerRing, E>,
    abar: MainVarPoly<IntegerRing, E>,
    bbar: MainVarPoly<IntegerRing, E>,
    modulus: Integer,
    image_count: usize,
    required_images: usize,
}

/// Fetch fresh primes, compute modular images and CRT them into private
/// accumulators until the requested number of images is reached or the
/// prime pool is exhausted.
fn split_worker<E: Exponent>(
    base: &SplitBase<E>,
    required_images: usize,
    num_workers: usize,
) -> SplitImage<E> {
    let nminor = base.a.nvars;
    let mut out = SplitImage {
        g: MainVarPoly::new(nminor, Z),
        abar: MainVarPoly::new(nminor, Z),
        bbar: MainVarPoly::new(nminor, Z),
        modulus: Integer::one(),
        image_count: 0,
        required_images,
    };

    while out.image_count < out.required_images {
        let p = {
            let mut lock = base.prime.lock().unwrap();
            match next_prime(*lock) {
                Some(p) => {
                    *lock = p;
                    p
                }
                None => break,
            }
        };

        let field = Zp::new(p);

        // the reduction must kill neither lc(A) nor lc(B) entirely
        let gammap = base.gamma.to_finite_field(&field);
        if Zp::is_zero(&gammap) {
            debug!("prime {} divides gamma: skipping", p);
            continue;
        }

        let ap = reduce_mainvar(base.a, &field);
        let bp = reduce_mainvar(base.b, &field);
        debug_assert!(!ap.is_zero() && !bp.is_zero());

        let Some((gp, abarp, bbarp)) = gcd_brown_zp(&ap, &bp, base.vars, num_workers) else {
            debug!("modular gcd declined prime {}", p);
            continue;
        };

        if base.gcd_is_one.load(AtomicOrdering::Relaxed) {
            break;
        }

        if gp.is_constant() {
            debug!("image gcd is constant: gcd is one");
            base.gcd_is_one.store(true, AtomicOrdering::Relaxed);
            break;
        }

        if !out.modulus.is_one() {
            match shape_cmp_flat(&out.g, gp.last_exponents()) {
                Ordering::Less => {
                    // the new image has too much structure: unlucky prime
                    debug!("unlucky prime {}: skipping image", p);
                    continue;
                }
                Ordering::Greater => {
                    // everything accumulated so far was unlucky
                    debug!("smaller image shape found: resetting accumulator");
                    out.modulus = Integer::one();
                    out.image_count = 0;
                }
                Ordering::Equal => {}
            }
        }

        debug_assert!(field.is_one(&gp.lcoeff()));
        let gp = gp.mul_coeff(&gammap);

        let p_int = Integer::from(p);
        let g_lift = lift_image(&gp, &field);
        let abar_lift = lift_image(&abarp, &field);
        let bbar_lift = lift_image(&bbarp, &field);

        if out.modulus.is_one() {
            out.g = g_lift;
            out.abar = abar_lift;
            out.bbar = bbar_lift;
        } else {
            out.g = crt_combine(&out.g, &out.modulus, &g_lift, &p_int);
            out.abar = crt_combine(&out.abar, &out.modulus, &abar_lift, &p_int);
            out.bbar = crt_combine(&out.bbar, &out.modulus, &bbar_lift, &p_int);
        }

        out.modulus *= &p_int;
        out.image_count += 1;
    }

    out
}

/// The three descending exponent cursors of the join phase.
struct JoinCursors {
    g_exp: i64,
    abar_exp: i64,
    bbar_exp: i64,
}

/// State shared by all join workers.
struct JoinBase<'a, E: Exponent> {
    cursors: Mutex<JoinCursors>,
    prog: &'a CrtProgram,
    g_images: &'a [&'a MainVarPoly<IntegerRing, E>],
    abar_images: &'a [&'a MainVarPoly<IntegerRing, E>],
    bbar_images: &'a [&'a MainVarPoly<IntegerRing, E>],
    nvars: usize,
}

/// One join worker's private outputs and height accumulators.
struct JoinOutput<E: Exponent> {
    g: MainVarPoly<IntegerRing, E>,
    abar: MainVarPoly<IntegerRing, E>,
    bbar: MainVarPoly<IntegerRing, E>,
    gmax: Integer,
    gsum: Integer,
    abarmax: Integer,
    abarsum: Integer,
    bbarmax: Integer,
    bbarsum: Integer,
}

fn join_worker<E: Exponent>(base: &JoinBase<E>) -> JoinOutput<E> {
    let mut out = JoinOutput {
        g: MainVarPoly::new(base.nvars, Z),
        abar: MainVarPoly::new(base.nvars, Z),
        bbar: MainVarPoly::new(base.nvars, Z),
        gmax: Integer::zero(),
        gsum: Integer::zero(),
        abarmax: Integer::zero(),
        abarsum: Integer::zero(),
        bbarmax: Integer::zero(),
        bbarsum: Integer::zero(),
    };

    loop {
        // claim an exponent of G, Abar or Bbar, in that priority order
        let (which, exp) = {
            let mut cur = base.cursors.lock().unwrap();
            if cur.g_exp >= 0 {
                cur.g_exp -= 1;
                (0, (cur.g_exp + 1) as u32)
            } else if cur.abar_exp >= 0 {
                cur.abar_exp -= 1;
                (1, (cur.abar_exp + 1) as u32)
            } else if cur.bbar_exp >= 0 {
                cur.bbar_exp -= 1;
                (2, (cur.bbar_exp + 1) as u32)
            } else {
                return out;
            }
        };

        match which {
            0 => crt_exp(
                base.prog,
                &mut out.gmax,
                &mut out.gsum,
                &mut out.g,
                exp,
                base.g_images,
            ),
            1 => crt_exp(
                base.prog,
                &mut out.abarmax,
                &mut out.abarsum,
                &mut out.abar,
                exp,
                base.abar_images,
            ),
            _ => crt_exp(
                base.prog,
                &mut out.bbarmax,
                &mut out.bbarsum,
                &mut out.bbar,
                exp,
                base.bbar_images,
            ),
        }
    }
}

/// Concatenate the workers' partial outputs by decreasing exponent. The
/// parts have disjoint exponent sets, so this is a top-level merge; the
/// coefficients are swapped out of the parts.
fn final_join<E: Exponent>(
    parts: &mut [MainVarPoly<IntegerRing, E>],
    nvars: usize,
) -> MainVarPoly<IntegerRing, E> {
    let mut res = MainVarPoly::new(nvars, Z);
    let mut starts = vec![0usize; parts.len()];

    loop {
        let mut max_pos = None;
        let mut max_exp = 0;
        for (i, p) in parts.iter().enumerate() {
            if starts[i] < p.len() && (max_pos.is_none() || p.exps[starts[i]] > max_exp) {
                max_pos = Some(i);
                max_exp = p.exps[starts[i]];
            }
        }

        let Some(i) = max_pos else {
            break;
        };

        let c = std::mem::replace(&mut parts[i].coeffs[starts[i]], ZPoly::new(nvars, Z, None));
        res.push(max_exp, c);
        starts[i] += 1;
    }

    res
}

/// A reduced non-negative fraction; the thread-budget divider hands out
/// `num` required images over `den` threads per master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub num: i64,
    pub den: i64,
}

impl Fraction {
    pub fn new(num: i64, den: i64) -> Fraction {
        debug_assert!(den > 0 && num >= 0);
        let mut g = Integer::from(num).gcd(&Integer::from(den)).to_i64().unwrap();
        if g == 0 {
            g = 1;
        }
        Fraction {
            num: num / g,
            den: den / g,
        }
    }

    fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

fn invmod_i64(a: i64, m: i64) -> Option<i64> {
    let (mut t, mut newt) = (0i64, 1i64);
    let (mut r, mut newr) = (m, a);
    while newr != 0 {
        let q = r / newr;
        (t, newt) = (newt, t - q * newt);
        (r, newr) = (newr, r - q * newr);
    }
    if r != 1 {
        None
    } else {
        Some(t.rem_euclid(m))
    }
}

/// The Stern-Brocot neighbors of a reduced fraction with denominator at
/// least 2: `left < f < right`, both with smaller denominators, and `f`
/// the mediant of the two.
pub fn farey_neighbors(f: &Fraction) -> Option<(Fraction, Fraction)> {
    if f.den < 2 {
        return None;
    }

    let inv = invmod_i64(f.num.rem_euclid(f.den), f.den)?;
    let d = f.den - inv;
    let c = (f.num * d + 1) / f.den;

    Some((
        Fraction {
            num: f.num - c,
            den: f.den - d,
        },
        Fraction { num: c, den: d },
    ))
}

/// Choose `1 <= l <= min(n, m)` fractions `a_i/b_i` with `sum a_i = n`,
/// `sum b_i = m`: master `i` computes `a_i` images with `b_i` threads.
/// Fractions are split at their Farey neighbors while the right neighbor
/// stays under `1.1*n/m`, which keeps all loads within 10% of the ideal
/// ratio.
pub fn divide_master_threads(n: i64, m: i64) -> Vec<Fraction> {
    debug_assert!(n > 0 && m > 0);

    let score_threshold = 1.1 * n as f64 / m as f64;

    let l = Integer::from(n).gcd(&Integer::from(m)).to_i64().unwrap();
    let mut v = vec![Fraction::new(n, m); l as usize];

    let mut i = 0;
    while i < v.len() {
        if v[i].den >= 2 {
            if let Some((left, right)) = farey_neighbors(&v[i]) {
                if right.to_f64() < score_threshold {
                    v[i] = right;
                    v.push(left);
                    continue;
                }
            }
        }
        i += 1;
    }

    v
}

/// The variables occurring in either input, as indices of the flat modular
/// image: 0 is the main variable, minor variable `i` becomes `i + 1`.
fn active_vars<E: Exponent>(
    a: &MainVarPoly<IntegerRing, E>,
    b: &MainVarPoly<IntegerRing, E>,
) -> Vec<usize> {
    let nminor = a.nvars;
    let mut occupied = vec![false; nminor];
    for p in [a, b] {
        for c in &p.coeffs {
            for t in 0..c.nterms {
                for (o, e) in occupied.iter_mut().zip(c.exponents(t)) {
                    *o |= !e.is_zero();
                }
            }
        }
    }

    let mut vars = vec![0];
    vars.extend((0..nminor).filter(|i| occupied[*i]).map(|i| i + 1));
    vars
}

/// Compute `(gcd(a, b), a/gcd, b/gcd)` for nonzero stacked polynomials by
/// Brown's modular algorithm with `num_workers + 1` threads. Returns
/// `None` when the word-sized prime pool is exhausted before the result
/// can be certified.
pub fn gcd_brown_mainvar<E: Exponent>(
    mut a: MainVarPoly<IntegerRing, E>,
    mut b: MainVarPoly<IntegerRing, E>,
    num_workers: usize,
) -> Option<(
    MainVarPoly<IntegerRing, E>,
    MainVarPoly<IntegerRing, E>,
    MainVarPoly<IntegerRing, E>,
)> {
    debug_assert!(!a.is_zero() && !b.is_zero());
    debug_assert_eq!(a.nvars, b.nvars);

    let num_threads = (num_workers + 1) as i64;
    let nminor = a.nvars;

    // remove the integer contents
    let ca = a.content();
    let cb = b.content();
    let cg = ca.gcd(&cb);
    let cabar = &ca / &cg;
    let cbbar = &cb / &cg;
    a.div_coeff(&ca);
    b.div_coeff(&cb);

    let gamma = a.lcoeff_scalar().gcd(&b.lcoeff_scalar());

    let vars = active_vars(&a, &b);

    // initial bound on the target modulus: 2*gamma*max(height(A), height(B))
    let mut bound = a.height();
    let hb = b.height();
    if bound < hb {
        bound = hb;
    }
    bound = &bound * &gamma;
    bound = &bound + &bound;

    let prime = Mutex::new(PRIME_FLOOR);
    let gcd_is_one = AtomicBool::new(false);

    let mut modulus = Integer::one();
    let mut g = MainVarPoly::new(nminor, Z);
    let mut abar = MainVarPoly::new(nminor, Z);
    let mut bbar = MainVarPoly::new(nminor, Z);

    loop {
        gcd_is_one.store(false, AtomicOrdering::Relaxed);

        // the number of fresh images needed to pass the bound
        let temp = &bound.div_ceil(&modulus) + &Integer::from(2);
        let pbase = *prime.lock().unwrap();
        let required = temp.clog(pbase).max(1);

        let fractions = divide_master_threads(required as i64, num_threads);
        debug!(
            "split: {} images over {} masters, modulus {} bits",
            required,
            fractions.len(),
            modulus.bit_length()
        );

        let base = SplitBase {
            prime: &prime,
            gcd_is_one: &gcd_is_one,
            gamma: &gamma,
            a: &a,
            b: &b,
            vars: &vars,
        };

        let results: Vec<SplitImage<E>> = std::thread::scope(|s| {
            let handles: Vec<_> = fractions[1..]
                .iter()
                .map(|f| {
                    let base = &base;
                    s.spawn(move || {
                        split_worker(base, f.num as usize, (f.den - 1) as usize)
                    })
                })
                .collect();

            let first = split_worker(
                &base,
                fractions[0].num as usize,
                (fractions[0].den - 1) as usize,
            );

            let mut v = vec![first];
            for h in handles {
                v.push(h.join().unwrap());
            }
            v
        });

        if gcd_is_one.load(AtomicOrdering::Relaxed) {
            let mut one = a.one();
            one.mul_coeff(&cg);
            a.mul_coeff(&cabar);
            b.mul_coeff(&cbbar);
            return Some((one, a, b));
        }

        // every master must have reached its goal
        if results.iter().any(|r| r.image_count < r.required_images) {
            debug!("ran out of primes");
            return None;
        }

        // gather the images to join, applying the smaller-shape-wins rule;
        // the previous iteration's accumulator takes part as well
        let (new_g, new_abar, new_bbar, new_modulus, heights) = {
            let mut gathered: Vec<(
                &MainVarPoly<IntegerRing, E>,
                &MainVarPoly<IntegerRing, E>,
                &MainVarPoly<IntegerRing, E>,
                &Integer,
            )> = vec![];

            if !modulus.is_one() {
                gathered.push((&g, &abar, &bbar, &modulus));
            }

            for r in results.iter() {
                if r.image_count == 0 {
                    continue;
                }

                if gathered.is_empty() {
                    gathered.push((&r.g, &r.abar, &r.bbar, &r.modulus));
                    continue;
                }

                match shape_cmp(gathered[0].0, &r.g) {
                    Ordering::Less => {
                        // this master was unlucky: ignore it
                    }
                    o => {
                        if o == Ordering::Greater {
                            // everything gathered so far was unlucky
                            gathered.clear();
                        }
                        gathered.push((&r.g, &r.abar, &r.bbar, &r.modulus));
                    }
                }
            }

            let moduli: Vec<Integer> = gathered.iter().map(|t| t.3.clone()).collect();
            let prog = CrtProgram::precompute(&moduli);
            if !prog.is_good() {
                // cannot happen for distinct word primes
                return None;
            }

            let g_images: Vec<_> = gathered.iter().map(|t| t.0).collect();
            let abar_images: Vec<_> = gathered.iter().map(|t| t.1).collect();
            let bbar_images: Vec<_> = gathered.iter().map(|t| t.2).collect();

            let joinbase = JoinBase {
                cursors: Mutex::new(JoinCursors {
                    g_exp: g_images[0].degree() as i64,
                    abar_exp: abar_images[0].degree() as i64,
                    bbar_exp: bbar_images[0].degree() as i64,
                }),
                prog: &prog,
                g_images: &g_images,
                abar_images: &abar_images,
                bbar_images: &bbar_images,
                nvars: nminor,
            };

            let mut outputs: Vec<JoinOutput<E>> = std::thread::scope(|s| {
                let handles: Vec<_> = (1..num_threads)
                    .map(|_| {
                        let jb = &joinbase;
                        s.spawn(move || join_worker(jb))
                    })
                    .collect();

                let first = join_worker(&joinbase);
                let mut v = vec![first];
                for h in handles {
                    v.push(h.join().unwrap());
                }
                v
            });

            // aggregate the heights
            let mut gnm = Integer::zero();
            let mut gns = Integer::zero();
            let mut anm = Integer::zero();
            let mut ans = Integer::zero();
            let mut bnm = Integer::zero();
            let mut bns = Integer::zero();
            for o in &outputs {
                gns += &o.gsum;
                ans += &o.abarsum;
                bns += &o.bbarsum;
                if gnm < o.gmax {
                    gnm = o.gmax.clone();
                }
                if anm < o.abarmax {
                    anm = o.abarmax.clone();
                }
                if bnm < o.bbarmax {
                    bnm = o.bbarmax.clone();
                }
            }

            let mut g_parts: Vec<_> = outputs.iter_mut().map(|o| std::mem::replace(&mut o.g, MainVarPoly::new(nminor, Z))).collect();
            let mut abar_parts: Vec<_> = outputs.iter_mut().map(|o| std::mem::replace(&mut o.abar, MainVarPoly::new(nminor, Z))).collect();
            let mut bbar_parts: Vec<_> = outputs.iter_mut().map(|o| std::mem::replace(&mut o.bbar, MainVarPoly::new(nminor, Z))).collect();

            let new_g = final_join(&mut g_parts, nminor);
            let new_abar = final_join(&mut abar_parts, nminor);
            let new_bbar = final_join(&mut bbar_parts, nminor);

            let mut new_modulus = Integer::one();
            for m in &moduli {
                new_modulus *= m;
            }

            (new_g, new_abar, new_bbar, new_modulus, (gnm, gns, anm, ans, bnm, bns))
        };

        g = new_g;
        abar = new_abar;
        bbar = new_bbar;
        modulus = new_modulus;

        // only try the divisibility check once the modulus exceeds the bound
        if modulus <= bound {
            continue;
        }

        let (gnm, gns, anm, ans, bnm, bns) = heights;
        let mut ans = &ans * &gnm;
        let mut anm = &anm * &gns;
        let mut bns = &bns * &gnm;
        let mut bnm = &bnm * &gns;
        if ans > anm {
            std::mem::swap(&mut ans, &mut anm);
        }
        if bns > bnm {
            std::mem::swap(&mut bns, &mut bnm);
        }
        ans = &ans + &ans;
        bns = &bns + &bns;

        if ans < modulus && bns < modulus {
            break;
        }

        // heuristic bound insufficient: quadruple it in the word-bit sense
        debug!("divisibility check failed: increasing bound");
        bound = modulus.shl(64);
    }

    debug_assert!(g.lcoeff_scalar() == gamma);

    let gcont = g.content();
    g.div_coeff(&gcont);
    let lcg = g.lcoeff_scalar();
    abar.div_coeff(&lcg);
    bbar.div_coeff(&lcg);

    g.mul_coeff(&cg);
    abar.mul_coeff(&cabar);
    bbar.mul_coeff(&cbbar);

    Some((g, abar, bbar))
}

/// Pseudo-remainder of dense integer polynomials: scale `a` by powers of
/// `lc(b)` so every division step is exact.
fn pseudo_rem(a: &[Integer], b: &[Integer]) -> Vec<Integer> {
    debug_assert!(!b.is_empty());

    let lb = b.last().unwrap();
    let mut r = a.to_vec();

    while r.len() >= b.len() {
        let lr = r.last().unwrap().clone();
        for c in &mut r {
            *c *= lb;
        }

        let shift = r.len() - b.len();
        for (i, bc) in b.iter().enumerate() {
            let t = bc * &lr;
            r[shift + i] -= &t;
        }

        debug_assert!(r.last().unwrap().is_zero());
        while r.last().map(|c| c.is_zero()).unwrap_or(false) {
            r.pop();
        }
    }

    r
}

fn dense_content(c: &[Integer]) -> Integer {
    let mut g = Integer::zero();
    for x in c {
        if g.is_one() {
            break;
        }
        g = g.gcd(x);
    }
    g
}

/// The gcd of two univariate integer polynomials by the primitive
/// pseudo-remainder sequence.
fn univariate_integer_gcd<E: Exponent>(a: &ZPoly<E>, b: &ZPoly<E>) -> ZPoly<E> {
    debug_assert!(!a.is_zero() && !b.is_zero());

    let x = 0;
    let cg = a.content().gcd(&b.content());

    let make_primitive = |mut v: Vec<Integer>| {
        let c = dense_content(&v);
        for x in &mut v {
            let (q, r) = x.quot_rem(&c);
            debug_assert!(r.is_zero());
            *x = q;
        }
        v
    };

    let mut u = make_primitive(a.to_dense_integer(x));
    let mut v = make_primitive(b.to_dense_integer(x));
    if u.len() < v.len() {
        std::mem::swap(&mut u, &mut v);
    }

    loop {
        let r = pseudo_rem(&u, &v);
        if r.is_empty() {
            break;
        }
        u = v;
        v = make_primitive(r);
    }

    // restore the content and normalize the sign
    let mut res = a.new_from(Some(v.len()));
    let negate = v.last().unwrap().is_negative();
    let mut e: SmallVec<[E; INLINED_EXPONENTS]> = smallvec::smallvec![E::zero(); a.nvars];
    for (i, c) in v.into_iter().enumerate() {
        let c = if negate { -&c } else { c };
        e[x] = E::from_u32(i as u32);
        res.append_monomial(&c * &cg, &e);
    }
    res
}

impl<E: Exponent> ZPoly<E> {
    /// The dense coefficient vector in the single variable `x`.
    fn to_dense_integer(&self, x: usize) -> Vec<Integer> {
        let mut coeffs = vec![Integer::zero(); self.degree(x).to_u32() as usize + 1];
        for t in 0..self.nterms {
            coeffs[self.exponents(t)[x].to_u32() as usize] = self.coefficients[t].clone();
        }
        coeffs
    }

    fn normalize_sign(self) -> Self {
        if !self.is_zero() && self.lcoeff().is_negative() {
            -self
        } else {
            self
        }
    }

    /// Compute the GCD of two integer polynomials with Brown's parallel
    /// modular algorithm, using at most `thread_limit` threads. Returns
    /// `None` when the inputs cannot be handled (degrees too large for the
    /// exponent type, or the word-sized prime pool was exhausted).
    ///
    /// The leading coefficient of the result is non-negative.
    pub fn gcd_brown(&self, other: &Self, thread_limit: usize) -> Option<Self> {
        debug_assert_eq!(self.nvars, other.nvars);

        if self.is_zero() {
            return Some(other.clone().normalize_sign());
        }
        if other.is_zero() {
            return Some(self.clone().normalize_sign());
        }

        // interpolation intermediates scale like gamma*G, so the doubled
        // degree must stay representable
        let maxdeg = self.max_degree().to_u32().max(other.max_degree().to_u32());
        if maxdeg > E::max_value() / 2 {
            return None;
        }

        if self.nvars == 0 || self.is_constant() || other.is_constant() {
            let c = self.content().gcd(&other.content());
            return Some(self.new_from_constant(c));
        }

        if self.nvars == 1 {
            return Some(univariate_integer_gcd(self, other));
        }

        let threads = thread_limit
            .max(1)
            .min(std::thread::available_parallelism().map(|t| t.get()).unwrap_or(1));

        let au = MainVarPoly::from_polynomial(self);
        let bu = MainVarPoly::from_polynomial(other);

        let (gu, _, _) = gcd_brown_mainvar(au, bu, threads - 1)?;
        Some(gu.to_polynomial().normalize_sign())
    }
}

#[cfg(test)]
mod test {
    use crate::domains::finite_field::Zp;
    use crate::domains::integer::{Integer, Z};
    use crate::poly::mainvar::MainVarPoly;
    use crate::poly::polynomial::MultivariatePolynomial;

    use super::{divide_master_threads, farey_neighbors, gcd_brown_zp, Fraction};

    #[test]
    fn farey() {
        let (l, r) = farey_neighbors(&Fraction::new(5, 8)).unwrap();
        assert_eq!(l, Fraction::new(3, 5));
        assert_eq!(r, Fraction::new(2, 3));

        // the mediant identity
        assert_eq!(l.num + r.num, 5);
        assert_eq!(l.den + r.den, 8);

        let (l, r) = farey_neighbors(&Fraction::new(1, 2)).unwrap();
        assert_eq!(l, Fraction::new(0, 1));
        assert_eq!(r, Fraction::new(1, 1));

        // improper fractions live in the same tree
        let (l, r) = farey_neighbors(&Fraction::new(3, 2)).unwrap();
        assert_eq!(l, Fraction::new(1, 1));
        assert_eq!(r, Fraction::new(2, 1));

        assert!(farey_neighbors(&Fraction::new(3, 1)).is_none());
    }

    #[test]
    fn divider_example() {
        // 10 images over 16 threads settles at 4 x 2/3 + 2 x 1/2
        let v = divide_master_threads(10, 16);
        let mut counts = std::collections::HashMap::new();
        for f in &v {
            *counts.entry((f.num, f.den)).or_insert(0) += 1;
        }
        assert_eq!(counts.get(&(2, 3)), Some(&4));
        assert_eq!(counts.get(&(1, 2)), Some(&2));
    }

    #[test]
    fn divider_invariants() {
        for n in 1..=12i64 {
            for m in 1..=8i64 {
                let v = divide_master_threads(n, m);
                assert!(!v.is_empty());
                assert!(v.len() as i64 <= n.min(m));
                assert_eq!(v.iter().map(|f| f.num).sum::<i64>(), n);
                assert_eq!(v.iter().map(|f| f.den).sum::<i64>(), m);

                let threshold = 1.1 * n as f64 / m as f64;
                for f in &v {
                    assert!(f.num as f64 / f.den as f64 <= threshold + 1e-9);
                    assert!(f.den >= 1);
                }
            }
        }
    }

    fn zp_poly(field: Zp, nvars: usize, terms: &[(u32, &[u16])]) -> MultivariatePolynomial<Zp, u16> {
        let mut p = MultivariatePolynomial::new(nvars, field, None);
        for (c, e) in terms {
            p.append_monomial(field.to_element(*c), *e);
        }
        p
    }

    #[test]
    fn modular_gcd_trivariate() {
        let field = Zp::new(1073741827);

        // g = X*y + z + 3, a = g*(X + y*z + 2), b = g*(X*z + y + 5)
        let g = zp_poly(field, 3, &[(1, &[1, 1, 0]), (1, &[0, 0, 1]), (3, &[0, 0, 0])]);
        let p1 = zp_poly(field, 3, &[(1, &[1, 0, 0]), (1, &[0, 1, 1]), (2, &[0, 0, 0])]);
        let p2 = zp_poly(field, 3, &[(1, &[1, 0, 1]), (1, &[0, 1, 0]), (5, &[0, 0, 0])]);

        let a = &g * &p1;
        let b = &g * &p2;

        let (gg, abar, bbar) = gcd_brown_zp(&a, &b, &[0, 1, 2], 0).unwrap();
        assert_eq!(gg, g);
        assert_eq!(&gg * &abar, a);
        assert_eq!(&gg * &bbar, b);
    }

    #[test]
    fn modular_gcd_coprime() {
        let field = Zp::new(1073741827);

        let a = zp_poly(field, 2, &[(1, &[2, 0]), (1, &[0, 0])]);
        let b = zp_poly(field, 2, &[(1, &[1, 1]), (2, &[0, 0])]);

        let (gg, abar, bbar) = gcd_brown_zp(&a, &b, &[0, 1], 0).unwrap();
        assert!(gg.is_constant());
        assert_eq!(abar, a);
        assert_eq!(bbar, b);
    }

    #[test]
    fn modular_gcd_parallel_matches_serial(){
        let field = Zp::new(1073741827);

        let g = zp_poly(field, 3, &[(1, &[2, 1, 0]), (7, &[0, 1, 1]), (3, &[0, 0, 0])]);
        let p1 = zp_poly(field, 3, &[(1, &[2, 0, 0]), (1, &[0, 2, 1]), (2, &[0, 0, 0])]);
        let p2 = zp_poly(field, 3, &[(1, &[1, 0, 2]), (1, &[0, 1, 0]), (5, &[0, 0, 0])]);

        let a = &g * &p1;
        let b = &g * &p2;

        let (g0, _, _) = gcd_brown_zp(&a, &b, &[0, 1, 2], 0).unwrap();
        let (g3, _, _) = gcd_brown_zp(&a, &b, &[0, 1, 2], 3).unwrap();
        assert_eq!(g0, g3);
    }

    #[test]
    fn univariate_integer() {
        // a = 3*(x+1)*(x-2), b = 5*(x+1)*(x+3) -> gcd = x + 1
        let mut a = MultivariatePolynomial::<_, u16>::new(1, Z, None);
        a.append_monomial(Integer::from(3), &[2]);
        a.append_monomial(Integer::from(-3), &[1]);
        a.append_monomial(Integer::from(-6), &[0]);

        let mut b = MultivariatePolynomial::<_, u16>::new(1, Z, None);
        b.append_monomial(Integer::from(5), &[2]);
        b.append_monomial(Integer::from(20), &[1]);
        b.append_monomial(Integer::from(15), &[0]);

        let g = a.gcd_brown(&b, 1).unwrap();

        let mut expected = MultivariatePolynomial::<_, u16>::new(1, Z, None);
        expected.append_monomial(Integer::from(1), &[1]);
        expected.append_monomial(Integer::from(1), &[0]);
        assert_eq!(g, expected);
    }

    #[test]
    fn reduce_lift_roundtrip() {
        let mut p = MultivariatePolynomial::<_, u16>::new(2, Z, None);
        p.append_monomial(Integer::from(7), &[2, 1]);
        p.append_monomial(Integer::from(-11), &[1, 0]);
        p.append_monomial(Integer::from(2), &[0, 2]);

        let u = MainVarPoly::from_polynomial(&p);
        let field = Zp::new(1073741827);
        let img = super::reduce_mainvar(&u, &field);
        let lifted = super::lift_image(&img, &field);

        assert_eq!(lifted, u);
    }

    #[test]
    fn crt_combine_two_primes() {
        let f1 = Zp::new(1073741827);
        let f2 = Zp::new(crate::domains::finite_field::next_prime(1073741827).unwrap());

        let mut p = MultivariatePolynomial::<_, u16>::new(1, Z, None);
        p.append_monomial(Integer::from(123456789), &[1]);
        p.append_monomial(Integer::from(-987654321), &[0]);
        let u = MainVarPoly::from_polynomial(&p);

        let l1 = super::lift_image(&super::reduce_mainvar(&u, &f1), &f1);
        let l2 = super::lift_image(&super::reduce_mainvar(&u, &f2), &f2);

        let m1 = Integer::from(f1.get_prime());
        let m2 = Integer::from(f2.get_prime());
        let combined = super::crt_combine(&l1, &m1, &l2, &m2);

        // the product modulus is large enough for exact reconstruction
        assert_eq!(combined, u);
    }
}
