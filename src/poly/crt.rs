//! A compiled Chinese-remainder reconstruction: a straight-line program of
//! combine instructions over a balanced tree of pairwise-coprime moduli,
//! precomputed once and executed many times with caller-owned scratch.

use std::cmp::Ordering;

use tracing::debug;

use crate::domains::integer::{Integer, IntegerRing, Z};

use super::mainvar::MainVarPoly;
use super::polynomial::MultivariatePolynomial;
use super::Exponent;

/// Where an instruction operand is read from: a caller input residue or an
/// intermediate slot in the scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrtOperand {
    Input(usize),
    Slot(usize),
}

/// A single combine step `slot[res] = B + I*(C - B) mods M`, where `I` is
/// the idempotent of the left subtree and `M` the product of all moduli in
/// both subtrees.
#[derive(Debug)]
struct CrtInstruction {
    res: usize,
    b: CrtOperand,
    c: CrtOperand,
    idem: Integer,
    modulus: Integer,
}

/// A compiled CRT program. Build it once with [CrtProgram::precompute];
/// every concurrent evaluation gets its own scratch from
/// [CrtProgram::scratch], so one program serves many threads.
#[derive(Debug)]
pub struct CrtProgram {
    instructions: Vec<CrtInstruction>,
    num_inputs: usize,
    local_size: usize,
    temp1: usize,
    temp2: usize,
    good: bool,
}

impl CrtProgram {
    /// Compile a program for the given moduli. When some pair of moduli is
    /// not coprime (or a modulus is zero), the program is marked bad and
    /// cleared; [CrtProgram::is_good] reports the outcome.
    pub fn precompute(moduli: &[Integer]) -> CrtProgram {
        assert!(!moduli.is_empty());

        let mut prog = CrtProgram {
            instructions: Vec::with_capacity(moduli.len().saturating_sub(1).max(1)),
            num_inputs: moduli.len(),
            local_size: 1,
            temp1: 0,
            temp2: 0,
            good: true,
        };

        // sorting by size balances the multiplication depth when the
        // subtrees are grouped by total bits
        let mut perm: Vec<(usize, u32)> = moduli
            .iter()
            .enumerate()
            .map(|(i, m)| (i, m.bit_length()))
            .collect();
        perm.sort_by_key(|(_, bits)| *bits);

        if moduli.len() == 1 {
            // output[0] = input[0] + 0*(input[0] - input[0]) mod moduli[0]
            prog.instructions.push(CrtInstruction {
                res: 0,
                b: CrtOperand::Input(0),
                c: CrtOperand::Input(0),
                idem: Integer::zero(),
                modulus: moduli[0].clone(),
            });
            prog.good = !moduli[0].is_zero();
        } else {
            prog.push_combine(moduli, &perm, 0, 0, moduli.len());
        }

        if !prog.good {
            debug!("moduli not pairwise coprime: clearing CRT program");
            prog.instructions.clear();
        }

        // two extra spots for the runner's temporaries
        prog.temp1 = prog.local_size;
        prog.temp2 = prog.local_size + 1;
        prog.local_size += 2;

        prog
    }

    /// Combine all moduli in `perm[start..stop)`, writing the subtree
    /// result to slot `ret_idx`. Returns the index of the emitted
    /// instruction.
    fn push_combine(
        &mut self,
        moduli: &[Integer],
        perm: &[(usize, u32)],
        ret_idx: usize,
        start: usize,
        stop: usize,
    ) -> usize {
        debug_assert!(start + 1 < stop);

        let mut mid = start + (stop - start) / 2;

        let mut lefttot: u64 = perm[start..mid].iter().map(|(_, b)| *b as u64).sum();
        let mut righttot: u64 = perm[mid..stop].iter().map(|(_, b)| *b as u64).sum();

        // balance the total bits on the left and right
        while lefttot < righttot
            && mid + 1 < stop
            && (perm[mid].1 as u64) < righttot - lefttot
        {
            lefttot += perm[mid].1 as u64;
            righttot -= perm[mid].1 as u64;
            mid += 1;
        }

        if self.local_size < 1 + ret_idx {
            self.local_size = 1 + ret_idx;
        }

        let (b, left_modulus) = if start + 1 < mid {
            let leftret = self.push_combine(moduli, perm, ret_idx + 1, start, mid);
            if !self.good {
                return 0;
            }
            let m = self.instructions[leftret].modulus.clone();
            (CrtOperand::Slot(ret_idx + 1), m)
        } else {
            (CrtOperand::Input(perm[start].0), moduli[perm[start].0].clone())
        };

        let (c, right_modulus) = if mid + 1 < stop {
            let rightret = self.push_combine(moduli, perm, ret_idx + 2, mid, stop);
            if !self.good {
                return 0;
            }
            let m = self.instructions[rightret].modulus.clone();
            (CrtOperand::Slot(ret_idx + 2), m)
        } else {
            (CrtOperand::Input(perm[mid].0), moduli[perm[mid].0].clone())
        };

        if left_modulus.is_zero() || right_modulus.is_zero() {
            self.good = false;
            return 0;
        }

        let inv = match left_modulus.invmod(&right_modulus) {
            Some(inv) => inv,
            None => {
                self.good = false;
                return 0;
            }
        };

        self.instructions.push(CrtInstruction {
            res: ret_idx,
            b,
            c,
            idem: &left_modulus * &inv,
            modulus: &left_modulus * &right_modulus,
        });

        self.instructions.len() - 1
    }

    #[inline]
    pub fn is_good(&self) -> bool {
        self.good
    }

    #[inline]
    pub fn num_instructions(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    pub fn local_size(&self) -> usize {
        self.local_size
    }

    /// Allocate a scratch buffer for [CrtProgram::run]. Each concurrent
    /// evaluation needs its own.
    pub fn scratch(&self) -> Vec<Integer> {
        vec![Integer::zero(); self.local_size]
    }

    /// Evaluate the program: afterwards `scratch[0]` is the unique `r` with
    /// `r = inputs[i] mod moduli[i]` for all `i` and `|r| <= (prod m_i)/2`
    /// (the symmetric representative, upper boundary included).
    pub fn run(&self, scratch: &mut [Integer], inputs: &[&Integer]) {
        debug_assert!(self.good);
        debug_assert!(scratch.len() >= self.local_size);
        debug_assert_eq!(inputs.len(), self.num_inputs);
        debug_assert_eq!(self.temp2, self.temp1 + 1);

        let (slots, temps) = scratch.split_at_mut(self.temp1);
        let (t1, t2) = temps.split_at_mut(1);
        let t1 = &mut t1[0];
        let t2 = &mut t2[0];

        for (n, ins) in self.instructions.iter().enumerate() {
            {
                let b = match ins.b {
                    CrtOperand::Input(i) => inputs[i],
                    CrtOperand::Slot(s) => &slots[s],
                };
                let c = match ins.c {
                    CrtOperand::Input(i) => inputs[i],
                    CrtOperand::Slot(s) => &slots[s],
                };

                // res = B + I*(C - B) = B - I*(B - C)
                *t1 = b - c;
                *t2 = &ins.idem * &*t1;
                *t1 = b - &*t2;
            }

            slots[ins.res] = t1.symmetric_mod(&ins.modulus);

            // the last instruction writes the answer to slot 0
            debug_assert!(n + 1 < self.instructions.len() || ins.res == 0);
        }
    }
}

/// Merge `inputs` term by term into `out`: per output monomial the largest
/// exponent vector among the unscanned heads is selected, the aligned
/// coefficients (zero where a polynomial lacks the monomial) are fed to the
/// CRT program, and nonzero results are emitted. `max` and `sum` accumulate
/// the largest absolute result and the sum of absolute results.
pub fn crt_polynomial<E: Exponent>(
    prog: &CrtProgram,
    max: &mut Integer,
    sum: &mut Integer,
    out: &mut MultivariatePolynomial<IntegerRing, E>,
    inputs: &[&MultivariatePolynomial<IntegerRing, E>],
) {
    let count = inputs.len();
    debug_assert!(count > 0);

    let zero = Integer::zero();
    let mut scratch = prog.scratch();
    let mut residues: Vec<&Integer> = vec![&zero; count];
    let mut taken = vec![false; count];
    // start[k] counts consumed terms from the top of inputs[k]
    let mut start = vec![0usize; count];

    // terms are produced with decreasing exponents
    let mut rev_coeffs: Vec<Integer> = vec![];
    let mut rev_exps: Vec<E> = vec![];

    'merge: loop {
        for r in residues.iter_mut() {
            *r = &zero;
        }
        for t in taken.iter_mut() {
            *t = false;
        }

        // find a polynomial with terms left
        let mut k = 0;
        let mut cur: &[E] = loop {
            if k == count {
                break 'merge;
            }
            if start[k] < inputs[k].nterms {
                let head = inputs[k].nterms - 1 - start[k];
                break inputs[k].exponents(head);
            }
            k += 1;
        };

        residues[k] = &inputs[k].coefficients[inputs[k].nterms - 1 - start[k]];
        taken[k] = true;
        start[k] += 1;

        let mut j = k + 1;
        while j < count {
            if start[j] < inputs[j].nterms {
                let head = inputs[j].nterms - 1 - start[j];
                match MultivariatePolynomial::<IntegerRing, E>::cmp_exponents(
                    inputs[j].exponents(head),
                    cur,
                ) {
                    Ordering::Equal => {
                        residues[j] = &inputs[j].coefficients[head];
                        taken[j] = true;
                        start[j] += 1;
                    }
                    Ordering::Greater => {
                        // a later head is bigger: undo the previous consumes
                        for i in 0..j {
                            if taken[i] {
                                start[i] -= 1;
                                taken[i] = false;
                            }
                            residues[i] = &zero;
                        }

                        cur = inputs[j].exponents(head);
                        residues[j] = &inputs[j].coefficients[head];
                        taken[j] = true;
                        start[j] += 1;
                    }
                    Ordering::Less => {}
                }
            }
            j += 1;
        }

        prog.run(&mut scratch, &residues);
        let r = std::mem::replace(&mut scratch[0], Integer::zero());

        if !r.is_zero() {
            let abs = r.abs();
            *sum += &abs;
            if max.abs_cmp(&abs) == Ordering::Less {
                *max = abs;
            }

            rev_coeffs.push(r);
            rev_exps.extend_from_slice(cur);
        }
    }

    // restore the canonical ascending order
    let nvars = out.nvars;
    rev_coeffs.reverse();
    out.nterms = rev_coeffs.len();
    out.coefficients = rev_coeffs;
    out.exponents.clear();
    for chunk in rev_exps.chunks(nvars).rev() {
        out.exponents.extend_from_slice(chunk);
    }

    debug_assert!({
        out.check_consistency();
        true
    });
}

/// Append to `out` the merged CRT of the `X^exp` coefficients of the
/// images (zero where absent). The term is appended only when the merged
/// coefficient is nonzero.
pub fn crt_exp<E: Exponent>(
    prog: &CrtProgram,
    max: &mut Integer,
    sum: &mut Integer,
    out: &mut MainVarPoly<IntegerRing, E>,
    exp: u32,
    images: &[&MainVarPoly<IntegerRing, E>],
) {
    let zero_poly = MultivariatePolynomial::<IntegerRing, E>::new(out.nvars, Z, None);

    let coeffs: Vec<&MultivariatePolynomial<IntegerRing, E>> = images
        .iter()
        .map(|im| im.coefficient_of(exp).unwrap_or(&zero_poly))
        .collect();

    let mut merged = MultivariatePolynomial::new(out.nvars, Z, None);
    crt_polynomial(prog, max, sum, &mut merged, &coeffs);

    out.push(exp, merged);
}

#[cfg(test)]
mod test {
    use crate::domains::integer::{Integer, Z};
    use crate::poly::polynomial::MultivariatePolynomial;

    use super::{CrtProgram, crt_polynomial};

    fn moduli(m: &[i64]) -> Vec<Integer> {
        m.iter().map(|x| Integer::from(*x)).collect()
    }

    #[test]
    fn two_moduli() {
        // r = 2 mod 3, r = 3 mod 5 -> 8 = -7 in the symmetric range
        let prog = CrtProgram::precompute(&moduli(&[3, 5]));
        assert!(prog.is_good());

        let mut scratch = prog.scratch();
        let (r0, r1) = (Integer::from(2), Integer::from(3));
        prog.run(&mut scratch, &[&r0, &r1]);
        assert_eq!(scratch[0], -7);
    }

    #[test]
    fn three_moduli() {
        let m = moduli(&[7, 11, 13]);
        let prog = CrtProgram::precompute(&m);
        assert!(prog.is_good());
        assert_eq!(prog.num_instructions(), 2);

        let mut scratch = prog.scratch();
        let inputs = [Integer::from(1), Integer::from(2), Integer::from(3)];
        let refs: Vec<&Integer> = inputs.iter().collect();
        prog.run(&mut scratch, &refs);

        let r = scratch[0].clone();
        for (i, m) in m.iter().enumerate() {
            assert_eq!(r.symmetric_mod(m), inputs[i].symmetric_mod(m));
        }
        assert!(r.abs_cmp(&Integer::from(500)) != std::cmp::Ordering::Greater);
    }

    #[test]
    fn rerun_is_idempotent() {
        let prog = CrtProgram::precompute(&moduli(&[3, 5, 7, 11, 13, 17]));
        assert!(prog.is_good());

        let inputs: Vec<Integer> = (0..6).map(|i| Integer::from(i * 2 + 1)).collect();
        let refs: Vec<&Integer> = inputs.iter().collect();

        let mut s1 = prog.scratch();
        prog.run(&mut s1, &refs);

        // a different scratch buffer must give the same answer
        let mut s2 = prog.scratch();
        prog.run(&mut s2, &refs);
        assert_eq!(s1[0], s2[0]);

        // and rerunning on used scratch as well
        prog.run(&mut s1, &refs);
        assert_eq!(s1[0], s2[0]);
    }

    #[test]
    fn non_coprime_rejected() {
        let prog = CrtProgram::precompute(&moduli(&[6, 10]));
        assert!(!prog.is_good());
        assert_eq!(prog.num_instructions(), 0);
    }

    #[test]
    fn single_modulus() {
        let prog = CrtProgram::precompute(&moduli(&[15]));
        assert!(prog.is_good());

        let mut scratch = prog.scratch();
        let r = Integer::from(8);
        prog.run(&mut scratch, &[&r]);
        assert_eq!(scratch[0], -7);
    }

    #[test]
    fn large_set_slot_budget() {
        let mut m = vec![];
        let mut p = crate::domains::finite_field::PRIME_FLOOR;
        for _ in 0..20 {
            p = crate::domains::finite_field::next_prime(p).unwrap();
            m.push(Integer::from(p));
        }

        let prog = CrtProgram::precompute(&m);
        assert!(prog.is_good());
        assert_eq!(prog.num_instructions(), 19);

        let inputs: Vec<Integer> = (0..20).map(|i| Integer::from(i * i + 3)).collect();
        let refs: Vec<&Integer> = inputs.iter().collect();
        let mut scratch = prog.scratch();
        prog.run(&mut scratch, &refs);

        let r = scratch[0].clone();
        let mut prod = Integer::one();
        for (i, mi) in m.iter().enumerate() {
            assert_eq!(r.symmetric_mod(mi), inputs[i].symmetric_mod(mi));
            prod *= mi;
        }

        // |r| <= prod/2
        assert!((&r.abs() + &r.abs()).abs_cmp(&prod) != std::cmp::Ordering::Greater);
    }

    #[test]
    fn merged_polynomials() {
        // inputs with different monomial supports
        let prog = CrtProgram::precompute(&moduli(&[5, 7]));
        assert!(prog.is_good());

        let mut a = MultivariatePolynomial::<_, u16>::new(2, Z, None);
        a.append_monomial(Integer::from(2), &[2, 0]);
        a.append_monomial(Integer::from(1), &[0, 1]);

        let mut b = MultivariatePolynomial::<_, u16>::new(2, Z, None);
        b.append_monomial(Integer::from(3), &[2, 0]);
        b.append_monomial(Integer::from(4), &[1, 0]);

        let mut out = MultivariatePolynomial::<_, u16>::new(2, Z, None);
        let mut max = Integer::zero();
        let mut sum = Integer::zero();
        crt_polynomial(&prog, &mut max, &mut sum, &mut out, &[&a, &b]);

        // x^2: r = 2 mod 5, 3 mod 7 -> 17; x: r = 0 mod 5, 4 mod 7 -> -10;
        // y: r = 1 mod 5, 0 mod 7 -> -14
        let mut expected = MultivariatePolynomial::<_, u16>::new(2, Z, None);
        expected.append_monomial(Integer::from(17), &[2, 0]);
        expected.append_monomial(Integer::from(-10), &[1, 0]);
        expected.append_monomial(Integer::from(-14), &[0, 1]);
        assert_eq!(out, expected);

        assert_eq!(max, 17);
        assert_eq!(sum, Integer::from(17 + 10 + 14));
    }
}
