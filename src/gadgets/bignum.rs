//! 2048-bit naturals as 18 limbs of 120 bits and modular arithmetic over them.
//!
//! A product `a * b mod n` is witnessed as a quotient `q` and a remainder `r`. The circuit checks
//! the integer identity `a * b = q * n + r` limb-wise: the limb polynomials are multiplied by
//! evaluation at 35 points and the limb difference is pushed through a carry chain whose carries
//! are range checked.

use bellpepper_core::{
    boolean::AllocatedBit, ConstraintSystem, LinearCombination, SynthesisError, Variable,
};
use ff::PrimeField;
use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};

pub const LIMB_BITS: usize = 120;
pub const NUM_LIMBS: usize = 18;
pub const MODULUS_BITS: usize = 2048;
pub const PUBLIC_EXPONENT: u32 = 65537;

/// Bits of the reduction parameter shift: `redc = floor(2^REDC_SHIFT / n)`.
pub const REDC_SHIFT: usize = 2 * MODULUS_BITS + 4;

const PRODUCT_TERMS: usize = 2 * NUM_LIMBS - 1;
const CARRY_BITS: usize = 127;
const CARRY_OFFSET_BITS: usize = 126;

/// Field element for a non-negative integer smaller than the field modulus.
pub fn biguint_to_field<F: PrimeField>(value: &BigUint) -> F {
    let shift = F::from(u64::MAX) + F::ONE;
    value
        .to_u64_digits()
        .iter()
        .rev()
        .fold(F::ZERO, |acc, digit| acc * shift + F::from(*digit))
}

/// Little-endian 120-bit limbs of `value`, always [`NUM_LIMBS`] of them.
pub fn limbs_from_biguint(value: &BigUint) -> Vec<BigUint> {
    let mask = (BigUint::one() << LIMB_BITS) - BigUint::one();
    (0..NUM_LIMBS)
        .map(|i| (value >> (i * LIMB_BITS)) & &mask)
        .collect()
}

pub fn biguint_from_limbs(limbs: &[BigUint]) -> BigUint {
    limbs
        .iter()
        .rev()
        .fold(BigUint::zero(), |acc, limb| (acc << LIMB_BITS) + limb)
}

/// Bit width of limb `i` of a 2048-bit number. The top limb only carries 8 bits.
fn limb_width(i: usize) -> usize {
    (MODULUS_BITS - i * LIMB_BITS).min(LIMB_BITS)
}

/// A natural number below `2^2048` held as range-checked limbs.
#[derive(Clone)]
pub struct BigNat<F: PrimeField> {
    limbs: Vec<LinearCombination<F>>,
    value: Option<BigUint>,
}

impl<F: PrimeField> BigNat<F> {
    /// Allocates `value` limb by limb, decomposing every limb into bits.
    pub fn alloc<CS: ConstraintSystem<F>>(
        mut cs: CS,
        value: Option<&BigUint>,
    ) -> Result<Self, SynthesisError> {
        if let Some(v) = value {
            if v.bits() > MODULUS_BITS as u64 {
                return Err(SynthesisError::Unsatisfiable);
            }
        }
        let limb_values = value.map(limbs_from_biguint);

        let mut limbs = Vec::with_capacity(NUM_LIMBS);
        for i in 0..NUM_LIMBS {
            let mut cs = cs.namespace(|| format!("limb {i}"));
            let limb = limb_values.as_ref().map(|l| l[i].clone());
            let num = cs.alloc(
                || "value",
                || {
                    limb.as_ref()
                        .map(biguint_to_field)
                        .ok_or(SynthesisError::AssignmentMissing)
                },
            )?;
            enforce_width(cs.namespace(|| "range"), num, limb.as_ref(), limb_width(i))?;
            limbs.push(LinearCombination::zero() + num);
        }

        Ok(Self {
            limbs,
            value: value.cloned(),
        })
    }

    /// A constant number. Its limbs are coefficients of the constant one variable.
    pub fn constant(one: Variable, value: &BigUint) -> Self {
        let limbs = limbs_from_biguint(value)
            .iter()
            .map(|limb| LinearCombination::zero() + (biguint_to_field::<F>(limb), one))
            .collect();
        Self {
            limbs,
            value: Some(value.clone()),
        }
    }

    pub fn limbs(&self) -> &[LinearCombination<F>] {
        &self.limbs
    }

    pub fn get_value(&self) -> Option<&BigUint> {
        self.value.as_ref()
    }

    /// `self * other mod modulus`. `redc` is `floor(2^REDC_SHIFT / modulus)` and only steers the
    /// quotient hint, the result is checked against the modulus itself.
    pub fn mul_mod<CS: ConstraintSystem<F>>(
        &self,
        mut cs: CS,
        other: &Self,
        modulus: &Self,
        redc: Option<&BigUint>,
    ) -> Result<Self, SynthesisError> {
        let hint = match (&self.value, &other.value, &modulus.value) {
            (Some(a), Some(b), Some(n)) => Some(quotient_and_remainder(&(a * b), n, redc)),
            _ => None,
        };

        let q = BigNat::alloc(cs.namespace(|| "quotient"), hint.as_ref().map(|(q, _)| q))?;
        let r = BigNat::alloc(cs.namespace(|| "remainder"), hint.as_ref().map(|(_, r)| r))?;

        let ab = poly_mul(cs.namespace(|| "a * b"), self, other)?;
        let qn = poly_mul(cs.namespace(|| "q * n"), &q, modulus)?;

        let r_limbs = r.value.as_ref().map(limbs_from_biguint);
        let terms: Vec<(LinearCombination<F>, Option<BigInt>)> = (0..PRODUCT_TERMS)
            .map(|k| {
                let mut lc = ab.coeffs[k].clone() - &qn.coeffs[k];
                let mut value = ab
                    .values
                    .as_ref()
                    .zip(qn.values.as_ref())
                    .map(|(c, d)| BigInt::from(c[k].clone()) - BigInt::from(d[k].clone()));
                if k < NUM_LIMBS {
                    lc = lc - &r.limbs[k];
                    value = value
                        .zip(r_limbs.as_ref())
                        .map(|(v, r)| v - BigInt::from(r[k].clone()));
                }
                (lc, value)
            })
            .collect();
        enforce_carry_chain(cs.namespace(|| "carries"), &terms)?;

        Ok(r)
    }

    /// `self^65537 mod modulus`: sixteen squarings and one multiplication.
    pub fn pow_65537<CS: ConstraintSystem<F>>(
        &self,
        mut cs: CS,
        modulus: &Self,
        redc: Option<&BigUint>,
    ) -> Result<Self, SynthesisError> {
        let mut acc = self.clone();
        for i in 0..16 {
            acc = acc.mul_mod(cs.namespace(|| format!("square {i}")), &acc, modulus, redc)?;
        }
        acc.mul_mod(cs.namespace(|| "multiply"), self, modulus, redc)
    }

    /// Enforces limb-wise equality with `other`.
    pub fn enforce_equal<CS: ConstraintSystem<F>>(&self, mut cs: CS, other: &Self) {
        for (i, (a, b)) in self.limbs.iter().zip(&other.limbs).enumerate() {
            cs.enforce(
                || format!("limb {i}"),
                |lc| lc + a - b,
                |lc| lc + CS::one(),
                |lc| lc,
            );
        }
    }
}

/// Quotient and remainder of `x / n`.
///
/// The quotient starts from the Barrett estimate `floor(x * redc / 2^REDC_SHIFT)` and is then
/// corrected exactly.
fn quotient_and_remainder(
    x: &BigUint,
    n: &BigUint,
    redc: Option<&BigUint>,
) -> (BigUint, BigUint) {
    if n.is_zero() {
        return (BigUint::zero(), x.clone());
    }
    let estimate = redc
        .map(|redc| (x * redc) >> REDC_SHIFT)
        .unwrap_or_default();
    let product = &estimate * n;
    if &product > x {
        return (x / n, x % n);
    }
    let rest = x - product;
    (estimate + &rest / n, rest % n)
}

struct PolyProduct<F: PrimeField> {
    coeffs: Vec<LinearCombination<F>>,
    values: Option<Vec<BigUint>>,
}

/// Allocates the 35 coefficients of the limb polynomial product and checks them by evaluating
/// both sides at `x = 0..35`.
fn poly_mul<F: PrimeField, CS: ConstraintSystem<F>>(
    mut cs: CS,
    a: &BigNat<F>,
    b: &BigNat<F>,
) -> Result<PolyProduct<F>, SynthesisError> {
    let values = match (&a.value, &b.value) {
        (Some(a), Some(b)) => {
            let (a, b) = (limbs_from_biguint(a), limbs_from_biguint(b));
            let mut c = vec![BigUint::zero(); PRODUCT_TERMS];
            for (i, ai) in a.iter().enumerate() {
                for (j, bj) in b.iter().enumerate() {
                    c[i + j] += ai * bj;
                }
            }
            Some(c)
        }
        _ => None,
    };

    let coeffs = (0..PRODUCT_TERMS)
        .map(|k| {
            let value = values.as_ref().map(|c| biguint_to_field::<F>(&c[k]));
            cs.alloc(
                || format!("coeff {k}"),
                || value.ok_or(SynthesisError::AssignmentMissing),
            )
            .map(|v| LinearCombination::zero() + v)
        })
        .collect::<Result<Vec<_>, _>>()?;

    for x in 0..PRODUCT_TERMS as u64 {
        let point = F::from(x);
        cs.enforce(
            || format!("eval {x}"),
            |lc| lc + &eval_at(&a.limbs, point),
            |lc| lc + &eval_at(&b.limbs, point),
            |lc| lc + &eval_at(&coeffs, point),
        );
    }

    Ok(PolyProduct { coeffs, values })
}

fn eval_at<F: PrimeField>(coeffs: &[LinearCombination<F>], point: F) -> LinearCombination<F> {
    let mut power = F::ONE;
    let mut out = LinearCombination::zero();
    for coeff in coeffs {
        out = out + (power, coeff);
        power *= point;
    }
    out
}

/// Checks `sum_k t_k * 2^(120 k) = 0` for signed limb terms `t_k`.
///
/// `carry_k` satisfies `t_k + carry_{k-1} = 2^120 * carry_k` and is range checked in shifted
/// form, the last term must absorb the final carry exactly.
fn enforce_carry_chain<F: PrimeField, CS: ConstraintSystem<F>>(
    mut cs: CS,
    terms: &[(LinearCombination<F>, Option<BigInt>)],
) -> Result<(), SynthesisError> {
    let base = biguint_to_field::<F>(&(BigUint::one() << LIMB_BITS));
    let offset = biguint_to_field::<F>(&(BigUint::one() << CARRY_OFFSET_BITS));

    let mut carry_lc = LinearCombination::<F>::zero();
    let carry_offset = BigInt::one() << CARRY_OFFSET_BITS;
    let mut carry_value = Some(BigInt::zero());

    for (k, (term, value)) in terms.iter().enumerate() {
        let mut cs = cs.namespace(|| format!("term {k}"));
        let total = carry_value.as_ref().zip(value.as_ref()).map(|(c, v)| c + v);

        if k + 1 == terms.len() {
            cs.enforce(
                || "final carry",
                |lc| lc + term + &carry_lc,
                |lc| lc + CS::one(),
                |lc| lc,
            );
            break;
        }

        // exact for an honest witness, so the flooring shift is a division
        let next = total.map(|t| t >> LIMB_BITS);
        let shifted = next.as_ref().and_then(|c| (c + &carry_offset).to_biguint());
        let shifted_var = cs.alloc(
            || "carry",
            || {
                shifted
                    .as_ref()
                    .map(biguint_to_field)
                    .ok_or(SynthesisError::AssignmentMissing)
            },
        )?;
        enforce_width(cs.namespace(|| "range"), shifted_var, shifted.as_ref(), CARRY_BITS)?;

        // carry = shifted - 2^126
        let next_lc = LinearCombination::zero() + shifted_var - (offset, CS::one());
        cs.enforce(
            || "carry check",
            |lc| lc + term + &carry_lc,
            |lc| lc + CS::one(),
            |lc| lc + (base, shifted_var) - (base * offset, CS::one()),
        );

        carry_lc = next_lc;
        carry_value = next;
    }
    Ok(())
}

/// Decomposes `var` into `width` bits and ties the packing back to it.
fn enforce_width<F: PrimeField, CS: ConstraintSystem<F>>(
    mut cs: CS,
    var: Variable,
    value: Option<&BigUint>,
    width: usize,
) -> Result<(), SynthesisError> {
    let bits = (0..width)
        .map(|i| {
            AllocatedBit::alloc(
                cs.namespace(|| format!("bit {i}")),
                value.map(|v| v.bit(i as u64)),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut packed = LinearCombination::zero();
    let mut coeff = F::ONE;
    for bit in &bits {
        packed = packed + (coeff, bit.get_variable());
        coeff = coeff.double();
    }
    cs.enforce(
        || "pack",
        |lc| lc + &packed,
        |lc| lc + CS::one(),
        |lc| lc + var,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scalar;
    use bellpepper_core::test_cs::TestConstraintSystem;

    // 2^2047 + 2^1000 + 12345, odd and full width
    fn test_modulus() -> BigUint {
        (BigUint::one() << 2047usize) + (BigUint::one() << 1000usize) + BigUint::from(12345u32)
    }

    fn redc(n: &BigUint) -> BigUint {
        (BigUint::one() << REDC_SHIFT) / n
    }

    #[test]
    fn limb_encoding_round_trips() {
        let n = test_modulus();
        let limbs = limbs_from_biguint(&n);
        assert_eq!(limbs.len(), NUM_LIMBS);
        assert_eq!(limbs[NUM_LIMBS - 1], BigUint::from(0x80u32));
        assert_eq!(biguint_from_limbs(&limbs), n);
    }

    #[test]
    fn quotient_hint_is_exact_for_any_redc() {
        let n = test_modulus();
        let x = (&n - 1u32) * (&n - 7u32);
        let good = redc(&n);
        for redc in [Some(&good), None, Some(&(&good + 1000u32))] {
            let (q, r) = quotient_and_remainder(&x, &n, redc);
            assert!(r < n);
            assert_eq!(q * &n + r, x);
        }
    }

    #[test]
    fn mul_mod_matches_native() {
        let n = test_modulus();
        let a = &n - BigUint::from(3u32);
        let b = (BigUint::one() << 2000usize) + BigUint::from(99u32);

        let mut cs = TestConstraintSystem::<Scalar>::new();
        let n_var = BigNat::alloc(cs.namespace(|| "n"), Some(&n)).unwrap();
        let a_var = BigNat::alloc(cs.namespace(|| "a"), Some(&a)).unwrap();
        let b_var = BigNat::alloc(cs.namespace(|| "b"), Some(&b)).unwrap();
        let r = a_var
            .mul_mod(cs.namespace(|| "mul"), &b_var, &n_var, Some(&redc(&n)))
            .unwrap();

        assert_eq!(r.get_value().unwrap(), &((&a * &b) % &n));
        assert!(cs.is_satisfied());
    }

    #[test]
    fn pow_65537_matches_modpow() {
        let n = test_modulus();
        let s = (BigUint::one() << 2040usize) + BigUint::from(0xdead_beefu64);

        let mut cs = TestConstraintSystem::<Scalar>::new();
        let n_var = BigNat::alloc(cs.namespace(|| "n"), Some(&n)).unwrap();
        let s_var = BigNat::alloc(cs.namespace(|| "s"), Some(&s)).unwrap();
        let r = s_var
            .pow_65537(cs.namespace(|| "pow"), &n_var, Some(&redc(&n)))
            .unwrap();

        let expected = s.modpow(&BigUint::from(PUBLIC_EXPONENT), &n);
        assert_eq!(r.get_value().unwrap(), &expected);

        let expected_var = BigNat::constant(TestConstraintSystem::<Scalar>::one(), &expected);
        r.enforce_equal(cs.namespace(|| "check"), &expected_var);
        assert!(cs.is_satisfied());
    }

    #[test]
    fn wrong_remainder_is_rejected() {
        let n = test_modulus();
        let a = BigUint::from(5u32) << 1500usize;

        let mut cs = TestConstraintSystem::<Scalar>::new();
        let n_var = BigNat::alloc(cs.namespace(|| "n"), Some(&n)).unwrap();
        let a_var = BigNat::alloc(cs.namespace(|| "a"), Some(&a)).unwrap();
        a_var
            .mul_mod(cs.namespace(|| "mul"), &a_var, &n_var, Some(&redc(&n)))
            .unwrap();
        assert!(cs.is_satisfied());

        // bump the lowest remainder limb by one, which breaks the lowest carry
        let path = "mul/remainder/limb 0/value";
        let bumped = cs.get(path) + Scalar::from(1u64);
        cs.set(path, bumped);
        assert!(!cs.is_satisfied());
    }
}
