//! Byte-level building blocks shared by the JWT gadgets.
//!
//! Buffers in the circuit have a fixed capacity and a runtime length. The capacity decides the
//! shape of the constraint system, the length is part of the witness and is described by a
//! [`LengthMask`].

use bellpepper::gadgets::Assignment;
use bellpepper_core::{
    boolean::{AllocatedBit, Boolean},
    ConstraintSystem, LinearCombination, SynthesisError, Variable,
};
use ff::PrimeField;

/// A byte carried as a linear combination together with its witness value.
///
/// The linear combination is not range checked by this type. Bytes produced by
/// [`Byte::alloc_with_bits`] are, bytes produced by selection or decoding inherit the range of
/// their sources.
#[derive(Clone)]
pub struct Byte<F: PrimeField> {
    lc: LinearCombination<F>,
    value: Option<u8>,
    constant: bool,
}

impl<F: PrimeField> Byte<F> {
    pub fn constant(one: Variable, value: u8) -> Self {
        Self {
            lc: LinearCombination::zero() + (F::from(value as u64), one),
            value: Some(value),
            constant: true,
        }
    }

    pub fn zero() -> Self {
        Self {
            lc: LinearCombination::zero(),
            value: Some(0),
            constant: true,
        }
    }

    /// Wraps an already constrained linear combination.
    pub fn from_lc(lc: LinearCombination<F>, value: Option<u8>) -> Self {
        Self {
            lc,
            value,
            constant: false,
        }
    }

    /// Allocates a fresh variable without range checking it.
    pub fn alloc<CS: ConstraintSystem<F>>(
        mut cs: CS,
        value: Option<u8>,
    ) -> Result<Self, SynthesisError> {
        let var = cs.alloc(|| "byte", || Ok(F::from(*value.get()? as u64)))?;
        Ok(Self::from_lc(LinearCombination::zero() + var, value))
    }

    /// Allocates a byte as eight boolean witnesses, which range checks it.
    ///
    /// Returns the byte and its bits in little-endian order.
    pub fn alloc_with_bits<CS: ConstraintSystem<F>>(
        mut cs: CS,
        value: Option<u8>,
    ) -> Result<(Self, Vec<Boolean>), SynthesisError> {
        let bits = (0..8)
            .map(|i| {
                AllocatedBit::alloc(
                    cs.namespace(|| format!("bit {i}")),
                    value.map(|v| (v >> i) & 1 == 1),
                )
                .map(Boolean::from)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((Self::from_bits_le(CS::one(), &bits), bits))
    }

    pub fn from_bits_le(one: Variable, bits: &[Boolean]) -> Self {
        let mut lc = LinearCombination::zero();
        let mut coeff = F::ONE;
        for bit in bits {
            lc = lc + &bit.lc(one, coeff);
            coeff = coeff.double();
        }
        let value = bits.iter().rev().try_fold(0u8, |acc, bit| {
            bit.get_value().map(|b| (acc << 1) | b as u8)
        });
        let constant = bits.iter().all(|b| matches!(b, Boolean::Constant(_)));
        Self {
            lc,
            value,
            constant,
        }
    }

    pub fn lc(&self) -> &LinearCombination<F> {
        &self.lc
    }

    pub fn get_value(&self) -> Option<u8> {
        self.value
    }

    pub fn field_value(&self) -> Option<F> {
        self.value.map(|v| F::from(v as u64))
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// Enforces `self == expected`.
    pub fn enforce_equal_constant<CS: ConstraintSystem<F>>(
        &self,
        mut cs: CS,
        expected: u8,
    ) -> Result<(), SynthesisError> {
        cs.enforce(
            || format!("byte == {expected:#04x}"),
            |lc| lc + &self.lc - (F::from(expected as u64), CS::one()),
            |lc| lc + CS::one(),
            |lc| lc,
        );
        Ok(())
    }

    /// `self == expected` as an allocated boolean.
    ///
    /// Witnesses the inverse of `self - expected`: `(x - c) * inv = 1 - eq` and `(x - c) * eq = 0`.
    pub fn is_equal_constant<CS: ConstraintSystem<F>>(
        &self,
        mut cs: CS,
        expected: u8,
    ) -> Result<Boolean, SynthesisError> {
        if self.constant {
            return Ok(Boolean::constant(self.value == Some(expected)));
        }

        let diff = self.value.map(|v| F::from(v as u64) - F::from(expected as u64));
        let eq = AllocatedBit::alloc(cs.namespace(|| "eq"), diff.map(|d| d.is_zero().into()))?;
        let inv = cs.alloc(
            || "inverse",
            || {
                let d = diff.ok_or(SynthesisError::AssignmentMissing)?;
                Ok(Option::from(d.invert()).unwrap_or(F::ZERO))
            },
        )?;

        let c = F::from(expected as u64);
        cs.enforce(
            || "inverse check",
            |lc| lc + &self.lc - (c, CS::one()),
            |lc| lc + inv,
            |lc| lc + CS::one() - eq.get_variable(),
        );
        cs.enforce(
            || "zero",
            |lc| lc + &self.lc - (c, CS::one()),
            |lc| lc + eq.get_variable(),
            |lc| lc,
        );
        Ok(Boolean::from(eq))
    }

    /// Enforces `self != forbidden` whenever `active` is set.
    pub fn enforce_not_equal_constant<CS: ConstraintSystem<F>>(
        &self,
        mut cs: CS,
        forbidden: u8,
        active: &Boolean,
    ) -> Result<(), SynthesisError> {
        let c = F::from(forbidden as u64);
        let inv = cs.alloc(
            || "inverse",
            || {
                if !active.get_value().ok_or(SynthesisError::AssignmentMissing)? {
                    return Ok(F::ZERO);
                }
                let d = self.field_value().ok_or(SynthesisError::AssignmentMissing)? - c;
                Ok(Option::from(d.invert()).unwrap_or(F::ZERO))
            },
        )?;
        // (x - c) * inv = active
        cs.enforce(
            || "nonzero",
            |lc| lc + &self.lc - (c, CS::one()),
            |lc| lc + inv,
            |_| active.lc(CS::one(), F::ONE),
        );
        Ok(())
    }

    /// Returns `bit * self`.
    pub fn masked<CS: ConstraintSystem<F>>(
        &self,
        mut cs: CS,
        bit: &Boolean,
    ) -> Result<Self, SynthesisError> {
        if let Boolean::Constant(b) = bit {
            return Ok(if *b { self.clone() } else { Self::zero() });
        }
        let value = bit
            .get_value()
            .zip(self.value)
            .map(|(b, v)| if b { v } else { 0 });
        let out = Self::alloc(cs.namespace(|| "masked"), value)?;
        cs.enforce(
            || "mask",
            |_| bit.lc(CS::one(), F::ONE),
            |lc| lc + &self.lc,
            |lc| lc + &out.lc,
        );
        Ok(out)
    }

    /// Returns `bit ? when_true : when_false`.
    pub fn select<CS: ConstraintSystem<F>>(
        mut cs: CS,
        bit: &Boolean,
        when_true: &Self,
        when_false: &Self,
    ) -> Result<Self, SynthesisError> {
        if let Boolean::Constant(b) = bit {
            return Ok(if *b { when_true } else { when_false }.clone());
        }
        if when_true.constant && when_false.constant && when_true.value == when_false.value {
            return Ok(when_true.clone());
        }

        let value = match bit.get_value() {
            Some(true) => when_true.value,
            Some(false) => when_false.value,
            None => None,
        };
        let selected = Self::alloc(cs.namespace(|| "selected"), value)?;

        // bit * (t - f) = selected - f
        cs.enforce(
            || "select",
            |_| bit.lc(CS::one(), F::ONE),
            |lc| lc + &when_true.lc - &when_false.lc,
            |lc| lc + &selected.lc - &when_false.lc,
        );
        Ok(selected)
    }
}

/// Allocates `bits` boolean witnesses for `value` and returns them little-endian.
///
/// The number is not tied to anything; callers enforce the packed value against the quantity
/// they decompose.
pub fn alloc_bits_le<F: PrimeField, CS: ConstraintSystem<F>>(
    mut cs: CS,
    value: Option<u64>,
    bits: usize,
) -> Result<Vec<Boolean>, SynthesisError> {
    (0..bits)
        .map(|i| {
            AllocatedBit::alloc(
                cs.namespace(|| format!("bit {i}")),
                value.map(|v| i < 64 && (v >> i) & 1 == 1),
            )
            .map(Boolean::from)
        })
        .collect()
}

/// Packs little-endian boolean bits into a linear combination.
pub fn pack_bits_le<F: PrimeField>(one: Variable, bits: &[Boolean]) -> LinearCombination<F> {
    let mut lc = LinearCombination::zero();
    let mut coeff = F::ONE;
    for bit in bits {
        lc = lc + &bit.lc(one, coeff);
        coeff = coeff.double();
    }
    lc
}

/// Enforces `lc == 0`.
pub fn enforce_zero<F: PrimeField, CS: ConstraintSystem<F>>(
    cs: &mut CS,
    annotation: impl Into<String>,
    lc: LinearCombination<F>,
) {
    let annotation = annotation.into();
    cs.enforce(|| annotation, |_| lc, |l| l + CS::one(), |l| l);
}

/// Number of bits needed to address every index of a buffer with `capacity` slots.
pub fn index_bits(capacity: usize) -> usize {
    if capacity <= 1 {
        1
    } else {
        (usize::BITS - (capacity - 1).leading_zeros()) as usize
    }
}

/// Runtime length of a fixed-capacity buffer, as a prefix of ones.
///
/// `flags[i]` is one exactly when `i < len`. The flags are constrained to be monotone, so their
/// sum is the length and every position can ask "am I inside the data?" for the cost of a
/// linear combination.
pub struct LengthMask<F: PrimeField> {
    flags: Vec<Boolean>,
    len: Option<usize>,
    one: Variable,
    _field: std::marker::PhantomData<F>,
}

impl<F: PrimeField> LengthMask<F> {
    pub fn alloc<CS: ConstraintSystem<F>>(
        mut cs: CS,
        len: Option<usize>,
        capacity: usize,
    ) -> Result<Self, SynthesisError> {
        if let Some(len) = len {
            if len > capacity {
                return Err(SynthesisError::Unsatisfiable);
            }
        }

        let mut flags: Vec<Boolean> = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let flag = Boolean::from(AllocatedBit::alloc(
                cs.namespace(|| format!("flag {i}")),
                len.map(|l| i < l),
            )?);
            if let Some(prev) = flags.last() {
                // flag_i => flag_{i-1}
                cs.enforce(
                    || format!("prefix {i}"),
                    |_| flag.lc(CS::one(), F::ONE),
                    |_| prev.not().lc(CS::one(), F::ONE),
                    |lc| lc,
                );
            }
            flags.push(flag);
        }

        Ok(Self {
            flags,
            len,
            one: CS::one(),
            _field: std::marker::PhantomData,
        })
    }

    pub fn capacity(&self) -> usize {
        self.flags.len()
    }

    pub fn get_value(&self) -> Option<usize> {
        self.len
    }

    /// Sum of the flags, i.e. the runtime length.
    pub fn length_lc(&self) -> LinearCombination<F> {
        self.flags
            .iter()
            .fold(LinearCombination::zero(), |lc, flag| {
                lc + &flag.lc(self.one, F::ONE)
            })
    }

    /// `i < len`. Constant false outside the capacity.
    pub fn lt(&self, i: usize) -> Boolean {
        self.flags
            .get(i)
            .cloned()
            .unwrap_or(Boolean::constant(false))
    }

    /// `i == len` as a linear combination of the flags.
    pub fn eq_lc(&self, i: usize) -> LinearCombination<F> {
        let prev = if i == 0 {
            Boolean::constant(true)
        } else {
            self.lt(i - 1)
        };
        prev.lc(self.one, F::ONE) - &self.lt(i).lc(self.one, F::ONE)
    }

    /// `i == len` as an allocated boolean.
    pub fn eq<CS: ConstraintSystem<F>>(
        &self,
        cs: CS,
        i: usize,
    ) -> Result<Boolean, SynthesisError> {
        let prev = if i == 0 {
            Boolean::constant(true)
        } else {
            self.lt(i - 1)
        };
        Boolean::and(cs, &prev, &self.lt(i).not())
    }

    /// Enforces that every byte at or beyond the length is zero.
    pub fn enforce_zero_tail<CS: ConstraintSystem<F>>(
        &self,
        mut cs: CS,
        bytes: &[Byte<F>],
    ) -> Result<(), SynthesisError> {
        for (i, byte) in bytes.iter().enumerate() {
            let outside = self.lt(i).not();
            cs.enforce(
                || format!("zero tail {i}"),
                |_| outside.lc(CS::one(), F::ONE),
                |lc| lc + byte.lc(),
                |lc| lc,
            );
        }
        Ok(())
    }
}

/// A witness index decomposed into bits, used as a selector.
#[derive(Clone)]
pub struct Position<F: PrimeField> {
    bits: Vec<Boolean>,
    value: Option<usize>,
    one: Variable,
    _field: std::marker::PhantomData<F>,
}

impl<F: PrimeField> Position<F> {
    pub fn alloc<CS: ConstraintSystem<F>>(
        cs: CS,
        value: Option<usize>,
        num_bits: usize,
    ) -> Result<Self, SynthesisError> {
        if let Some(v) = value {
            if num_bits < usize::BITS as usize && v >> num_bits != 0 {
                return Err(SynthesisError::Unsatisfiable);
            }
        }
        let bits = alloc_bits_le(cs, value.map(|v| v as u64), num_bits)?;
        Ok(Self {
            bits,
            value,
            one: CS::one(),
            _field: std::marker::PhantomData,
        })
    }

    pub fn bits(&self) -> &[Boolean] {
        &self.bits
    }

    pub fn get_value(&self) -> Option<usize> {
        self.value
    }

    pub fn lc(&self) -> LinearCombination<F> {
        pack_bits_le(self.one, &self.bits)
    }
}

/// Returns `items[shift..shift + len]`, reading zero past the end of `items`.
///
/// Implemented as a barrel shifter: one layer of selects per bit of `shift`, each layer only as
/// wide as the remaining shift can still reach.
pub fn select_window<F: PrimeField, CS: ConstraintSystem<F>>(
    mut cs: CS,
    items: &[Byte<F>],
    shift: &Position<F>,
    len: usize,
) -> Result<Vec<Byte<F>>, SynthesisError> {
    let num_bits = shift.bits().len();
    let max_shift = if num_bits >= usize::BITS as usize {
        usize::MAX
    } else {
        (1usize << num_bits) - 1
    };

    let mut current: Vec<Byte<F>> = items.to_vec();
    for (s, bit) in shift.bits().iter().enumerate() {
        let step = 1usize << s;
        let reachable = max_shift - ((1usize << (s + 1)) - 1);
        let keep = len.saturating_add(reachable).min(current.len());

        let mut cs = cs.namespace(|| format!("layer {s}"));
        let mut next = Vec::with_capacity(keep);
        for j in 0..keep {
            let stay = current[j].clone();
            let moved = current.get(j + step).cloned().unwrap_or_else(Byte::zero);
            next.push(Byte::select(
                cs.namespace(|| format!("slot {j}")),
                bit,
                &moved,
                &stay,
            )?);
        }
        current = next;
    }

    current.truncate(len);
    current.resize_with(len, Byte::zero);
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scalar;
    use bellpepper_core::test_cs::TestConstraintSystem;

    fn alloc_bytes(
        cs: &mut TestConstraintSystem<Scalar>,
        data: &[u8],
    ) -> Vec<Byte<Scalar>> {
        data.iter()
            .enumerate()
            .map(|(i, b)| {
                Byte::alloc_with_bits(cs.namespace(|| format!("byte {i}")), Some(*b))
                    .unwrap()
                    .0
            })
            .collect()
    }

    #[test]
    fn window_selection_reads_shifted_bytes() {
        let data = b"header.payload-bytes";
        for offset in [0usize, 1, 3, 7, 12] {
            let mut cs = TestConstraintSystem::<Scalar>::new();
            let bytes = alloc_bytes(&mut cs, data);
            let pos = Position::alloc(cs.namespace(|| "offset"), Some(offset), 5).unwrap();
            let window = select_window(cs.namespace(|| "window"), &bytes, &pos, 6).unwrap();

            let got: Vec<u8> = window.iter().map(|b| b.get_value().unwrap()).collect();
            let mut expected: Vec<u8> = data.iter().skip(offset).take(6).copied().collect();
            expected.resize(6, 0);
            assert_eq!(got, expected, "offset {offset}");
            assert!(cs.is_satisfied());
        }
    }

    #[test]
    fn length_mask_rejects_gaps() {
        let mut cs = TestConstraintSystem::<Scalar>::new();
        let mask = LengthMask::<Scalar>::alloc(cs.namespace(|| "mask"), Some(3), 8).unwrap();
        assert_eq!(mask.get_value(), Some(3));
        assert!(cs.is_satisfied());

        // flip flag 5 on, leaving a hole at 3 and 4
        cs.set("mask/flag 5/boolean", Scalar::ONE);
        assert!(!cs.is_satisfied());
        assert_eq!(cs.which_is_unsatisfied(), Some("mask/prefix 5"));
    }

    #[test]
    fn constant_comparison() {
        let mut cs = TestConstraintSystem::<Scalar>::new();
        let bytes = alloc_bytes(&mut cs, b"k\"");
        let hit = bytes[0].is_equal_constant(cs.namespace(|| "hit"), b'k').unwrap();
        let miss = bytes[1].is_equal_constant(cs.namespace(|| "miss"), b'k').unwrap();
        assert_eq!(hit.get_value(), Some(true));
        assert_eq!(miss.get_value(), Some(false));
        assert!(cs.is_satisfied());

        bytes[1]
            .enforce_not_equal_constant(cs.namespace(|| "quote"), b'"', &Boolean::constant(true))
            .unwrap();
        assert!(!cs.is_satisfied());
        assert_eq!(cs.which_is_unsatisfied(), Some("quote/nonzero"));
    }

    #[test]
    fn zero_tail_is_enforced() {
        let mut cs = TestConstraintSystem::<Scalar>::new();
        let bytes = alloc_bytes(&mut cs, b"abc\0\0x");
        let mask = LengthMask::alloc(cs.namespace(|| "mask"), Some(3), 6).unwrap();
        mask.enforce_zero_tail(cs.namespace(|| "tail"), &bytes).unwrap();
        assert!(!cs.is_satisfied());
        assert_eq!(cs.which_is_unsatisfied(), Some("tail/zero tail 5"));
    }
}
