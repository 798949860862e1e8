//! Claim extraction from a verified token.
//!
//! Each query decodes a window of the payload (shared between queries with the same scan
//! range), locates `"key"` in it with the substring matcher and reads the value that follows.
//! Where the value ends is a hint, the constraints check its terminator, its content and that
//! nothing before the terminator could have ended it earlier.

use bellpepper_core::{
    boolean::{AllocatedBit, Boolean},
    num::AllocatedNum,
    ConstraintSystem, LinearCombination, SynthesisError,
};
use ff::PrimeField;

use super::{
    hint::{key_needle, scan_value, UNQUOTED_TERMINATORS},
    JwtParams, VerifiedJwt,
};
use crate::{
    error::JwtError,
    gadgets::{
        base64::decode_window,
        bytes::{alloc_bits_le, pack_bits_le, select_window, Byte, LengthMask},
        substring,
    },
};

/// Longest decimal claim accepted. Twenty digits covers `u64::MAX`.
pub const MAX_NUMBER_DIGITS: usize = 20;

const TRUE: &[u8] = b"true";
const FALSE: &[u8] = b"false";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimKind {
    String,
    Number,
    Bool,
}

impl ClaimKind {
    fn quoted(self) -> bool {
        matches!(self, ClaimKind::String)
    }
}

/// A validated claim lookup: the key, how many base64 characters to decode and the longest
/// value to accept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimQuery {
    key: String,
    kind: ClaimKind,
    scan_range: usize,
    max_value_length: usize,
}

impl ClaimQuery {
    pub fn string(
        key: &str,
        scan_range: usize,
        max_value_length: usize,
        params: &JwtParams,
    ) -> Result<Self, JwtError> {
        Self::new(key, ClaimKind::String, scan_range, max_value_length, params)
    }

    pub fn number(
        key: &str,
        scan_range: usize,
        max_digits: usize,
        params: &JwtParams,
    ) -> Result<Self, JwtError> {
        if max_digits > MAX_NUMBER_DIGITS {
            return Err(JwtError::NumberTooLong {
                len: max_digits,
                max: MAX_NUMBER_DIGITS,
            });
        }
        Self::new(key, ClaimKind::Number, scan_range, max_digits, params)
    }

    pub fn bool(key: &str, scan_range: usize, params: &JwtParams) -> Result<Self, JwtError> {
        Self::new(key, ClaimKind::Bool, scan_range, FALSE.len(), params)
    }

    fn new(
        key: &str,
        kind: ClaimKind,
        scan_range: usize,
        max_value_length: usize,
        params: &JwtParams,
    ) -> Result<Self, JwtError> {
        let key_ok = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_graphic() && b != b'"' && b != b'\\');
        if !key_ok {
            return Err(JwtError::InvalidKey);
        }
        if scan_range % 4 != 0 {
            return Err(JwtError::ScanRangeNotMultipleOfFour(scan_range));
        }
        if scan_range > params.max_signed_data_length {
            return Err(JwtError::ScanRangeTooLarge {
                scan_range,
                max: params.max_signed_data_length,
            });
        }
        let query = Self {
            key: key.to_owned(),
            kind,
            scan_range,
            max_value_length,
        };
        if max_value_length == 0 || query.span_len() > query.decoded_len() {
            return Err(JwtError::ValueTooLong {
                max_value_length,
                scan_range,
            });
        }
        Ok(query)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ClaimKind {
        self.kind
    }

    pub fn scan_range(&self) -> usize {
        self.scan_range
    }

    pub fn max_value_length(&self) -> usize {
        self.max_value_length
    }

    fn decoded_len(&self) -> usize {
        self.scan_range / 4 * 3
    }

    /// Bytes after the key needle the matcher must expose: the colon, the opening quote,
    /// the value and its terminator.
    fn lookahead(&self) -> usize {
        1 + self.kind.quoted() as usize + self.max_value_length + 1
    }

    fn span_len(&self) -> usize {
        self.key.len() + 2 + self.lookahead()
    }

    /// Rejects expected strings that cannot fit the value window.
    pub fn check_expected_len(&self, len: usize) -> Result<(), JwtError> {
        if len > self.max_value_length {
            return Err(JwtError::ExpectedValueTooLong {
                key: self.key.clone(),
                max: self.max_value_length,
            });
        }
        Ok(())
    }
}

/// A string claim: bytes up to the value length, zero after it.
pub struct ClaimString<F: PrimeField> {
    bytes: Vec<Byte<F>>,
    len: LengthMask<F>,
}

impl<F: PrimeField> ClaimString<F> {
    pub fn bytes(&self) -> &[Byte<F>] {
        &self.bytes
    }

    pub fn length(&self) -> &LengthMask<F> {
        &self.len
    }

    pub fn get_value(&self) -> Option<Vec<u8>> {
        let len = self.len.get_value()?;
        self.bytes[..len].iter().map(Byte::get_value).collect()
    }
}

/// A decimal claim parsed into a field element below `2^64`.
pub struct ClaimNumber<F: PrimeField> {
    num: AllocatedNum<F>,
    value: Option<u64>,
}

impl<F: PrimeField> ClaimNumber<F> {
    pub fn num(&self) -> &AllocatedNum<F> {
        &self.num
    }

    pub fn get_value(&self) -> Option<u64> {
        self.value
    }
}

impl<F: PrimeField> VerifiedJwt<F> {
    /// Reads a quoted string value.
    pub fn get_claim_string<CS: ConstraintSystem<F>>(
        &mut self,
        mut cs: CS,
        query: &ClaimQuery,
    ) -> Result<ClaimString<F>, SynthesisError> {
        assert_eq!(query.kind, ClaimKind::String);
        let mut cs = self.claim_namespace(&mut cs, query);
        self.locate_value(&mut cs, query)
    }

    /// Reads a string value and enforces it equals `expected`.
    pub fn assert_claim_string<CS: ConstraintSystem<F>>(
        &mut self,
        mut cs: CS,
        query: &ClaimQuery,
        expected: &str,
    ) -> Result<(), SynthesisError> {
        assert_eq!(query.kind, ClaimKind::String);
        if expected.len() > query.max_value_length {
            return Err(SynthesisError::Unsatisfiable);
        }
        let mut cs = self.claim_namespace(&mut cs, query);
        let value = self.locate_value(&mut cs, query)?;

        let expected = expected.as_bytes();
        for (t, byte) in value.bytes.iter().enumerate() {
            byte.enforce_equal_constant(
                cs.namespace(|| format!("expected {t}")),
                expected.get(t).copied().unwrap_or(0),
            )?;
        }
        cs.enforce(
            || "expected length",
            |lc| lc + &value.len.length_lc(),
            |lc| lc + CS::one(),
            |lc| lc + (F::from(expected.len() as u64), CS::one()),
        );
        Ok(())
    }

    /// Reads an unsigned decimal value.
    pub fn get_claim_number<CS: ConstraintSystem<F>>(
        &mut self,
        mut cs: CS,
        query: &ClaimQuery,
    ) -> Result<ClaimNumber<F>, SynthesisError> {
        let mut cs = self.claim_namespace(&mut cs, query);
        self.read_number(&mut cs, query)
    }

    /// Reads a decimal value and enforces it equals `expected`.
    pub fn assert_claim_number<CS: ConstraintSystem<F>>(
        &mut self,
        mut cs: CS,
        query: &ClaimQuery,
        expected: u64,
    ) -> Result<(), SynthesisError> {
        let mut cs = self.claim_namespace(&mut cs, query);
        let number = self.read_number(&mut cs, query)?;
        cs.enforce(
            || "expected number",
            |lc| lc + number.num.get_variable(),
            |lc| lc + CS::one(),
            |lc| lc + (F::from(expected), CS::one()),
        );
        Ok(())
    }

    /// Reads a `true` / `false` value.
    pub fn get_claim_bool<CS: ConstraintSystem<F>>(
        &mut self,
        mut cs: CS,
        query: &ClaimQuery,
    ) -> Result<Boolean, SynthesisError> {
        let mut cs = self.claim_namespace(&mut cs, query);
        self.read_bool(&mut cs, query)
    }

    /// Reads a boolean value and enforces it equals `expected`.
    pub fn assert_claim_bool<CS: ConstraintSystem<F>>(
        &mut self,
        mut cs: CS,
        query: &ClaimQuery,
        expected: bool,
    ) -> Result<(), SynthesisError> {
        let mut cs = self.claim_namespace(&mut cs, query);
        let value = self.read_bool(&mut cs, query)?;
        Boolean::enforce_equal(
            cs.namespace(|| "expected bool"),
            &value,
            &Boolean::constant(expected),
        )
    }

    fn read_number<CS: ConstraintSystem<F>>(
        &mut self,
        cs: &mut CS,
        query: &ClaimQuery,
    ) -> Result<ClaimNumber<F>, SynthesisError> {
        assert_eq!(query.kind, ClaimKind::Number);
        let value = self.locate_value(&mut *cs, query)?;
        parse_decimal(cs.namespace(|| "parse"), &value)
    }

    fn read_bool<CS: ConstraintSystem<F>>(
        &mut self,
        cs: &mut CS,
        query: &ClaimQuery,
    ) -> Result<Boolean, SynthesisError> {
        assert_eq!(query.kind, ClaimKind::Bool);
        let value = self.locate_value(&mut *cs, query)?;

        let is_true = AllocatedBit::alloc(
            cs.namespace(|| "is true"),
            value.get_value().map(|v| v == TRUE),
        )?;

        // v_t = false_t + b * (true_t - false_t)
        for (t, byte) in value.bytes.iter().enumerate() {
            let when_true = F::from(TRUE.get(t).copied().unwrap_or(0) as u64);
            let when_false = F::from(FALSE.get(t).copied().unwrap_or(0) as u64);
            cs.enforce(
                || format!("literal {t}"),
                |lc| lc + is_true.get_variable(),
                |lc| lc + (when_true - when_false, CS::one()),
                |lc| lc + byte.lc() - (when_false, CS::one()),
            );
        }
        // len = 5 - b
        cs.enforce(
            || "literal length",
            |lc| lc + &value.len.length_lc() + is_true.get_variable(),
            |lc| lc + CS::one(),
            |lc| lc + (F::from(FALSE.len() as u64), CS::one()),
        );
        Ok(Boolean::from(is_true))
    }

    fn claim_namespace<'a, CS: ConstraintSystem<F>>(
        &mut self,
        cs: &'a mut CS,
        query: &ClaimQuery,
    ) -> bellpepper_core::Namespace<'a, F, CS::Root> {
        self.claims += 1;
        let n = self.claims;
        let kind = query.kind;
        cs.namespace(move || format!("claim {n} ({kind:?})"))
    }

    /// Decoded payload window of `scan_range` base64 characters from the decode offset.
    fn decoded_window<CS: ConstraintSystem<F>>(
        &mut self,
        cs: &mut CS,
        scan_range: usize,
    ) -> Result<Vec<Byte<F>>, SynthesisError> {
        if let Some(window) = self.windows.get(&scan_range) {
            return Ok(window.clone());
        }
        let mut cs = cs.namespace(|| format!("payload window {scan_range}"));
        let chars = select_window(cs.namespace(|| "select"), &self.data, &self.offset, scan_range)?;
        let decoded = decode_window(cs.namespace(|| "decode"), &chars)?;
        self.windows.insert(scan_range, decoded.clone());
        Ok(decoded)
    }

    /// Locates `"key":` and returns the value bytes that follow it, masked to the value length.
    fn locate_value<CS: ConstraintSystem<F>>(
        &mut self,
        cs: &mut CS,
        query: &ClaimQuery,
    ) -> Result<ClaimString<F>, SynthesisError> {
        let decoded = self.decoded_window(&mut *cs, query.scan_range)?;
        let quoted = query.kind.quoted();
        let max = query.max_value_length;

        let needle = key_needle(&query.key);
        let found = substring::find(
            cs.namespace(|| "find key"),
            &decoded,
            &needle,
            query.lookahead(),
        )?;
        Boolean::enforce_equal(
            cs.namespace(|| "key found"),
            &found.found,
            &Boolean::constant(true),
        )?;

        let window = found.window;
        let mut start = needle.len();
        window[start].enforce_equal_constant(cs.namespace(|| "colon"), b':')?;
        start += 1;
        if quoted {
            window[start].enforce_equal_constant(cs.namespace(|| "open quote"), b'"')?;
            start += 1;
        }

        let values: Option<Vec<u8>> = decoded.iter().map(Byte::get_value).collect();
        let len = values.map(|v| {
            scan_value(&v, &query.key, quoted)
                .map(|span| span.value_len.min(max))
                .unwrap_or(0)
        });
        let mask = LengthMask::alloc(cs.namespace(|| "value length"), len, max)?;

        let mut bytes = Vec::with_capacity(max);
        for t in 0..=max {
            let mut cs = cs.namespace(|| format!("value {t}"));
            let w = &window[start + t];
            let at_end = mask.eq_lc(t);

            if quoted {
                // the closing quote sits at the length
                cs.enforce(
                    || "terminator",
                    |_| at_end,
                    |lc| lc + w.lc() - (F::from(b'"' as u64), CS::one()),
                    |lc| lc,
                );
            } else {
                let [a, b] = UNQUOTED_TERMINATORS.map(|c| F::from(c as u64));
                let product = w.field_value().map(|v| (v - a) * (v - b));
                let product = cs.alloc(
                    || "terminator product",
                    || product.ok_or(SynthesisError::AssignmentMissing),
                )?;
                cs.enforce(
                    || "terminator choice",
                    |lc| lc + w.lc() - (a, CS::one()),
                    |lc| lc + w.lc() - (b, CS::one()),
                    |lc| lc + product,
                );
                cs.enforce(
                    || "terminator",
                    |_| at_end,
                    |lc| lc + product,
                    |lc| lc,
                );
            }

            if t == max {
                break;
            }
            let inside = mask.lt(t);
            if quoted {
                w.enforce_not_equal_constant(cs.namespace(|| "unquoted"), b'"', &inside)?;
            }
            bytes.push(w.masked(cs.namespace(|| "byte"), &inside)?);
        }

        Ok(ClaimString { bytes, len: mask })
    }
}

/// Parses masked ASCII digits into a number below `2^64`.
fn parse_decimal<F: PrimeField, CS: ConstraintSystem<F>>(
    mut cs: CS,
    value: &ClaimString<F>,
) -> Result<ClaimNumber<F>, SynthesisError> {
    Boolean::enforce_equal(
        cs.namespace(|| "non-empty"),
        &value.len.lt(0),
        &Boolean::constant(true),
    )?;

    let zero = b'0' as u64;
    let mut acc_lc = LinearCombination::<F>::zero();
    let mut acc_value: Option<u128> = Some(0);
    let mut acc_num = None;

    for (t, byte) in value.bytes.iter().enumerate() {
        let mut cs = cs.namespace(|| format!("digit {t}"));
        let inside = value.len.lt(t);

        let digit = byte.get_value().zip(inside.get_value()).map(|(v, inside)| {
            match (inside, v.checked_sub(b'0')) {
                (true, Some(d)) if d <= 9 => d as u64,
                _ => 0,
            }
        });
        let bits = alloc_bits_le(cs.namespace(|| "bits"), digit, 4)?;
        let digit_lc = pack_bits_le::<F>(CS::one(), &bits);

        // d = v - 48 * inside
        cs.enforce(
            || "digit",
            |lc| lc + &digit_lc,
            |lc| lc + CS::one(),
            |lc| lc + byte.lc() - &inside.lc(CS::one(), F::from(zero)),
        );
        // d <= 9: with bit 3 set, bits 1 and 2 are clear
        for (i, annotation) in [(1, "below ten 1"), (2, "below ten 2")] {
            cs.enforce(
                || annotation,
                |_| bits[3].lc(CS::one(), F::ONE),
                |_| bits[i].lc(CS::one(), F::ONE),
                |lc| lc,
            );
        }

        let next_value = acc_value
            .zip(inside.get_value())
            .zip(digit)
            .map(|((acc, inside), d)| {
                if inside {
                    acc.saturating_mul(10).saturating_add(d as u128)
                } else {
                    acc
                }
            });
        let next = AllocatedNum::alloc(cs.namespace(|| "acc"), || {
            next_value
                .map(|v| {
                    let hi = F::from((v >> 64) as u64);
                    let shift = F::from(u64::MAX) + F::ONE;
                    hi * shift + F::from(v as u64)
                })
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        // inside * 9 acc = next - acc - d
        cs.enforce(
            || "accumulate",
            |_| inside.lc(CS::one(), F::ONE),
            |lc| lc + (F::from(9), &acc_lc),
            |lc| lc + next.get_variable() - &acc_lc - &digit_lc,
        );

        acc_lc = LinearCombination::zero() + next.get_variable();
        acc_value = next_value;
        acc_num = Some(next);
    }

    let num = acc_num.ok_or(SynthesisError::Unsatisfiable)?;
    let value = acc_value.and_then(|v| u64::try_from(v).ok());
    // an overflowing value keeps its low bits, which then fail to pack back to it
    let bits = alloc_bits_le(cs.namespace(|| "u64"), acc_value.map(|v| v as u64), 64)?;
    cs.enforce(
        || "fits u64",
        |lc| lc + &pack_bits_le(CS::one(), &bits),
        |lc| lc + CS::one(),
        |lc| lc + num.get_variable(),
    );

    Ok(ClaimNumber { num, value })
}
