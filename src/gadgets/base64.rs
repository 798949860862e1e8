//! In-circuit base64url decoding of a fixed window.
//!
//! Every character is matched against the 64-symbol alphabet with a one-hot selector. A byte
//! outside the alphabet has no valid selector, so the constraint system becomes unsatisfiable.

use bellpepper_core::{
    boolean::AllocatedBit, ConstraintSystem, LinearCombination, SynthesisError,
};
use ff::PrimeField;

use super::bytes::Byte;

pub const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Index of `c` in the base64url alphabet.
pub fn sextet(c: u8) -> Option<u8> {
    match c {
        b'A'..=b'Z' => Some(c - b'A'),
        b'a'..=b'z' => Some(c - b'a' + 26),
        b'0'..=b'9' => Some(c - b'0' + 52),
        b'-' => Some(62),
        b'_' => Some(63),
        _ => None,
    }
}

/// One-hot selector of a character's alphabet index.
struct Symbol {
    selectors: Vec<AllocatedBit>,
    value: Option<u8>,
}

impl Symbol {
    fn alloc<F: PrimeField, CS: ConstraintSystem<F>>(
        mut cs: CS,
        c: &Byte<F>,
    ) -> Result<Self, SynthesisError> {
        let value = c.get_value().and_then(sextet);
        let selectors = (0..64u8)
            .map(|k| {
                AllocatedBit::alloc(
                    cs.namespace(|| format!("is {}", ALPHABET[k as usize] as char)),
                    c.get_value().map(|_| value == Some(k)),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        cs.enforce(
            || "one hot",
            |lc| {
                selectors
                    .iter()
                    .fold(lc, |lc, bit| lc + bit.get_variable())
            },
            |lc| lc + CS::one(),
            |lc| lc + CS::one(),
        );
        cs.enforce(
            || "alphabet",
            |lc| {
                selectors.iter().zip(ALPHABET).fold(lc, |lc, (bit, a)| {
                    lc + (F::from(*a as u64), bit.get_variable())
                })
            },
            |lc| lc + CS::one(),
            |lc| lc + c.lc(),
        );

        Ok(Self { selectors, value })
    }

    /// `sum_k f(k) * e_k`: any function of the index as a linear combination.
    fn map<F: PrimeField>(&self, f: impl Fn(u8) -> u8) -> LinearCombination<F> {
        self.selectors
            .iter()
            .enumerate()
            .fold(LinearCombination::zero(), |lc, (k, bit)| {
                match f(k as u8) {
                    0 => lc,
                    v => lc + (F::from(v as u64), bit.get_variable()),
                }
            })
    }
}

/// Decodes `chars` (a multiple of four) into `chars.len() / 4 * 3` bytes.
pub fn decode_window<F: PrimeField, CS: ConstraintSystem<F>>(
    mut cs: CS,
    chars: &[Byte<F>],
) -> Result<Vec<Byte<F>>, SynthesisError> {
    assert_eq!(chars.len() % 4, 0, "base64 window must be a multiple of 4");

    let mut out = Vec::with_capacity(chars.len() / 4 * 3);
    for (g, group) in chars.chunks(4).enumerate() {
        let mut cs = cs.namespace(|| format!("group {g}"));
        let s = group
            .iter()
            .enumerate()
            .map(|(i, c)| Symbol::alloc(cs.namespace(|| format!("char {i}")), c))
            .collect::<Result<Vec<_>, _>>()?;

        let v: Option<Vec<u8>> = s.iter().map(|sym| sym.value).collect();
        let bytes = v.map(|v| {
            [
                (v[0] << 2) | (v[1] >> 4),
                (v[1] << 4) | (v[2] >> 2),
                (v[2] << 6) | v[3],
            ]
        });

        let lcs = [
            s[0].map(|k| k << 2) + &s[1].map(|k| k >> 4),
            s[1].map(|k| (k & 0x0f) << 4) + &s[2].map(|k| k >> 2),
            s[2].map(|k| (k & 0x03) << 6) + &s[3].map(|k| k),
        ];
        for (j, lc) in lcs.into_iter().enumerate() {
            out.push(Byte::from_lc(lc, bytes.map(|b| b[j])));
        }
    }
    Ok(out)
}
