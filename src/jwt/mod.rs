//! RS256 JWT verification inside the circuit.
//!
//! [`JwtVerifier::alloc`] places the signed data, key and signature in the constraint system.
//! [`JwtVerifier::verify`] hashes the data, checks the signature and hands back a
//! [`VerifiedJwt`], which is the only type that can extract claims. A token whose signature was
//! never checked therefore cannot be queried.

pub mod claims;
pub mod hint;

use std::collections::HashMap;

use bellpepper_core::{boolean::Boolean, ConstraintSystem, SynthesisError};
use ff::PrimeField;
use num_bigint::BigUint;
use num_traits::One;

use crate::{
    error::JwtError,
    gadgets::{
        bignum::{limbs_from_biguint, BigNat, MODULUS_BITS, REDC_SHIFT},
        bytes::{
            alloc_bits_le, enforce_zero, index_bits, pack_bits_le, Byte, LengthMask, Position,
        },
        rsa::{self, MODULUS_BYTES},
        sha256::{self, InitialState, Word32, BLOCK_BYTES},
    },
};

pub use claims::{ClaimKind, ClaimNumber, ClaimQuery, ClaimString};

/// Width of the full message length in resumed mode.
pub const FULL_LENGTH_BITS: usize = 32;

/// Decode offsets in resumed mode realign to a 4-character group, so they are below 4.
pub const RESUMED_OFFSET_BITS: usize = 2;

/// How the SHA-256 of the signed data starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashMode {
    Fresh,
    Resumed,
}

/// Shape of the circuit. Everything here is fixed at setup time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JwtParams {
    pub max_signed_data_length: usize,
    pub hash_mode: HashMode,
}

impl JwtParams {
    pub fn new(max_signed_data_length: usize, hash_mode: HashMode) -> Self {
        Self {
            max_signed_data_length,
            hash_mode,
        }
    }

    pub fn offset_bits(&self) -> usize {
        match self.hash_mode {
            HashMode::Fresh => index_bits(self.max_signed_data_length),
            HashMode::Resumed => RESUMED_OFFSET_BITS,
        }
    }

    fn length_bits(&self) -> usize {
        index_bits(self.max_signed_data_length + 1)
    }
}

/// Where the in-circuit hash picks up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashState {
    /// The buffer is the whole signed data.
    Fresh,
    /// The buffer is what remains after `full_length - buffer.len()` bytes were hashed into
    /// `partial`.
    Resumed {
        partial: [u32; 8],
        full_length: usize,
    },
}

impl HashState {
    pub fn mode(&self) -> HashMode {
        match self {
            HashState::Fresh => HashMode::Fresh,
            HashState::Resumed { .. } => HashMode::Resumed,
        }
    }
}

/// An RSA-2048 modulus and its reduction parameter `floor(2^4100 / n)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyMaterial {
    modulus: BigUint,
    redc: BigUint,
}

impl PublicKeyMaterial {
    /// Computes the reduction parameter for `modulus`.
    pub fn from_modulus(modulus: BigUint) -> Result<Self, JwtError> {
        if modulus.bits() != MODULUS_BITS as u64 {
            return Err(JwtError::ModulusSize(modulus.bits()));
        }
        let redc = (BigUint::one() << REDC_SHIFT) / &modulus;
        Ok(Self { modulus, redc })
    }

    /// Accepts a supplied reduction parameter after checking it against the modulus.
    pub fn new(modulus: BigUint, redc: BigUint) -> Result<Self, JwtError> {
        let key = Self::from_modulus(modulus)?;
        if key.redc != redc {
            return Err(JwtError::ReductionParameterMismatch);
        }
        Ok(key)
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn redc(&self) -> &BigUint {
        &self.redc
    }

    pub fn modulus_limbs(&self) -> Vec<BigUint> {
        limbs_from_biguint(&self.modulus)
    }
}

/// Witness for one proof.
#[derive(Clone, Debug)]
pub struct JwtInputs {
    data: Vec<u8>,
    base64_offset: usize,
    key: PublicKeyMaterial,
    signature: BigUint,
    hash_state: HashState,
}

impl JwtInputs {
    /// The whole `header.payload` is hashed in the circuit. `base64_offset` is where claim
    /// decoding starts, normally the first payload character.
    pub fn full(
        data: Vec<u8>,
        max_signed_data_length: usize,
        base64_offset: usize,
        key: PublicKeyMaterial,
        signature: BigUint,
    ) -> Result<Self, JwtError> {
        check_data_len(&data, max_signed_data_length)?;
        if base64_offset >= data.len() {
            return Err(JwtError::InvalidOffset {
                offset: base64_offset,
                reason: "past the end of the signed data",
            });
        }
        check_signature(&signature)?;
        Ok(Self {
            data,
            base64_offset,
            key,
            signature,
            hash_state: HashState::Fresh,
        })
    }

    /// Only `remaining` is hashed in the circuit, continuing from `partial_hash`. The padding
    /// encodes `full_length`, the length of the whole signed data.
    pub fn partial(
        remaining: Vec<u8>,
        max_signed_data_length: usize,
        base64_offset: usize,
        key: PublicKeyMaterial,
        signature: BigUint,
        partial_hash: [u32; 8],
        full_length: usize,
    ) -> Result<Self, JwtError> {
        check_data_len(&remaining, max_signed_data_length)?;
        if base64_offset >= 1 << RESUMED_OFFSET_BITS {
            return Err(JwtError::InvalidOffset {
                offset: base64_offset,
                reason: "resumed hashing realigns by at most 3 characters",
            });
        }
        let hashed = full_length.checked_sub(remaining.len());
        let whole_blocks = hashed.is_some_and(|h| h % BLOCK_BYTES == 0);
        if !whole_blocks || full_length >> FULL_LENGTH_BITS != 0 {
            return Err(JwtError::InvalidFullLength {
                full_length,
                remaining: remaining.len(),
            });
        }
        check_signature(&signature)?;
        Ok(Self {
            data: remaining,
            base64_offset,
            key,
            signature,
            hash_state: HashState::Resumed {
                partial: partial_hash,
                full_length,
            },
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn base64_offset(&self) -> usize {
        self.base64_offset
    }

    pub fn key(&self) -> &PublicKeyMaterial {
        &self.key
    }

    pub fn signature(&self) -> &BigUint {
        &self.signature
    }

    pub fn hash_state(&self) -> &HashState {
        &self.hash_state
    }

    /// Checks that a decode window of `scan_range` characters fits in the buffer.
    pub fn check_scan_range(&self, scan_range: usize) -> Result<(), JwtError> {
        let end = self.base64_offset + scan_range;
        if end > self.data.len() {
            return Err(JwtError::ScanRangeExceedsData {
                offset: self.base64_offset,
                end,
                len: self.data.len(),
            });
        }
        Ok(())
    }
}

fn check_data_len(data: &[u8], max: usize) -> Result<(), JwtError> {
    if data.len() > max {
        return Err(JwtError::DataTooLong {
            len: data.len(),
            max,
        });
    }
    Ok(())
}

fn check_signature(signature: &BigUint) -> Result<(), JwtError> {
    if signature.bits() > MODULUS_BITS as u64 {
        return Err(JwtError::InvalidSignatureLength {
            expected: MODULUS_BYTES,
            actual: signature.bits().div_ceil(8) as usize,
        });
    }
    Ok(())
}

enum HashVars {
    Fresh,
    Resumed {
        partial: Vec<Word32>,
        full_length_bits: Vec<Boolean>,
    },
}

/// The allocated, not yet verified token.
pub struct JwtVerifier<F: PrimeField> {
    params: JwtParams,
    data: Vec<Byte<F>>,
    data_bits: Vec<Vec<Boolean>>,
    mask: LengthMask<F>,
    offset: Position<F>,
    modulus: BigNat<F>,
    signature: BigNat<F>,
    redc: Option<BigUint>,
    hash: HashVars,
}

impl<F: PrimeField> JwtVerifier<F> {
    /// Allocates every witness. `inputs` is `None` while the circuit shape is being extracted.
    pub fn alloc<CS: ConstraintSystem<F>>(
        mut cs: CS,
        params: &JwtParams,
        inputs: Option<&JwtInputs>,
    ) -> Result<Self, SynthesisError> {
        if let Some(inputs) = inputs {
            if inputs.hash_state.mode() != params.hash_mode {
                return Err(SynthesisError::Unsatisfiable);
            }
        }

        let capacity = params.max_signed_data_length;
        let mut data = Vec::with_capacity(capacity);
        let mut data_bits = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let value = inputs.map(|inp| inp.data.get(i).copied().unwrap_or(0));
            let (byte, bits) =
                Byte::alloc_with_bits(cs.namespace(|| format!("data {i}")), value)?;
            data.push(byte);
            data_bits.push(bits);
        }

        let mask = LengthMask::alloc(
            cs.namespace(|| "data length"),
            inputs.map(|inp| inp.data.len()),
            capacity,
        )?;
        let offset = Position::alloc(
            cs.namespace(|| "base64 offset"),
            inputs.map(|inp| inp.base64_offset),
            params.offset_bits(),
        )?;
        let modulus = BigNat::alloc(
            cs.namespace(|| "modulus"),
            inputs.map(|inp| inp.key.modulus()),
        )?;
        let signature = BigNat::alloc(
            cs.namespace(|| "signature"),
            inputs.map(|inp| &inp.signature),
        )?;

        let hash = match params.hash_mode {
            HashMode::Fresh => HashVars::Fresh,
            HashMode::Resumed => {
                let (partial, full_length) = match inputs.map(|inp| &inp.hash_state) {
                    Some(HashState::Resumed {
                        partial,
                        full_length,
                    }) => (Some(*partial), Some(*full_length)),
                    _ => (None, None),
                };
                let words = (0..8)
                    .map(|i| {
                        Word32::alloc(
                            cs.namespace(|| format!("partial hash {i}")),
                            partial.map(|p| p[i]),
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let full_length_bits = alloc_bits_le(
                    cs.namespace(|| "full length"),
                    full_length.map(|l| l as u64),
                    FULL_LENGTH_BITS,
                )?;
                HashVars::Resumed {
                    partial: words,
                    full_length_bits,
                }
            }
        };

        Ok(Self {
            params: params.clone(),
            data,
            data_bits,
            mask,
            offset,
            modulus,
            signature,
            redc: inputs.map(|inp| inp.key.redc().clone()),
            hash,
        })
    }

    /// The allocated modulus, for binding it to public inputs.
    pub fn modulus(&self) -> &BigNat<F> {
        &self.modulus
    }

    /// Hashes the signed data and checks the RSA signature over it.
    pub fn verify<CS: ConstraintSystem<F>>(
        self,
        mut cs: CS,
    ) -> Result<VerifiedJwt<F>, SynthesisError> {
        self.mask.enforce_zero_tail(cs.namespace(|| "zero tail"), &self.data)?;

        let state = match &self.hash {
            HashVars::Fresh => {
                let len_bits = alloc_bits_le(
                    cs.namespace(|| "length bits"),
                    self.mask.get_value().map(|l| l as u64),
                    self.params.length_bits(),
                )?;
                enforce_zero(
                    &mut cs.namespace(|| "length decomposition"),
                    "packed",
                    pack_bits_le(CS::one(), &len_bits) - &self.mask.length_lc(),
                );
                sha256::sha256_var(
                    cs.namespace(|| "sha256"),
                    &self.data_bits,
                    &self.mask,
                    &len_bits,
                    InitialState::Fresh,
                )?
            }
            HashVars::Resumed {
                partial,
                full_length_bits,
            } => sha256::sha256_var(
                cs.namespace(|| "sha256"),
                &self.data_bits,
                &self.mask,
                full_length_bits,
                InitialState::Resumed(partial),
            )?,
        };

        rsa::enforce_signature(
            cs.namespace(|| "rsa"),
            &sha256::digest_bytes(&state),
            &self.signature,
            &self.modulus,
            self.redc.as_ref(),
        )?;

        Ok(VerifiedJwt {
            params: self.params,
            data: self.data,
            offset: self.offset,
            windows: HashMap::new(),
            claims: 0,
        })
    }
}

/// A token whose signature holds. Claims are read from here.
pub struct VerifiedJwt<F: PrimeField> {
    params: JwtParams,
    data: Vec<Byte<F>>,
    offset: Position<F>,
    /// Decoded payload windows by scan range.
    windows: HashMap<usize, Vec<Byte<F>>>,
    claims: usize,
}

impl<F: PrimeField> VerifiedJwt<F> {
    pub fn params(&self) -> &JwtParams {
        &self.params
    }
}
