//! RSASSA-PKCS1-v1_5 with SHA-256 over a 2048-bit modulus.

use bellpepper_core::{boolean::Boolean, ConstraintSystem, LinearCombination, SynthesisError};
use ff::PrimeField;
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

use super::bignum::{biguint_to_field, BigNat, LIMB_BITS, MODULUS_BITS, PUBLIC_EXPONENT};

pub const MODULUS_BYTES: usize = MODULUS_BITS / 8;

/// DER prefix of `DigestInfo` for SHA-256.
pub const SHA256_DIGEST_INFO: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05,
    0x00, 0x04, 0x20,
];

const DIGEST_BYTES: usize = 32;
const LIMB_BYTES: usize = LIMB_BITS / 8;

/// `0x00 0x01 0xff.. 0x00 DigestInfo digest`, big-endian.
pub fn encoded_message(digest: &[u8; DIGEST_BYTES]) -> Vec<u8> {
    let pad = MODULUS_BYTES - 3 - SHA256_DIGEST_INFO.len() - DIGEST_BYTES;
    let mut em = Vec::with_capacity(MODULUS_BYTES);
    em.extend_from_slice(&[0x00, 0x01]);
    em.extend(std::iter::repeat(0xff).take(pad));
    em.push(0x00);
    em.extend_from_slice(&SHA256_DIGEST_INFO);
    em.extend_from_slice(digest);
    em
}

/// Checks `signature^65537 mod modulus` against the encoding of `SHA-256(message)`.
pub fn verify_native(message: &[u8], signature: &BigUint, modulus: &BigUint) -> bool {
    if signature >= modulus {
        return false;
    }
    let digest: [u8; DIGEST_BYTES] = Sha256::digest(message).into();
    let recovered = signature.modpow(&BigUint::from(PUBLIC_EXPONENT), modulus);
    recovered == BigUint::from_bytes_be(&encoded_message(&digest))
}

/// Enforces that `signature` is a valid signature of the message whose SHA-256 `digest` is
/// given as 32 bytes of little-endian bits.
pub fn enforce_signature<F: PrimeField, CS: ConstraintSystem<F>>(
    mut cs: CS,
    digest: &[Vec<Boolean>],
    signature: &BigNat<F>,
    modulus: &BigNat<F>,
    redc: Option<&BigUint>,
) -> Result<(), SynthesisError> {
    let recovered = signature.pow_65537(cs.namespace(|| "signature^e"), modulus, redc)?;
    enforce_encoded_message(cs.namespace(|| "encoding"), &recovered, digest)
}

/// Enforces `value == encoded_message(digest)` limb by limb.
///
/// The padding and `DigestInfo` bytes are constants, the digest bytes enter through their bits.
pub fn enforce_encoded_message<F: PrimeField, CS: ConstraintSystem<F>>(
    mut cs: CS,
    value: &BigNat<F>,
    digest: &[Vec<Boolean>],
) -> Result<(), SynthesisError> {
    assert_eq!(digest.len(), DIGEST_BYTES);

    let template = encoded_message(&[0; DIGEST_BYTES]);
    let one = CS::one();

    for (i, limb) in value.limbs().iter().enumerate() {
        // limb i holds bytes 15i..15i+15 counted from the least significant end
        let byte_at = |from_end: usize| {
            MODULUS_BYTES
                .checked_sub(1 + from_end)
                .and_then(|j| template.get(j).copied())
                .unwrap_or(0)
        };
        let constant = (0..LIMB_BYTES)
            .rev()
            .fold(BigUint::default(), |acc, k| {
                (acc << 8) + byte_at(i * LIMB_BYTES + k)
            });
        let mut expected =
            LinearCombination::<F>::zero() + (biguint_to_field::<F>(&constant), one);

        for (h, bits) in digest.iter().enumerate() {
            let from_end = DIGEST_BYTES - 1 - h;
            if from_end / LIMB_BYTES != i {
                continue;
            }
            let shift = 8 * (from_end % LIMB_BYTES);
            let mut coeff = biguint_to_field::<F>(&(BigUint::from(1u8) << shift));
            for bit in bits {
                expected = expected + &bit.lc(one, coeff);
                coeff = coeff.double();
            }
        }

        cs.enforce(
            || format!("limb {i}"),
            |lc| lc + limb - &expected,
            |lc| lc + one,
            |lc| lc,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gadgets::bytes::Byte, Scalar};
    use bellpepper_core::test_cs::TestConstraintSystem;

    fn alloc_digest(
        cs: &mut TestConstraintSystem<Scalar>,
        digest: &[u8; 32],
    ) -> Vec<Vec<Boolean>> {
        digest
            .iter()
            .enumerate()
            .map(|(i, b)| {
                Byte::<Scalar>::alloc_with_bits(cs.namespace(|| format!("digest {i}")), Some(*b))
                    .unwrap()
                    .1
            })
            .collect()
    }

    #[test]
    fn encoded_message_layout() {
        let em = encoded_message(&[0xab; 32]);
        assert_eq!(em.len(), MODULUS_BYTES);
        assert_eq!(&em[..2], &[0x00, 0x01]);
        assert!(em[2..204].iter().all(|b| *b == 0xff));
        assert_eq!(em[204], 0x00);
        assert_eq!(&em[205..224], &SHA256_DIGEST_INFO);
        assert_eq!(&em[224..], &[0xab; 32]);
    }

    #[test]
    fn encoding_constraint_accepts_matching_digest() {
        let digest: [u8; 32] = Sha256::digest(b"header.payload").into();
        let em = BigUint::from_bytes_be(&encoded_message(&digest));

        let mut cs = TestConstraintSystem::<Scalar>::new();
        let bits = alloc_digest(&mut cs, &digest);
        let em_var = BigNat::alloc(cs.namespace(|| "em"), Some(&em)).unwrap();
        enforce_encoded_message(cs.namespace(|| "check"), &em_var, &bits).unwrap();
        assert!(cs.is_satisfied());
    }

    #[test]
    fn encoding_constraint_rejects_other_digest() {
        let digest: [u8; 32] = Sha256::digest(b"header.payload").into();
        let em = BigUint::from_bytes_be(&encoded_message(&digest));
        let mut other = digest;
        other[31] ^= 1;

        let mut cs = TestConstraintSystem::<Scalar>::new();
        let bits = alloc_digest(&mut cs, &other);
        let em_var = BigNat::alloc(cs.namespace(|| "em"), Some(&em)).unwrap();
        enforce_encoded_message(cs.namespace(|| "check"), &em_var, &bits).unwrap();
        assert_eq!(cs.which_is_unsatisfied(), Some("check/limb 0"));
    }
}
