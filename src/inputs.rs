//! Host-side preparation of circuit inputs from a compact JWT.

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use num_bigint::BigUint;
use sha2::digest::generic_array::GenericArray;
use tracing::{debug, info};

use crate::{
    error::JwtError,
    gadgets::{
        rsa::{verify_native, MODULUS_BYTES},
        sha256::{BLOCK_BYTES, IV},
        substring::first_occurrence,
    },
    jwt::{hint::key_needle, JwtInputs, PublicKeyMaterial},
};

/// The three dot-separated segments of a compact JWT.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JwtParts<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
}

impl JwtParts<'_> {
    /// `header.payload`, the bytes the signature covers.
    pub fn signed_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.header.len() + 1 + self.payload.len());
        data.extend_from_slice(self.header.as_bytes());
        data.push(b'.');
        data.extend_from_slice(self.payload.as_bytes());
        data
    }

    /// Index of the first payload character in the signed data.
    pub fn payload_start(&self) -> usize {
        self.header.len() + 1
    }
}

pub fn split_jwt(jwt: &str) -> Result<JwtParts<'_>, JwtError> {
    let mut parts = jwt.trim().split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(JwtError::MalformedJwt("expected three dot-separated segments"));
    };
    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(JwtError::MalformedJwt("empty segment"));
    }
    Ok(JwtParts {
        header,
        payload,
        signature,
    })
}

/// Decodes base64url, tolerating padding and the standard alphabet.
pub fn decode_base64url(encoded: &str) -> Result<Vec<u8>, JwtError> {
    if encoded.len() % 4 == 1 {
        return Err(JwtError::InvalidBase64);
    }

    let mut padded = encoded.to_string();
    match encoded.len() % 4 {
        2 => padded.push_str("=="),
        3 => padded.push('='),
        _ => {}
    }

    URL_SAFE_NO_PAD
        .decode(encoded.as_bytes())
        .or_else(|_| URL_SAFE.decode(padded.as_bytes()))
        .or_else(|_| STANDARD.decode(padded.as_bytes()))
        .map_err(|_| JwtError::InvalidBase64)
}

/// Modulus from the `n` member of an RSA JWK.
pub fn modulus_from_jwk(n: &str) -> Result<BigUint, JwtError> {
    Ok(BigUint::from_bytes_be(&decode_base64url(n)?))
}

pub fn modulus_from_hex(hex: &str) -> Result<BigUint, JwtError> {
    parse_hex(hex).ok_or(JwtError::MalformedJwt("modulus is not hex"))
}

/// A supplied reduction parameter `floor(2^4100 / n)`, hex encoded.
pub fn redc_from_hex(hex: &str) -> Result<BigUint, JwtError> {
    parse_hex(hex).ok_or(JwtError::MalformedJwt("reduction parameter is not hex"))
}

fn parse_hex(hex: &str) -> Option<BigUint> {
    let hex = hex.trim().trim_start_matches("0x");
    BigUint::parse_bytes(hex.as_bytes(), 16)
}

fn decode_signature(parts: &JwtParts<'_>) -> Result<BigUint, JwtError> {
    let bytes = decode_base64url(parts.signature)?;
    if bytes.len() != MODULUS_BYTES {
        return Err(JwtError::InvalidSignatureLength {
            expected: MODULUS_BYTES,
            actual: bytes.len(),
        });
    }
    Ok(BigUint::from_bytes_be(&bytes))
}

/// Checks the token's RS256 signature without any circuit.
pub fn verify_signature_native(jwt: &str, modulus: &BigUint) -> Result<(), JwtError> {
    let parts = split_jwt(jwt)?;
    let signature = decode_signature(&parts)?;
    if !verify_native(&parts.signed_data(), &signature, modulus) {
        return Err(JwtError::InvalidSignature);
    }
    Ok(())
}

/// Builds the witness for a token.
///
/// With an empty `precompute_keys` the whole signed data goes to the circuit. Otherwise every
/// whole 64-byte block before the earliest of the keys is hashed here, and the circuit resumes
/// from that state with a decode offset that realigns the remaining payload to base64 groups.
pub fn generate_inputs(
    jwt: &str,
    modulus: &BigUint,
    precompute_keys: &[String],
    max_signed_data_length: usize,
) -> Result<JwtInputs, JwtError> {
    let key = PublicKeyMaterial::from_modulus(modulus.clone())?;
    generate_inputs_with_key(jwt, key, precompute_keys, max_signed_data_length)
}

/// [`generate_inputs`] for key material whose reduction parameter was supplied and checked.
pub fn generate_inputs_with_key(
    jwt: &str,
    key: PublicKeyMaterial,
    precompute_keys: &[String],
    max_signed_data_length: usize,
) -> Result<JwtInputs, JwtError> {
    let parts = split_jwt(jwt)?;
    let signature = decode_signature(&parts)?;
    let signed = parts.signed_data();
    let payload_start = parts.payload_start();

    if precompute_keys.is_empty() {
        info!(data_len = signed.len(), "full hash inputs");
        return JwtInputs::full(
            signed,
            max_signed_data_length,
            payload_start,
            key,
            signature,
        );
    }

    let payload = decode_base64url(parts.payload)?;
    let key_index = precompute_keys
        .iter()
        .filter_map(|k| first_occurrence(&payload, &key_needle(k)))
        .min()
        .ok_or(JwtError::KeyNotFound)?;

    // base64 group holding the key, then the block boundary before it
    let group_start = payload_start + 4 * (key_index / 3);
    let slice_start = group_start / BLOCK_BYTES * BLOCK_BYTES;
    if slice_start < payload_start {
        return Err(JwtError::PrecomputeBeforePayload {
            boundary: slice_start,
            payload_start,
        });
    }

    let mut state = IV;
    let blocks: Vec<_> = signed[..slice_start]
        .chunks(BLOCK_BYTES)
        .map(GenericArray::clone_from_slice)
        .collect();
    sha2::compress256(&mut state, &blocks);

    let offset = (4 - (slice_start - payload_start) % 4) % 4;
    debug!(key_index, slice_start, offset, "precompute boundary");
    info!(
        data_len = signed.len(),
        precomputed = slice_start,
        "resumed hash inputs"
    );

    JwtInputs::partial(
        signed[slice_start..].to_vec(),
        max_signed_data_length,
        offset,
        key,
        signature,
        state,
        signed.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_rejects_wrong_segment_counts() {
        assert!(split_jwt("a.b").is_err());
        assert!(split_jwt("a.b.c.d").is_err());
        assert!(split_jwt("a..c").is_err());
        let parts = split_jwt("hdr.pay.sig").unwrap();
        assert_eq!(parts.signed_data(), b"hdr.pay".to_vec());
        assert_eq!(parts.payload_start(), 4);
    }

    #[test]
    fn base64url_with_and_without_padding() {
        assert_eq!(decode_base64url("eyJ9").unwrap(), b"{\"}".to_vec());
        assert_eq!(decode_base64url("YWI").unwrap(), b"ab".to_vec());
        assert_eq!(decode_base64url("YWI=").unwrap(), b"ab".to_vec());
        assert_eq!(decode_base64url("-_8").unwrap(), vec![0xfb, 0xff]);
        assert!(decode_base64url("YWJjZ").is_err());
    }

    #[test]
    fn hex_modulus() {
        assert_eq!(modulus_from_hex("0x0100").unwrap(), BigUint::from(256u32));
        assert!(modulus_from_hex("zz").is_err());
        assert_eq!(redc_from_hex("ff").unwrap(), BigUint::from(255u32));
        assert!(matches!(redc_from_hex("0xg1"), Err(JwtError::MalformedJwt(_))));
    }
}
