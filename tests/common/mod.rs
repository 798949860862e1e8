#![allow(dead_code)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hex_literal::hex;
use num_bigint::BigUint;
use rsa::{
    sha2::{Digest, Sha256},
    traits::PublicKeyParts,
    BigUint as RsaBigUint, Pkcs1v15Sign, RsaPrivateKey,
};

pub const HEADER: &str = r#"{"alg":"RS256","typ":"JWT"}"#;

pub const PAYLOAD: &str = r#"{"iss":"http://test.com","sub":"alice","email":"alice@test.com","iat":1736574240,"admin":true,"jti":"5f2a"}"#;

/// Fits the 180 bytes of signed data `PAYLOAD` produces.
pub const MAX_SIGNED_DATA_LENGTH: usize = 192;

/// Deterministic 2048-bit key.
pub fn test_key() -> RsaPrivateKey {
    let p = RsaBigUint::from_bytes_be(&hex!(
        "c8b4e97508c3d0fad0062e8ee475909d5315bc9433e9b8a174a52b8f024e7d6b"
        "ea80a56901555021b2d44f727aa287b84de8bac5ceef88d03b259f8ac91bda42"
        "e653e27596d8090e08e9dac47dcd288e1c0e95ac74d7428cd0479c8514bc3538"
        "7380a480873c7f519ece6f5ea4356c81bd7ec31c126c1f097b84bb33c8acd565"
    ));
    let q = RsaBigUint::from_bytes_be(&hex!(
        "efffcc7f550f977db26971fb6a0f036d61cccde351c394fe177cd36a0a7dde60"
        "8cd263d8ca382031fc0f16bef5ebb2125ab1b8e837c71c006a8639c090a7ebac"
        "530de579bca2ea7ad175c8a31d45078130e0ad15cf23139d230f30c106259c7a"
        "55024f4e51a97b1b38b7ed4dfe05a0706bf53a067e7f0ee18dc685b53300708b"
    ));
    let e = RsaBigUint::from(65537u32);
    RsaPrivateKey::from_p_q(p, q, e).expect("valid key")
}

pub fn modulus(key: &RsaPrivateKey) -> BigUint {
    BigUint::from_bytes_be(&key.n().to_bytes_be())
}

/// Compact RS256 token over the given JSON header and payload.
pub fn sign_jwt(key: &RsaPrivateKey, header: &str, payload: &str) -> String {
    let signed = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let digest = Sha256::digest(signed.as_bytes());
    let signature = key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .expect("failed to sign");
    format!("{signed}.{}", URL_SAFE_NO_PAD.encode(signature))
}

pub fn test_jwt() -> (String, BigUint) {
    let key = test_key();
    (sign_jwt(&key, HEADER, PAYLOAD), modulus(&key))
}
