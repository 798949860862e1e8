//! RS256 JWT verification and claim extraction as a Spartan-2 circuit
//!
//! The circuit proves that a JWT carries a valid RSA-2048 / SHA-256 signature under a public
//! modulus, and asserts or extracts selected payload claims without revealing the rest of the
//! token. Constraints are written against bellpepper and proved with Spartan2's ZK-SNARK over
//! the Hyrax polynomial commitment scheme.

use spartan2::{provider::T256HyraxEngine, traits::Engine};

pub type E = T256HyraxEngine;
pub type Scalar = <E as Engine>::Scalar;

pub mod circuits;
pub mod config;
pub mod error;
pub mod gadgets;
pub mod inputs;
pub mod jwt;
pub mod prover;
pub mod setup;

pub use circuits::jwt_circuit::{public_modulus, ClaimSpec, ClaimValue, JwtCircuit};
pub use config::{ClaimConfig, JwtConfig, PublicKeyConfig};
pub use error::JwtError;
pub use gadgets::bignum::{biguint_from_limbs, limbs_from_biguint};
pub use inputs::{
    decode_base64url, generate_inputs, generate_inputs_with_key, modulus_from_hex,
    modulus_from_jwk, redc_from_hex, split_jwt, verify_signature_native,
};
pub use jwt::{
    ClaimKind, ClaimQuery, HashMode, HashState, JwtInputs, JwtParams, JwtVerifier,
    PublicKeyMaterial, VerifiedJwt,
};
pub use prover::{
    check_circuit, prove_circuit, prove_circuit_with_pk, run_circuit, verify_circuit,
    verify_circuit_with_loaded_data, CheckReport,
};
pub use setup::{
    load_proof, load_proving_key, load_verifying_key, save_keys, setup_circuit_keys,
    setup_circuit_keys_no_save, JWT_PROOF, JWT_PROVING_KEY, JWT_VERIFYING_KEY,
};
