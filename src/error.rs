use bellpepper_core::SynthesisError;
use spartan2::errors::SpartanError;
use thiserror::Error;

/// Errors raised before any constraint is generated.
///
/// These are caller or configuration mistakes. A malicious witness never produces one of these:
/// it produces an unsatisfied constraint system instead.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("signed data is {len} bytes but the circuit capacity is {max}")]
    DataTooLong { len: usize, max: usize },

    #[error("scan range {0} is not a multiple of 4")]
    ScanRangeNotMultipleOfFour(usize),

    #[error("scan range {scan_range} exceeds the signed data capacity {max}")]
    ScanRangeTooLarge { scan_range: usize, max: usize },

    #[error("decode window {offset}..{end} runs past the {len} bytes of signed data")]
    ScanRangeExceedsData { offset: usize, end: usize, len: usize },

    #[error("claim value length {max_value_length} does not fit in a {scan_range} byte scan range")]
    ValueTooLong {
        max_value_length: usize,
        scan_range: usize,
    },

    #[error("numeric claims are limited to {max} digits, got {len}")]
    NumberTooLong { len: usize, max: usize },

    #[error("expected value for claim `{key}` is longer than its maximum length {max}")]
    ExpectedValueTooLong { key: String, max: usize },

    #[error("expected value for claim `{key}` is not a {kind:?}")]
    ExpectedKindMismatch {
        key: String,
        kind: crate::jwt::ClaimKind,
    },

    #[error("claim key must be a non-empty ASCII literal without quotes")]
    InvalidKey,

    #[error("base64 offset {offset} is invalid: {reason}")]
    InvalidOffset { offset: usize, reason: &'static str },

    #[error("full length {full_length} does not extend the {remaining} remaining bytes by whole blocks")]
    InvalidFullLength { full_length: usize, remaining: usize },

    #[error("circuit expects {expected:?} hashing but the inputs use {actual:?}")]
    HashModeMismatch {
        expected: crate::jwt::HashMode,
        actual: crate::jwt::HashMode,
    },

    #[error("malformed JWT: {0}")]
    MalformedJwt(&'static str),

    #[error("invalid base64url input")]
    InvalidBase64,

    #[error("signature must be {expected} bytes, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    #[error("modulus must be exactly 2048 bits, got {0}")]
    ModulusSize(u64),

    #[error("reduction parameter does not match the modulus")]
    ReductionParameterMismatch,

    #[error("RSA signature does not verify against the signed data")]
    InvalidSignature,

    #[error("none of the precompute keys occur in the payload")]
    KeyNotFound,

    #[error("precompute boundary {boundary} falls before the payload at {payload_start}")]
    PrecomputeBeforePayload {
        boundary: usize,
        payload_start: usize,
    },

    #[error("proof was made for a different public key")]
    PublicKeyMismatch,

    #[error("the circuit has no witness")]
    MissingInputs,

    #[error("circuit synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("spartan: {0}")]
    Spartan(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] bincode::Error),
}

impl From<SpartanError> for JwtError {
    fn from(err: SpartanError) -> Self {
        JwtError::Spartan(format!("{err:?}"))
    }
}
