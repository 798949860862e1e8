//! JSON input for the command line.

use std::{fs::File, io::BufReader, path::Path};

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    circuits::jwt_circuit::{ClaimSpec, ClaimValue},
    error::JwtError,
    inputs::{modulus_from_hex, modulus_from_jwk, redc_from_hex},
    jwt::{ClaimQuery, HashMode, JwtParams, PublicKeyMaterial},
};

pub const DEFAULT_MAX_SIGNED_DATA_LENGTH: usize = 900;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublicKeyConfig {
    /// `n` of an RSA JWK, base64url.
    Jwk {
        n: String,
        #[serde(default)]
        redc_hex: Option<String>,
    },
    Hex {
        modulus_hex: String,
        #[serde(default)]
        redc_hex: Option<String>,
    },
}

impl PublicKeyConfig {
    pub fn modulus(&self) -> Result<BigUint, JwtError> {
        match self {
            PublicKeyConfig::Jwk { n, .. } => modulus_from_jwk(n),
            PublicKeyConfig::Hex { modulus_hex, .. } => modulus_from_hex(modulus_hex),
        }
    }

    /// Modulus and reduction parameter. A supplied `redc_hex` must match the modulus.
    pub fn key_material(&self) -> Result<PublicKeyMaterial, JwtError> {
        let modulus = self.modulus()?;
        let (PublicKeyConfig::Jwk { redc_hex, .. } | PublicKeyConfig::Hex { redc_hex, .. }) = self;
        match redc_hex {
            Some(hex) => PublicKeyMaterial::new(modulus, redc_from_hex(hex)?),
            None => PublicKeyMaterial::from_modulus(modulus),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimConfig {
    String {
        key: String,
        scan_range: usize,
        max_value_length: usize,
        #[serde(default)]
        expected: Option<String>,
    },
    Number {
        key: String,
        scan_range: usize,
        max_value_length: usize,
        #[serde(default)]
        expected: Option<u64>,
    },
    Bool {
        key: String,
        scan_range: usize,
        #[serde(default)]
        expected: Option<bool>,
    },
}

impl ClaimConfig {
    pub fn to_spec(&self, params: &JwtParams) -> Result<ClaimSpec, JwtError> {
        let (query, expected) = match self {
            ClaimConfig::String {
                key,
                scan_range,
                max_value_length,
                expected,
            } => (
                ClaimQuery::string(key, *scan_range, *max_value_length, params)?,
                expected.clone().map(ClaimValue::String),
            ),
            ClaimConfig::Number {
                key,
                scan_range,
                max_value_length,
                expected,
            } => (
                ClaimQuery::number(key, *scan_range, *max_value_length, params)?,
                expected.map(ClaimValue::Number),
            ),
            ClaimConfig::Bool {
                key,
                scan_range,
                expected,
            } => (
                ClaimQuery::bool(key, *scan_range, params)?,
                expected.map(ClaimValue::Bool),
            ),
        };
        Ok(ClaimSpec { query, expected })
    }
}

fn default_max_signed_data_length() -> usize {
    DEFAULT_MAX_SIGNED_DATA_LENGTH
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JwtConfig {
    pub jwt: String,
    pub public_key: PublicKeyConfig,
    #[serde(default = "default_max_signed_data_length")]
    pub max_signed_data_length: usize,
    /// Hash the signed data up to the earliest of these keys outside the circuit.
    #[serde(default)]
    pub sha_precompute_till_keys: Option<Vec<String>>,
    #[serde(default)]
    pub claims: Vec<ClaimConfig>,
}

impl JwtConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, JwtError> {
        let path = path.as_ref();
        info!("Loading JWT config from {}", path.display());
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn precompute_keys(&self) -> &[String] {
        self.sha_precompute_till_keys.as_deref().unwrap_or(&[])
    }

    pub fn params(&self) -> JwtParams {
        let mode = if self.precompute_keys().is_empty() {
            HashMode::Fresh
        } else {
            HashMode::Resumed
        };
        JwtParams::new(self.max_signed_data_length, mode)
    }

    pub fn claim_specs(&self) -> Result<Vec<ClaimSpec>, JwtError> {
        let params = self.params();
        self.claims.iter().map(|c| c.to_spec(&params)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "jwt": "a.b.c",
        "public_key": { "modulus_hex": "ff" },
        "sha_precompute_till_keys": ["email"],
        "claims": [
            { "type": "string", "key": "email", "scan_range": 120, "max_value_length": 32,
              "expected": "alice@test.com" },
            { "type": "number", "key": "iat", "scan_range": 120, "max_value_length": 10 },
            { "type": "bool", "key": "admin", "scan_range": 120, "expected": true }
        ]
    }"#;

    #[test]
    fn parses_tagged_claims() {
        let config: JwtConfig = serde_json::from_str(CONFIG).unwrap();
        assert_eq!(config.max_signed_data_length, DEFAULT_MAX_SIGNED_DATA_LENGTH);
        assert_eq!(config.params().hash_mode, HashMode::Resumed);
        assert_eq!(config.public_key.modulus().unwrap(), BigUint::from(255u32));

        let specs = config.claim_specs().unwrap();
        assert_eq!(specs.len(), 3);
        assert_eq!(
            specs[0].expected,
            Some(ClaimValue::String("alice@test.com".into()))
        );
        assert_eq!(specs[1].expected, None);
        assert_eq!(specs[2].expected, Some(ClaimValue::Bool(true)));
    }

    #[test]
    fn rejects_bad_scan_range() {
        let config: JwtConfig = serde_json::from_str(
            r#"{ "jwt": "a.b.c", "public_key": { "n": "AQAB" },
                 "claims": [{ "type": "bool", "key": "admin", "scan_range": 121 }] }"#,
        )
        .unwrap();
        assert_eq!(config.params().hash_mode, HashMode::Fresh);
        assert!(matches!(
            config.claim_specs(),
            Err(JwtError::ScanRangeNotMultipleOfFour(121))
        ));
    }

    #[test]
    fn supplied_reduction_parameter_is_checked() {
        let n = (BigUint::from(1u8) << 2047u32) + 1u32;
        let redc = (BigUint::from(1u8) << 4100u32) / &n;
        let key = |redc: Option<&BigUint>| PublicKeyConfig::Hex {
            modulus_hex: n.to_str_radix(16),
            redc_hex: redc.map(|r| r.to_str_radix(16)),
        };

        let derived = key(None).key_material().unwrap();
        assert_eq!(derived.redc(), &redc);
        assert_eq!(key(Some(&redc)).key_material().unwrap(), derived);
        assert!(matches!(
            key(Some(&(&redc + 1u32))).key_material(),
            Err(JwtError::ReductionParameterMismatch)
        ));

        let parsed: PublicKeyConfig = serde_json::from_str(&format!(
            r#"{{ "modulus_hex": "{}", "redc_hex": "{}" }}"#,
            n.to_str_radix(16),
            (&redc - 1u32).to_str_radix(16)
        ))
        .unwrap();
        assert!(matches!(
            parsed.key_material(),
            Err(JwtError::ReductionParameterMismatch)
        ));
    }
}
