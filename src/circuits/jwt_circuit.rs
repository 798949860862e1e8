use std::fmt;

use bellpepper_core::{num::AllocatedNum, ConstraintSystem, SynthesisError};
use ff::PrimeField;
use num_bigint::BigUint;
use spartan2::traits::circuit::SpartanCircuit;

use crate::{
    error::JwtError,
    gadgets::bignum::{biguint_to_field, limbs_from_biguint},
    jwt::{ClaimKind, ClaimQuery, JwtInputs, JwtParams, JwtVerifier},
    Scalar, E,
};

/// A claim value, either disclosed as an expectation or read back from the witness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimValue {
    String(String),
    Number(u64),
    Bool(bool),
}

impl fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimValue::String(s) => write!(f, "{s:?}"),
            ClaimValue::Number(n) => write!(f, "{n}"),
            ClaimValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// One claim of the circuit. With `expected` set the value is asserted, otherwise it is only
/// extracted and stays private.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimSpec {
    pub query: ClaimQuery,
    pub expected: Option<ClaimValue>,
}

/// RS256 JWT verification plus claim checks as a Spartan circuit.
///
/// The modulus limbs are the public inputs. Expected claim values are part of the circuit shape,
/// so keys generated for one set of expectations only verify proofs of the same set.
#[derive(Clone, Debug)]
pub struct JwtCircuit {
    params: JwtParams,
    claims: Vec<ClaimSpec>,
    inputs: Option<JwtInputs>,
}

impl JwtCircuit {
    /// `inputs` may be `None` to describe only the shape.
    pub fn new(
        params: JwtParams,
        claims: Vec<ClaimSpec>,
        inputs: Option<JwtInputs>,
    ) -> Result<Self, JwtError> {
        for spec in &claims {
            let query = &spec.query;
            if query.scan_range() > params.max_signed_data_length {
                return Err(JwtError::ScanRangeTooLarge {
                    scan_range: query.scan_range(),
                    max: params.max_signed_data_length,
                });
            }
            match (&spec.expected, query.kind()) {
                (None, _) => {}
                (Some(ClaimValue::String(s)), ClaimKind::String) => {
                    query.check_expected_len(s.len())?
                }
                (Some(ClaimValue::Number(_)), ClaimKind::Number)
                | (Some(ClaimValue::Bool(_)), ClaimKind::Bool) => {}
                _ => {
                    return Err(JwtError::ExpectedKindMismatch {
                        key: query.key().to_owned(),
                        kind: query.kind(),
                    })
                }
            }
        }

        if let Some(inputs) = &inputs {
            let actual = inputs.hash_state().mode();
            if actual != params.hash_mode {
                return Err(JwtError::HashModeMismatch {
                    expected: params.hash_mode,
                    actual,
                });
            }
            if inputs.data().len() > params.max_signed_data_length {
                return Err(JwtError::DataTooLong {
                    len: inputs.data().len(),
                    max: params.max_signed_data_length,
                });
            }
            for spec in &claims {
                inputs.check_scan_range(spec.query.scan_range())?;
            }
        }

        Ok(Self {
            params,
            claims,
            inputs,
        })
    }

    pub fn params(&self) -> &JwtParams {
        &self.params
    }

    pub fn claims(&self) -> &[ClaimSpec] {
        &self.claims
    }

    pub fn inputs(&self) -> Option<&JwtInputs> {
        self.inputs.as_ref()
    }

    /// Generates every constraint. Returns one value per claim: the expectation for asserted
    /// claims, the witness value for extracted ones when it is known.
    pub fn synthesize_jwt<F: PrimeField, CS: ConstraintSystem<F>>(
        &self,
        cs: &mut CS,
    ) -> Result<Vec<Option<ClaimValue>>, SynthesisError> {
        let verifier =
            JwtVerifier::alloc(cs.namespace(|| "jwt"), &self.params, self.inputs.as_ref())?;

        let limbs = self.inputs.as_ref().map(|inp| inp.key().modulus_limbs());
        for (i, limb) in verifier.modulus().limbs().iter().enumerate() {
            let value = limbs.as_ref().map(|l| biguint_to_field::<F>(&l[i]));
            let input = cs.alloc_input(
                || format!("modulus limb {i}"),
                || value.ok_or(SynthesisError::AssignmentMissing),
            )?;
            cs.enforce(
                || format!("public modulus limb {i}"),
                |lc| lc + input,
                |lc| lc + CS::one(),
                |lc| lc + limb,
            );
        }

        let mut jwt = verifier.verify(cs.namespace(|| "verify"))?;

        let mut values = Vec::with_capacity(self.claims.len());
        for (i, spec) in self.claims.iter().enumerate() {
            let cs = cs.namespace(|| format!("query {i}"));
            let query = &spec.query;
            let value = match &spec.expected {
                Some(expected) => {
                    match expected {
                        ClaimValue::String(s) => jwt.assert_claim_string(cs, query, s)?,
                        ClaimValue::Number(n) => jwt.assert_claim_number(cs, query, *n)?,
                        ClaimValue::Bool(b) => jwt.assert_claim_bool(cs, query, *b)?,
                    }
                    Some(expected.clone())
                }
                None => match query.kind() {
                    ClaimKind::String => jwt
                        .get_claim_string(cs, query)?
                        .get_value()
                        .map(|v| ClaimValue::String(String::from_utf8_lossy(&v).into_owned())),
                    ClaimKind::Number => jwt
                        .get_claim_number(cs, query)?
                        .get_value()
                        .map(ClaimValue::Number),
                    ClaimKind::Bool => jwt
                        .get_claim_bool(cs, query)?
                        .get_value()
                        .map(ClaimValue::Bool),
                },
            };
            values.push(value);
        }
        Ok(values)
    }
}

impl SpartanCircuit<E> for JwtCircuit {
    fn synthesize<CS: ConstraintSystem<Scalar>>(
        &self,
        cs: &mut CS,
        _: &[AllocatedNum<Scalar>],
        _: &[AllocatedNum<Scalar>],
        _: Option<&[Scalar]>,
    ) -> Result<(), SynthesisError> {
        self.synthesize_jwt(cs).map(|_| ())
    }

    // Mirrors the `alloc_input` calls in `synthesize_jwt`.
    fn public_values(&self) -> Result<Vec<Scalar>, SynthesisError> {
        let inputs = self
            .inputs
            .as_ref()
            .ok_or(SynthesisError::AssignmentMissing)?;
        Ok(public_modulus(inputs.key().modulus()))
    }

    fn shared<CS: ConstraintSystem<Scalar>>(
        &self,
        _cs: &mut CS,
    ) -> Result<Vec<AllocatedNum<Scalar>>, SynthesisError> {
        Ok(vec![])
    }

    fn precommitted<CS: ConstraintSystem<Scalar>>(
        &self,
        _cs: &mut CS,
        _shared: &[AllocatedNum<Scalar>],
    ) -> Result<Vec<AllocatedNum<Scalar>>, SynthesisError> {
        Ok(vec![])
    }

    fn num_challenges(&self) -> usize {
        0
    }
}

/// The public inputs of a proof made against `modulus`.
pub fn public_modulus(modulus: &BigUint) -> Vec<Scalar> {
    limbs_from_biguint(modulus)
        .iter()
        .map(biguint_to_field)
        .collect()
}
