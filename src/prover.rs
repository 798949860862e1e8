use std::{path::Path, time::Instant};

use bellpepper_core::test_cs::TestConstraintSystem;
use num_bigint::BigUint;
use spartan2::zk_spartan::R1CSSNARK;
use tracing::{debug, info, warn};

use crate::{
    circuits::jwt_circuit::{public_modulus, ClaimValue, JwtCircuit},
    error::JwtError,
    setup::{
        load_proof, load_proving_key, load_verifying_key, save_proof,
        setup_circuit_keys_no_save, ProverKey, VerifierKey,
    },
    Scalar, E,
};

/// Outcome of synthesizing the circuit against its witness without proving.
#[derive(Debug)]
pub struct CheckReport {
    pub num_constraints: usize,
    pub num_inputs: usize,
    /// Path of the first unsatisfied constraint.
    pub unsatisfied: Option<String>,
    pub claims: Vec<Option<ClaimValue>>,
}

impl CheckReport {
    pub fn is_satisfied(&self) -> bool {
        self.unsatisfied.is_none()
    }
}

pub fn check_circuit(circuit: &JwtCircuit) -> Result<CheckReport, JwtError> {
    let t0 = Instant::now();
    let mut cs = TestConstraintSystem::<Scalar>::new();
    let claims = circuit.synthesize_jwt(&mut cs)?;
    let unsatisfied = cs.which_is_unsatisfied().map(str::to_owned);
    let report = CheckReport {
        num_constraints: cs.num_constraints(),
        num_inputs: cs.num_inputs(),
        unsatisfied,
        claims,
    };
    info!(
        elapsed_ms = t0.elapsed().as_millis(),
        constraints = report.num_constraints,
        satisfied = report.is_satisfied(),
        "Constraint check"
    );
    Ok(report)
}

/// Proves with an already loaded proving key.
pub fn prove_circuit_with_pk(
    circuit: &JwtCircuit,
    pk: &ProverKey,
) -> Result<R1CSSNARK<E>, JwtError> {
    let t0 = Instant::now();
    let mut prep_snark = R1CSSNARK::<E>::prep_prove(pk, circuit.clone(), false)?;
    let prep_ms = t0.elapsed().as_millis();
    info!(elapsed_ms = prep_ms, "ZK-Spartan prep_prove");

    let t0 = Instant::now();
    let proof = R1CSSNARK::<E>::prove(pk, circuit.clone(), &mut prep_snark, false)?;
    let prove_ms = t0.elapsed().as_millis();
    info!(elapsed_ms = prove_ms, "ZK-Spartan prove");

    info!(
        "ZK-Spartan prep_prove: ({} ms) + prove: ({} ms) = TOTAL: {} ms",
        prep_ms,
        prove_ms,
        prep_ms + prove_ms
    );
    Ok(proof)
}

/// Verifies a proof and checks it was made against `modulus`.
pub fn verify_circuit_with_loaded_data(
    proof: &R1CSSNARK<E>,
    vk: &VerifierKey,
    modulus: &BigUint,
) -> Result<(), JwtError> {
    let t0 = Instant::now();
    let public_values = proof.verify(vk)?;
    let verify_ms = t0.elapsed().as_millis();
    info!(elapsed_ms = verify_ms, "ZK-Spartan verify");

    if public_values != public_modulus(modulus) {
        warn!("Proof verifies but was made for a different public key");
        return Err(JwtError::PublicKeyMismatch);
    }
    Ok(())
}

/// Setup, prove and verify in memory.
pub fn run_circuit(circuit: &JwtCircuit) -> Result<(), JwtError> {
    let inputs = circuit.inputs().ok_or(JwtError::MissingInputs)?;
    let (pk, vk) = setup_circuit_keys_no_save(circuit)?;
    let proof = prove_circuit_with_pk(circuit, &pk)?;
    verify_circuit_with_loaded_data(&proof, &vk, inputs.key().modulus())?;
    debug!(claims = circuit.claims().len(), "ZK-Spartan run complete");
    Ok(())
}

pub fn prove_circuit<P: AsRef<Path>>(
    circuit: &JwtCircuit,
    pk_path: P,
    proof_path: P,
) -> Result<(), JwtError> {
    let t0 = Instant::now();
    let pk = load_proving_key(pk_path)?;
    info!(elapsed_ms = t0.elapsed().as_millis(), "ZK-Spartan load proving key");

    let proof = prove_circuit_with_pk(circuit, &pk)?;
    save_proof(proof_path, &proof)
}

pub fn verify_circuit<P: AsRef<Path>>(
    proof_path: P,
    vk_path: P,
    modulus: &BigUint,
) -> Result<(), JwtError> {
    let proof = load_proof(proof_path)?;
    let vk = load_verifying_key(vk_path)?;
    verify_circuit_with_loaded_data(&proof, &vk, modulus)?;
    info!("Verification successful!");
    Ok(())
}
