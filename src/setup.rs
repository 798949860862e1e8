use std::{
    fs::{create_dir_all, File},
    io::{BufReader, Cursor, Write},
    path::Path,
    time::Instant,
};

use memmap2::MmapOptions;
use serde::{de::DeserializeOwned, Serialize};
use spartan2::{traits::snark::R1CSSNARKTrait, zk_spartan::R1CSSNARK};
use tracing::info;

use crate::{circuits::jwt_circuit::JwtCircuit, error::JwtError, E};

pub const JWT_PROVING_KEY: &str = "keys/jwt_proving.key";
pub const JWT_VERIFYING_KEY: &str = "keys/jwt_verifying.key";
pub const JWT_PROOF: &str = "keys/jwt_proof.bin";

pub type ProverKey = <R1CSSNARK<E> as R1CSSNARKTrait<E>>::ProverKey;
pub type VerifierKey = <R1CSSNARK<E> as R1CSSNARKTrait<E>>::VerifierKey;

fn save_bincode<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<(), JwtError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let bytes = bincode::serialize(value)?;
    File::create(path)?.write_all(&bytes)?;
    info!(bytes = bytes.len(), "Saved {} to: {}", what, path.display());
    Ok(())
}

fn load_mapped<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, JwtError> {
    let file = File::open(path)?;
    // SAFETY: key files are written once by `save_keys` and not modified while mapped.
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    let value = bincode::deserialize_from(Cursor::new(&mmap[..]))?;
    info!("Loaded {} from: {}", what, path.display());
    Ok(value)
}

pub fn save_keys<P: AsRef<Path>>(
    pk_path: P,
    vk_path: P,
    pk: &ProverKey,
    vk: &VerifierKey,
) -> Result<(), JwtError> {
    save_bincode(pk_path.as_ref(), pk, "ZK-Spartan proving key")?;
    save_bincode(vk_path.as_ref(), vk, "ZK-Spartan verifying key")
}

pub fn load_proving_key<P: AsRef<Path>>(pk_path: P) -> Result<ProverKey, JwtError> {
    load_mapped(pk_path.as_ref(), "ZK-Spartan proving key")
}

pub fn load_verifying_key<P: AsRef<Path>>(vk_path: P) -> Result<VerifierKey, JwtError> {
    load_mapped(vk_path.as_ref(), "ZK-Spartan verifying key")
}

pub fn save_proof<P: AsRef<Path>>(proof_path: P, proof: &R1CSSNARK<E>) -> Result<(), JwtError> {
    save_bincode(proof_path.as_ref(), proof, "ZK-Spartan proof")
}

pub fn load_proof<P: AsRef<Path>>(proof_path: P) -> Result<R1CSSNARK<E>, JwtError> {
    let path = proof_path.as_ref();
    let proof = bincode::deserialize_from(&mut BufReader::new(File::open(path)?))?;
    info!("Loaded ZK-Spartan proof from: {}", path.display());
    Ok(proof)
}

/// Generates keys for the circuit's shape without writing them anywhere.
pub fn setup_circuit_keys_no_save(
    circuit: &JwtCircuit,
) -> Result<(ProverKey, VerifierKey), JwtError> {
    let t0 = Instant::now();
    let keys = R1CSSNARK::<E>::setup(circuit.clone())?;
    let setup_ms = t0.elapsed().as_millis();
    info!(
        elapsed_ms = setup_ms,
        "Setup completed (~{:.1}s)",
        setup_ms as f64 / 1000.0
    );
    Ok(keys)
}

pub fn setup_circuit_keys<P: AsRef<Path>>(
    circuit: &JwtCircuit,
    pk_path: P,
    vk_path: P,
) -> Result<(), JwtError> {
    let (pk, vk) = setup_circuit_keys_no_save(circuit)?;
    save_keys(pk_path, vk_path, &pk, &vk)?;
    info!("Keys generated and saved successfully!");
    Ok(())
}
