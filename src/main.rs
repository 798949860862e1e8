//! CLI for the Spartan-2 JWT circuit.
//!
//! Usage examples:
//!   cargo run --release -- check --input demos/jwt.json
//!   cargo run --release -- run --input demos/jwt.json
//!   cargo run --release -- setup --input demos/jwt.json
//!   cargo run --release -- prove --input demos/jwt.json
//!   cargo run --release -- verify --input demos/jwt.json
//!
//! Keys and proofs live under `keys/`. `verify` only reads the public key from the input file.

use std::{env::args, path::PathBuf, process};

use jwt_spartan2::{
    check_circuit, generate_inputs_with_key, prove_circuit, run_circuit, setup_circuit_keys,
    verify_circuit, verify_signature_native, JwtCircuit, JwtConfig, JwtError, JWT_PROOF,
    JWT_PROVING_KEY, JWT_VERIFYING_KEY,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_INPUT: &str = "demos/jwt.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Check,
    Setup,
    Prove,
    Verify,
    Run,
}

#[derive(Debug, Clone)]
struct ParsedCommand {
    action: Action,
    input: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(true)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = args().collect();
    let command_args: &[String] = if args.len() > 1 { &args[1..] } else { &[] };

    let command = match parse_command(command_args) {
        Ok(cmd) => cmd,
        Err(err) => {
            eprintln!("Error: {}", err);
            print_usage();
            process::exit(1);
        }
    };

    if let Err(err) = execute(&command) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn execute(command: &ParsedCommand) -> Result<(), JwtError> {
    let config = JwtConfig::load(&command.input)?;

    match command.action {
        Action::Check => {
            let report = check_circuit(&load_circuit(&config)?)?;
            println!("constraints: {}", report.num_constraints);
            println!("public inputs: {}", report.num_inputs - 1);
            for (claim, value) in config.claims.iter().zip(&report.claims) {
                match value {
                    Some(value) => println!("claim {:?}: {}", claim_key(claim), value),
                    None => println!("claim {:?}: <unknown>", claim_key(claim)),
                }
            }
            match &report.unsatisfied {
                None => println!("satisfied"),
                Some(path) => {
                    println!("unsatisfied at {path}");
                    process::exit(2);
                }
            }
        }
        Action::Setup => {
            setup_circuit_keys(&load_circuit(&config)?, JWT_PROVING_KEY, JWT_VERIFYING_KEY)?;
            info!("Proving key: {}", JWT_PROVING_KEY);
            info!("Verifying key: {}", JWT_VERIFYING_KEY);
        }
        Action::Prove => {
            prove_circuit(&load_circuit(&config)?, JWT_PROVING_KEY, JWT_PROOF)?;
        }
        Action::Verify => {
            let modulus = config.public_key.modulus()?;
            verify_circuit(JWT_PROOF, JWT_VERIFYING_KEY, &modulus)?;
        }
        Action::Run => {
            run_circuit(&load_circuit(&config)?)?;
        }
    }
    Ok(())
}

fn claim_key(claim: &jwt_spartan2::ClaimConfig) -> &str {
    match claim {
        jwt_spartan2::ClaimConfig::String { key, .. }
        | jwt_spartan2::ClaimConfig::Number { key, .. }
        | jwt_spartan2::ClaimConfig::Bool { key, .. } => key,
    }
}

/// Builds the circuit with its witness. The signature is checked natively first so that a bad
/// token fails here rather than as an unsatisfied constraint.
fn load_circuit(config: &JwtConfig) -> Result<JwtCircuit, JwtError> {
    let key = config.public_key.key_material()?;
    verify_signature_native(&config.jwt, key.modulus())?;

    let params = config.params();
    let inputs = generate_inputs_with_key(
        &config.jwt,
        key,
        config.precompute_keys(),
        params.max_signed_data_length,
    )?;
    JwtCircuit::new(params, config.claim_specs()?, Some(inputs))
}

fn parse_command(args: &[String]) -> Result<ParsedCommand, String> {
    let Some(first) = args.first() else {
        return Err("Missing action".into());
    };

    let action = match first.as_str() {
        "check" => Action::Check,
        "setup" => Action::Setup,
        "prove" => Action::Prove,
        "verify" => Action::Verify,
        "run" => Action::Run,
        "-h" | "--help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            return Err(format!(
                "Unknown action '{other}'. Expected one of check|setup|prove|verify|run."
            ))
        }
    };

    Ok(ParsedCommand {
        action,
        input: parse_input(&args[1..])?,
    })
}

fn parse_input(args: &[String]) -> Result<PathBuf, String> {
    let mut input = PathBuf::from(DEFAULT_INPUT);
    let mut index = 0;

    while index < args.len() {
        let arg = &args[index];
        if arg == "--input" || arg == "-i" {
            index += 1;
            let value = args
                .get(index)
                .ok_or_else(|| "Missing value for --input".to_string())?;
            input = PathBuf::from(value);
        } else if let Some(value) = arg.strip_prefix("--input=") {
            if value.is_empty() {
                return Err("Missing value for --input".into());
            }
            input = PathBuf::from(value);
        } else if arg == "--help" || arg == "-h" {
            print_usage();
            process::exit(0);
        } else {
            return Err(format!("Unknown option '{arg}'"));
        }
        index += 1;
    }

    Ok(input)
}

fn print_usage() {
    eprintln!(
        "Usage:
  jwt-spartan2 <check|setup|prove|verify|run> [options]

Actions:
  check                Synthesize against the witness and report constraint count and claims
  setup                Generate proving and verifying keys
  prove                Generate proof
  verify               Verify proof against the configured public key
  run                  Setup, prove and verify in memory

Options:
  --input, -i <path>   JWT config JSON (default {DEFAULT_INPUT})

Set RUST_LOG=info for timings."
    );
}
