mod common;

use common::{modulus, sign_jwt, test_jwt, test_key, HEADER, MAX_SIGNED_DATA_LENGTH, PAYLOAD};
use jwt_spartan2::{
    check_circuit, decode_base64url, generate_inputs, split_jwt, verify_signature_native,
    CheckReport, ClaimQuery, ClaimSpec, ClaimValue, HashMode, HashState, JwtCircuit, JwtError,
    JwtInputs, JwtParams, PublicKeyMaterial,
};
use num_bigint::BigUint;

const SCAN_RANGE: usize = 128;

fn fresh_params() -> JwtParams {
    JwtParams::new(MAX_SIGNED_DATA_LENGTH, HashMode::Fresh)
}

fn email(params: &JwtParams, expected: Option<&str>) -> ClaimSpec {
    ClaimSpec {
        query: ClaimQuery::string("email", SCAN_RANGE, 32, params).unwrap(),
        expected: expected.map(|e| ClaimValue::String(e.into())),
    }
}

fn iat(params: &JwtParams, expected: Option<u64>) -> ClaimSpec {
    ClaimSpec {
        query: ClaimQuery::number("iat", SCAN_RANGE, 10, params).unwrap(),
        expected: expected.map(ClaimValue::Number),
    }
}

fn admin(params: &JwtParams, expected: Option<bool>) -> ClaimSpec {
    ClaimSpec {
        query: ClaimQuery::bool("admin", SCAN_RANGE, params).unwrap(),
        expected: expected.map(ClaimValue::Bool),
    }
}

fn check(params: JwtParams, claims: Vec<ClaimSpec>, inputs: JwtInputs) -> CheckReport {
    let circuit = JwtCircuit::new(params, claims, Some(inputs)).unwrap();
    check_circuit(&circuit).unwrap()
}

/// Inputs for the signed data of `jwt` with arbitrary tampering applied.
fn raw_inputs(
    jwt: &str,
    modulus: BigUint,
    tamper: impl FnOnce(&mut Vec<u8>, &mut BigUint, &mut usize),
) -> JwtInputs {
    let parts = split_jwt(jwt).unwrap();
    let mut data = parts.signed_data();
    let mut signature = BigUint::from_bytes_be(&decode_base64url(parts.signature).unwrap());
    let mut offset = parts.payload_start();
    tamper(&mut data, &mut signature, &mut offset);
    JwtInputs::full(
        data,
        MAX_SIGNED_DATA_LENGTH,
        offset,
        PublicKeyMaterial::from_modulus(modulus).unwrap(),
        signature,
    )
    .unwrap()
}

fn assert_unsatisfied_at(report: &CheckReport, fragment: &str) {
    let path = report
        .unsatisfied
        .as_deref()
        .expect("constraint system should be unsatisfied");
    assert!(path.contains(fragment), "unsatisfied at {path}");
}

#[test]
fn full_token_with_claims() {
    let (jwt, n) = test_jwt();
    let params = fresh_params();
    let inputs = generate_inputs(&jwt, &n, &[], MAX_SIGNED_DATA_LENGTH).unwrap();

    let report = check(
        params.clone(),
        vec![
            email(&params, Some("alice@test.com")),
            iat(&params, None),
            admin(&params, None),
        ],
        inputs,
    );

    assert_eq!(report.unsatisfied, None);
    // ONE plus the 18 modulus limbs
    assert_eq!(report.num_inputs, 19);
    assert_eq!(
        report.claims,
        vec![
            Some(ClaimValue::String("alice@test.com".into())),
            Some(ClaimValue::Number(1736574240)),
            Some(ClaimValue::Bool(true)),
        ]
    );
}

#[test]
fn precomputed_prefix() {
    let (jwt, n) = test_jwt();
    let params = JwtParams::new(128, HashMode::Resumed);
    let inputs = generate_inputs(&jwt, &n, &["email".to_string()], 128).unwrap();
    assert!(inputs.base64_offset() < 4);
    assert!(inputs.data().len() < 180);

    let claims = vec![
        ClaimSpec {
            query: ClaimQuery::string("email", 112, 32, &params).unwrap(),
            expected: None,
        },
        ClaimSpec {
            query: ClaimQuery::number("iat", 112, 10, &params).unwrap(),
            expected: Some(ClaimValue::Number(1736574240)),
        },
        ClaimSpec {
            query: ClaimQuery::bool("admin", 112, &params).unwrap(),
            expected: Some(ClaimValue::Bool(true)),
        },
    ];
    let report = check(params, claims, inputs);

    assert_eq!(report.unsatisfied, None);
    assert_eq!(
        report.claims[0],
        Some(ClaimValue::String("alice@test.com".into()))
    );
}

#[test]
fn repeated_and_reordered_queries_agree() {
    let (jwt, n) = test_jwt();
    let params = fresh_params();
    let inputs = generate_inputs(&jwt, &n, &[], MAX_SIGNED_DATA_LENGTH).unwrap();

    let report = check(
        params.clone(),
        vec![
            admin(&params, None),
            iat(&params, None),
            email(&params, None),
            iat(&params, Some(1736574240)),
        ],
        inputs,
    );

    assert_eq!(report.unsatisfied, None);
    assert_eq!(report.claims[0], Some(ClaimValue::Bool(true)));
    assert_eq!(report.claims[1], Some(ClaimValue::Number(1736574240)));
    assert_eq!(report.claims[1], report.claims[3]);
    assert_eq!(
        report.claims[2],
        Some(ClaimValue::String("alice@test.com".into()))
    );
}

#[test]
fn tampered_payload_fails_signature() {
    let (jwt, n) = test_jwt();
    let inputs = raw_inputs(&jwt, n, |data, _, _| {
        // stays a base64 character
        let last = data.len() - 1;
        data[last] = if data[last] == b'A' { b'B' } else { b'A' };
    });

    let report = check(fresh_params(), vec![], inputs);
    assert_unsatisfied_at(&report, "verify/rsa");
}

#[test]
fn tampered_signature_fails() {
    let (jwt, n) = test_jwt();
    let inputs = raw_inputs(&jwt, n, |_, signature, _| *signature += 1u32);

    let report = check(fresh_params(), vec![], inputs);
    assert_unsatisfied_at(&report, "verify/rsa");
}

#[test]
fn other_modulus_fails() {
    let (jwt, n) = test_jwt();
    let inputs = raw_inputs(&jwt, n + 2u32, |_, _, _| {});

    let report = check(fresh_params(), vec![], inputs);
    assert_unsatisfied_at(&report, "verify/rsa");
}

#[test]
fn wrong_expected_string_fails() {
    let (jwt, n) = test_jwt();
    let params = fresh_params();
    let inputs = generate_inputs(&jwt, &n, &[], MAX_SIGNED_DATA_LENGTH).unwrap();

    let report = check(
        params.clone(),
        vec![email(&params, Some("bob@test.com"))],
        inputs,
    );
    assert_unsatisfied_at(&report, "query 0");
}

#[test]
fn wrong_expected_number_fails() {
    let (jwt, n) = test_jwt();
    let params = fresh_params();
    let inputs = generate_inputs(&jwt, &n, &[], MAX_SIGNED_DATA_LENGTH).unwrap();

    let report = check(params.clone(), vec![iat(&params, Some(1736574241))], inputs);
    assert_unsatisfied_at(&report, "expected number");
}

#[test]
fn wrong_expected_bool_fails() {
    let (jwt, n) = test_jwt();
    let params = fresh_params();
    let inputs = generate_inputs(&jwt, &n, &[], MAX_SIGNED_DATA_LENGTH).unwrap();

    let report = check(params.clone(), vec![admin(&params, Some(false))], inputs);
    assert_unsatisfied_at(&report, "expected bool");
}

#[test]
fn non_digit_inside_number_is_rejected() {
    let key = test_key();
    let payload = PAYLOAD.replace("1736574240", "17365x4240");
    let jwt = sign_jwt(&key, HEADER, &payload);
    let n = modulus(&key);
    let params = fresh_params();
    let inputs = generate_inputs(&jwt, &n, &[], MAX_SIGNED_DATA_LENGTH).unwrap();

    let report = check(params.clone(), vec![iat(&params, None)], inputs);
    assert_unsatisfied_at(&report, "parse/digit 5/digit");
}

#[test]
fn number_above_u64_is_rejected() {
    let key = test_key();
    let payload = r#"{"iss":"http://test.com","sub":"alice","email":"alice@test.com","iat":99999999999999999999,"admin":true}"#;
    let jwt = sign_jwt(&key, HEADER, payload);
    let n = modulus(&key);
    let params = fresh_params();
    let inputs = generate_inputs(&jwt, &n, &[], MAX_SIGNED_DATA_LENGTH).unwrap();

    let wide = ClaimSpec {
        query: ClaimQuery::number("iat", SCAN_RANGE, 20, &params).unwrap(),
        expected: None,
    };
    let report = check(params, vec![wide], inputs);
    assert_unsatisfied_at(&report, "fits u64");
    assert_eq!(report.claims, vec![None]);
}

#[test]
fn misaligned_resumed_offset_hides_claims() {
    let (jwt, n) = test_jwt();
    let params = JwtParams::new(128, HashMode::Resumed);
    let inputs = generate_inputs(&jwt, &n, &["email".to_string()], 128).unwrap();
    let HashState::Resumed {
        partial,
        full_length,
    } = inputs.hash_state().clone()
    else {
        panic!("expected resumed inputs");
    };

    for offset in (0..4).filter(|o| *o != inputs.base64_offset()) {
        let shifted = JwtInputs::partial(
            inputs.data().to_vec(),
            128,
            offset,
            inputs.key().clone(),
            inputs.signature().clone(),
            partial,
            full_length,
        )
        .unwrap();
        let email = ClaimSpec {
            query: ClaimQuery::string("email", 112, 32, &params).unwrap(),
            expected: None,
        };
        let report = check(params.clone(), vec![email], shifted);
        assert_unsatisfied_at(&report, "key found");
    }
}

#[test]
fn misaligned_offset_hides_claims() {
    let (jwt, n) = test_jwt();
    let params = fresh_params();
    let inputs = raw_inputs(&jwt, n, |_, _, offset| *offset += 1);

    let report = check(params.clone(), vec![email(&params, None)], inputs);
    assert_unsatisfied_at(&report, "key found");
}

#[test]
fn quoted_number_is_rejected() {
    let key = test_key();
    let payload = r#"{"iss":"http://test.com","sub":"alice","email":"alice@test.com","iat":"1736574240","admin":true}"#;
    let jwt = sign_jwt(&key, HEADER, payload);
    let n = modulus(&key);
    let params = fresh_params();
    let inputs = generate_inputs(&jwt, &n, &[], MAX_SIGNED_DATA_LENGTH).unwrap();

    let report = check(params.clone(), vec![iat(&params, None)], inputs);
    assert_unsatisfied_at(&report, "query 0");
}

#[test]
fn construction_errors() {
    let (jwt, n) = test_jwt();
    let params = fresh_params();

    assert!(matches!(
        ClaimQuery::string("email", 130, 32, &params),
        Err(JwtError::ScanRangeNotMultipleOfFour(130))
    ));
    assert!(matches!(
        ClaimQuery::string("email", 256, 32, &params),
        Err(JwtError::ScanRangeTooLarge { .. })
    ));
    assert!(matches!(
        ClaimQuery::string("email", 12, 32, &params),
        Err(JwtError::ValueTooLong { .. })
    ));
    assert!(matches!(
        ClaimQuery::number("iat", SCAN_RANGE, 21, &params),
        Err(JwtError::NumberTooLong { .. })
    ));

    // 37 + 148 runs past the 180 signed bytes
    let inputs = generate_inputs(&jwt, &n, &[], MAX_SIGNED_DATA_LENGTH).unwrap();
    let late = ClaimSpec {
        query: ClaimQuery::string("email", 148, 32, &params).unwrap(),
        expected: None,
    };
    assert!(matches!(
        JwtCircuit::new(params.clone(), vec![late], Some(inputs.clone())),
        Err(JwtError::ScanRangeExceedsData { .. })
    ));

    let long = email(&params, Some(&"x".repeat(33)));
    assert!(matches!(
        JwtCircuit::new(params.clone(), vec![long], None),
        Err(JwtError::ExpectedValueTooLong { .. })
    ));

    let mismatched = ClaimSpec {
        query: ClaimQuery::bool("admin", SCAN_RANGE, &params).unwrap(),
        expected: Some(ClaimValue::Number(1)),
    };
    assert!(matches!(
        JwtCircuit::new(params.clone(), vec![mismatched], None),
        Err(JwtError::ExpectedKindMismatch { .. })
    ));

    assert!(matches!(
        JwtCircuit::new(
            JwtParams::new(MAX_SIGNED_DATA_LENGTH, HashMode::Resumed),
            vec![],
            Some(inputs)
        ),
        Err(JwtError::HashModeMismatch { .. })
    ));

    assert!(matches!(
        generate_inputs(&jwt, &n, &[], 100),
        Err(JwtError::DataTooLong { len: 180, max: 100 })
    ));
    assert!(matches!(
        generate_inputs(&jwt, &n, &["nbf".to_string()], MAX_SIGNED_DATA_LENGTH),
        Err(JwtError::KeyNotFound)
    ));
    // "iss" sits in the first block, which also holds the header
    assert!(matches!(
        generate_inputs(&jwt, &n, &["iss".to_string()], MAX_SIGNED_DATA_LENGTH),
        Err(JwtError::PrecomputeBeforePayload { .. })
    ));
}

#[test]
fn native_signature_check() {
    let (jwt, n) = test_jwt();
    verify_signature_native(&jwt, &n).unwrap();

    let mut forged = jwt.clone();
    forged.insert(10, 'A');
    assert!(verify_signature_native(&forged, &n).is_err());
    assert!(matches!(
        verify_signature_native(&jwt, &(n + 2u32)),
        Err(JwtError::InvalidSignature)
    ));
}

#[test]
#[ignore = "runs Spartan setup and proving over the full circuit"]
fn spartan_round_trip() {
    use jwt_spartan2::{
        prove_circuit_with_pk, setup_circuit_keys_no_save, verify_circuit_with_loaded_data,
    };

    let (jwt, n) = test_jwt();
    let params = fresh_params();
    let inputs = generate_inputs(&jwt, &n, &[], MAX_SIGNED_DATA_LENGTH).unwrap();
    let circuit = JwtCircuit::new(
        params.clone(),
        vec![email(&params, Some("alice@test.com"))],
        Some(inputs),
    )
    .unwrap();

    let (pk, vk) = setup_circuit_keys_no_save(&circuit).unwrap();
    let proof = prove_circuit_with_pk(&circuit, &pk).unwrap();
    verify_circuit_with_loaded_data(&proof, &vk, &n).unwrap();
    assert!(matches!(
        verify_circuit_with_loaded_data(&proof, &vk, &(n + 2u32)),
        Err(JwtError::PublicKeyMismatch)
    ));
}
