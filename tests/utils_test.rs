use segcli::types::{Segment, TokenRecord};
use segcli::utils::*;

#[test]
fn test_generate_code_verifier() {
    let verifier = generate_code_verifier();

    // Should be exactly 128 characters
    assert_eq!(verifier.len(), CODE_VERIFIER_LEN);

    // Should contain only alphanumeric characters
    assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));

    // Two generated verifiers should be different
    let verifier2 = generate_code_verifier();
    assert_ne!(verifier, verifier2);
}

#[test]
fn test_generate_code_challenge() {
    let verifier = "test_verifier_123";
    let challenge = generate_code_challenge(verifier);

    assert_eq!(challenge, generate_code_challenge(verifier));
    assert_ne!(challenge, generate_code_challenge("different_verifier"));

    // SHA-256 digest in unpadded URL-safe base64
    assert_eq!(challenge.len(), 43);
    assert!(
        challenge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    );
}

#[test]
fn test_generate_challenge_pairs_verifier_and_challenge() {
    let (verifier, challenge) = generate_challenge();
    assert_eq!(generate_code_challenge(&verifier), challenge);
}

#[test]
fn test_parse_time() {
    assert_eq!(parse_time("0:30"), Ok(30_000));
    assert_eq!(parse_time("12:05"), Ok(725_000));
    assert_eq!(parse_time("1:00:00"), Ok(3_600_000));
    assert_eq!(parse_time("95"), Ok(95_000));
    assert_eq!(parse_time(" 1:02.5 "), Ok(62_500));
}

#[test]
fn test_parse_time_rejects_garbage() {
    for input in [
        "",
        "abc",
        "1:60",
        "1:2:3:4",
        "-5",
        "1:-3",
        "1:61:00",
        "307445734561826:00",
    ] {
        assert!(parse_time(input).is_err(), "accepted {input:?}");
    }
}

#[test]
fn test_format_duration() {
    assert_eq!(format_duration(0), "0:00");
    assert_eq!(format_duration(5_999), "0:05");
    assert_eq!(format_duration(65_000), "1:05");
    assert_eq!(format_duration(3_600_000), "60:00");
}

#[test]
fn test_segment_duration() {
    assert_eq!(Segment::new("t", 30_000, 65_000).duration_ms(), 35_000);
    assert_eq!(Segment::new("t", 5_000, 1_000).duration_ms(), 0);
}

#[test]
fn test_token_record_validity_margin() {
    let record = TokenRecord::issued("a".into(), "r".into(), 3600, 1_000);
    assert_eq!(record.expires_at, 3_601_000);

    assert!(record.is_valid_at(3_595_999, 5_000));
    assert!(!record.is_valid_at(3_596_000, 5_000));
}
