use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

pub const CODE_VERIFIER_LEN: usize = 128;

pub fn generate_code_verifier() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_VERIFIER_LEN)
        .map(char::from)
        .collect()
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Returns a fresh `(verifier, challenge)` pair for an authorization request.
pub fn generate_challenge() -> (String, String) {
    let verifier = generate_code_verifier();
    let challenge = generate_code_challenge(&verifier);
    (verifier, challenge)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Formats milliseconds as `M:SS`, truncating sub-second precision.
pub fn format_duration(ms: u64) -> String {
    let total_seconds = ms / 1000;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Parses `M:SS`, `MM:SS`, `H:MM:SS` or a plain number of seconds into milliseconds.
///
/// Fractional seconds are accepted in the last component (`1:02.5`).
///
/// # Returns
///
/// The position in milliseconds, or a message naming the offending part of
/// `input`. Used as a clap value parser, so the message is shown to the user.
///
/// # Example
///
/// ```
/// use segcli::utils::parse_time;
///
/// assert_eq!(parse_time("1:02.5"), Ok(62_500));
/// assert_eq!(parse_time("1:00:00"), Ok(3_600_000));
/// assert!(parse_time("1:75").is_err());
/// ```
pub fn parse_time(input: &str) -> Result<u64, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty time value".to_string());
    }

    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() > 3 {
        return Err(format!("invalid time '{input}', expected M:SS"));
    }

    let (last, leading) = parts.split_last().ok_or_else(|| "empty time value".to_string())?;

    let seconds: f64 = last
        .parse()
        .map_err(|_| format!("invalid seconds in '{input}'"))?;
    if !seconds.is_finite() || seconds < 0.0 || (!leading.is_empty() && seconds >= 60.0) {
        return Err(format!("seconds out of range in '{input}'"));
    }

    let mut whole_units: u64 = 0;
    for (i, part) in leading.iter().enumerate() {
        let value: u64 = part
            .parse()
            .map_err(|_| format!("invalid component '{part}' in '{input}'"))?;
        if i > 0 && value >= 60 {
            return Err(format!("minutes out of range in '{input}'"));
        }
        whole_units = whole_units
            .checked_mul(60)
            .and_then(|units| units.checked_add(value))
            .ok_or_else(|| format!("time out of range in '{input}'"))?;
    }

    let fraction_ms = (seconds * 1000.0).round();
    if fraction_ms >= u64::MAX as f64 {
        return Err(format!("time out of range in '{input}'"));
    }

    whole_units
        .checked_mul(60_000)
        .and_then(|ms| ms.checked_add(fraction_ms as u64))
        .ok_or_else(|| format!("time out of range in '{input}'"))
}
