//! RFC 6238 TOTP: HMAC-SHA1, 30-second step, 6 digits, base32 shared secret.

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const STEP_SECONDS: i64 = 30;
const DIGITS: u32 = 6;
const SKEW_STEPS: i64 = 1;

/// Generates a fresh 160-bit shared secret, base32-encoded for display/QR.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    BASE32_NOPAD.decode(secret.as_bytes()).ok()
}

fn code_at_step(secret_bytes: &[u8], step: i64) -> Option<u32> {
    let mut mac = HmacSha1::new_from_slice(secret_bytes).ok()?;
    mac.update(&step.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let truncated = ((hash[offset] as u32 & 0x7f) << 24)
        | ((hash[offset + 1] as u32) << 16)
        | ((hash[offset + 2] as u32) << 8)
        | (hash[offset + 3] as u32);

    Some(truncated % 10u32.pow(DIGITS))
}

/// Renders the 6-digit code active at `unix_time`, zero-padded.
pub fn generate_totp(secret: &str, unix_time: i64) -> Option<String> {
    let secret_bytes = decode_secret(secret)?;
    let step = unix_time / STEP_SECONDS;
    let code = code_at_step(&secret_bytes, step)?;
    Some(format!("{code:0width$}", width = DIGITS as usize))
}

/// Verifies `code` at `unix_time` allowing `±1` step of clock drift. Returns
/// the matched step index so the caller can reject replays at or before it.
pub fn verify_totp(secret: &str, code: &str, unix_time: i64, last_verified_step: Option<i64>) -> Option<i64> {
    if code.len() != DIGITS as usize || !code.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let secret_bytes = decode_secret(secret)?;
    let current_step = unix_time / STEP_SECONDS;

    for delta in -SKEW_STEPS..=SKEW_STEPS {
        let step = current_step + delta;
        if let Some(last) = last_verified_step {
            if step <= last {
                continue;
            }
        }
        if let Some(candidate) = code_at_step(&secret_bytes, step) {
            let candidate_str = format!("{candidate:0width$}", width = DIGITS as usize);
            if constant_time_eq(candidate_str.as_bytes(), code.as_bytes()) {
                return Some(step);
            }
        }
    }
    None
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn provisioning_uri(issuer: &str, account: &str, secret: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits=6&period=30"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_verifies_current_code() {
        let secret = generate_secret();
        let now = 1_700_000_000;
        let code = generate_totp(&secret, now).unwrap();
        assert_eq!(code.len(), 6);
        assert!(verify_totp(&secret, &code, now, None).is_some());
    }

    #[test]
    fn tolerates_one_step_of_drift() {
        let secret = generate_secret();
        let now = 1_700_000_000;
        let code = generate_totp(&secret, now).unwrap();
        assert!(verify_totp(&secret, &code, now + STEP_SECONDS, None).is_some());
        assert!(verify_totp(&secret, &code, now + STEP_SECONDS * 3, None).is_none());
    }

    #[test]
    fn rejects_replay_at_or_before_last_verified_step() {
        let secret = generate_secret();
        let now = 1_700_000_000;
        let code = generate_totp(&secret, now).unwrap();
        let step = verify_totp(&secret, &code, now, None).unwrap();
        assert!(verify_totp(&secret, &code, now, Some(step)).is_none());
    }
}
