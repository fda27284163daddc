//! Sqreen webhook signature verification.
//!
//! Sqreen signs each webhook body with HMAC-SHA256 using the shared secret and
//! sends the lowercase hex digest in the `X-Sqreen-Integrity` header.
//! Verification must run on the raw request bytes, before any parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded body signature.
pub const SIGNATURE_HEADER: &str = "X-Sqreen-Integrity";

/// Compute the lowercase hex HMAC-SHA256 of `body` keyed with `secret`.
///
/// Returns `None` if the key is rejected.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(m) => m,
        Err(_) => {
            warn!("signature_invalid_key");
            return None;
        }
    };

    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a webhook signature against the raw request body.
///
/// # Arguments
///
/// * `secret` - Shared webhook secret
/// * `signature` - Value of the signature header
/// * `body` - Exact, unparsed request body
///
/// # Returns
///
/// `true` only if `signature` equals the expected hex digest.
pub fn verify_signature(secret: &[u8], signature: &str, body: &[u8]) -> bool {
    if signature.is_empty() {
        warn!("signature_missing");
        return false;
    }

    let expected_signature = match compute_signature(secret, body) {
        Some(signature) => signature,
        None => return false,
    };

    // Constant-time comparison to prevent timing attacks
    let valid = constant_time_compare(&expected_signature, signature);

    if !valid {
        warn!(
            expected_length = expected_signature.len(),
            actual_length = signature.len(),
            body_length = body.len(),
            "signature_mismatch"
        );
    }

    valid
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
