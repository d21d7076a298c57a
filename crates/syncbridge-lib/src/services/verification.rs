// Webhook Signature Verification
// Hex HMAC-SHA256 over the raw request body

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Headers checked for a signature, in priority order
pub const SIGNATURE_HEADERS: &[&str] = &[
    "x-webhook-signature",
    "x-hub-signature-256",
    "x-signature",
];

const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the hex encoded HMAC-SHA256 of `body`
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature header value, with or without the `sha256=` prefix.
/// Comparison is constant time over the lowercase hex digest.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let provided = signature.trim();
    let provided = provided.strip_prefix(SIGNATURE_PREFIX).unwrap_or(provided);
    if provided.is_empty() {
        return false;
    }

    let computed = sign(secret, body);
    if computed.is_empty() {
        return false;
    }
    constant_time_eq::constant_time_eq(
        computed.as_bytes(),
        provided.to_ascii_lowercase().as_bytes(),
    )
}
