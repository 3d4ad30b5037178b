//! Webhook signature verification
//!
//! The provider signs the raw request body with HMAC-SHA512 using the
//! platform's webhook secret and sends the hex digest in
//! `x-paystack-signature`. Verification runs on the exact bytes received,
//! before any parsing.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Hex-encoded HMAC-SHA512 of `body`
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha512::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of `signature` against the body's expected digest.
///
/// A missing, non-hex, or wrong-length signature is simply invalid.
pub fn verify(secret: &[u8], body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    expected.len() == provided.len() && bool::from(expected.as_slice().ct_eq(&provided))
}
