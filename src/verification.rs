use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Provider tag whose webhooks carry a verifiable signature.
pub const STRIPE_PROVIDER: &str = "stripe";

/// Header carrying the Stripe-style signature, e.g. `t=1700000000,v1=<hex>`.
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationResult {
    fn failed(timestamp: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            valid: false,
            timestamp: timestamp.map(str::to_string),
            error: Some(error.into()),
        }
    }
}

fn signing_mac(secret: &str, timestamp: &str, payload: &[u8]) -> Result<HmacSha256, String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| e.to_string())?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"` keyed by `secret`.
pub fn compute_stripe_signature(payload: &[u8], timestamp: &str, secret: &str) -> String {
    match signing_mac(secret, timestamp, payload) {
        Ok(mac) => hex::encode(mac.finalize().into_bytes()),
        // HMAC accepts keys of any length.
        Err(_) => String::new(),
    }
}

/// Verify a Stripe-style signature header against the raw payload.
///
/// The header is a comma-separated list of `key=value` tokens. A `t` token
/// (timestamp) and at least one `v1` token (hex signature) are required.
/// Every `v1` candidate is checked with `Mac::verify_slice`, which compares
/// in constant time, and all candidates are checked regardless of earlier
/// results.
///
/// No freshness window is applied to the timestamp: an old payload with a
/// once-valid signature keeps verifying.
///
/// Never panics; every failure is reported through `error`.
pub fn verify_stripe_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
) -> VerificationResult {
    if secret.is_empty() || signature_header.trim().is_empty() {
        return VerificationResult::failed(None, "Missing secret or signature");
    }

    let mut timestamp = None;
    let mut candidates = Vec::new();
    for token in signature_header.split(',') {
        let Some((key, value)) = token.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" if timestamp.is_none() => timestamp = Some(value),
            "v1" => candidates.push(value),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return VerificationResult::failed(None, "Invalid signature format");
    };
    if candidates.is_empty() {
        return VerificationResult::failed(Some(timestamp), "Invalid signature format");
    }

    let mac = match signing_mac(secret, timestamp, payload) {
        Ok(m) => m,
        Err(e) => return VerificationResult::failed(Some(timestamp), e),
    };

    let mut valid = false;
    let mut decode_error = None;
    for candidate in candidates {
        match hex::decode(candidate) {
            Ok(bytes) => valid |= mac.clone().verify_slice(&bytes).is_ok(),
            Err(e) => decode_error = Some(format!("Invalid signature encoding: {e}")),
        }
    }

    if valid {
        VerificationResult {
            valid: true,
            timestamp: Some(timestamp.to_string()),
            error: None,
        }
    } else {
        let error = decode_error.unwrap_or_else(|| "Signature mismatch".to_string());
        VerificationResult::failed(Some(timestamp), error)
    }
}
