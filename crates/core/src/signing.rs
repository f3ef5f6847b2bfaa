//! Timestamped HMAC-SHA256 signatures shared by outbound and inbound webhooks.
//!
//! The signature header has the form `t=<unix-seconds>,v1=<hex>` where the
//! hex digest is `HMAC-SHA256(secret, "<unix-seconds>.<body>")`. Outbound
//! deliveries sign the exact bytes they put on the wire, so a receiver can
//! verify against the raw body it read.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Header carrying the signature on outbound and inbound webhooks.
pub const SIGNATURE_HEADER: &str = "x-aurum-signature";

/// Alternate inbound header name some providers use.
pub const ALT_SIGNATURE_HEADER: &str = "x-signature";

/// Default verification window in seconds.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// A payload serialized to its canonical bytes together with its signature.
#[derive(Debug, Clone)]
pub struct SignedPayload {
    /// The exact bytes to send as the request body.
    pub body: Vec<u8>,
    /// Unix seconds embedded in the signature.
    pub timestamp: i64,
    /// Full header value, `t=<timestamp>,v1=<hex>`.
    pub signature: String,
}

/// Serialize a JSON payload to the byte form that gets signed and sent.
pub fn canonical_bytes(payload: &serde_json::Value) -> Vec<u8> {
    payload.to_string().into_bytes()
}

/// Compute the hex HMAC over `"<timestamp>.<body>"`.
pub fn compute_signature(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mac = signed_mac(secret, timestamp, body);
    hex::encode(mac.finalize().into_bytes())
}

/// Sign a payload with `secret`, stamping it with `timestamp` or the current time.
pub fn sign(payload: &serde_json::Value, secret: &str, timestamp: Option<i64>) -> SignedPayload {
    let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());
    let body = canonical_bytes(payload);
    let digest = compute_signature(secret, timestamp, &body);

    SignedPayload {
        signature: format_signature_header(timestamp, &digest),
        body,
        timestamp,
    }
}

/// Render the `t=...,v1=...` header value.
pub fn format_signature_header(timestamp: i64, hex_digest: &str) -> String {
    format!("t={timestamp},v1={hex_digest}")
}

fn signed_mac(secret: &str, timestamp: i64, body: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Components extracted from a signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    pub timestamp: i64,
    pub v1: String,
}

/// Parse `t=` and `v1=` out of a comma-separated signature header.
///
/// Unknown components are ignored and the first `v1` wins. Returns `None`
/// if either required component is missing, `t` appears more than once or
/// the timestamp is not an integer.
pub fn parse_signature_header(header: &str) -> Option<ParsedSignature> {
    let mut timestamp = None;
    let mut v1 = None;

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key.trim() {
            "t" if timestamp.is_some() => return None,
            "t" => timestamp = Some(value.trim().parse::<i64>().ok()?),
            "v1" if v1.is_none() => v1 = Some(value.trim().to_string()),
            _ => {}
        }
    }

    Some(ParsedSignature {
        timestamp: timestamp?,
        v1: v1.filter(|v| !v.is_empty())?,
    })
}

/// Verify `raw_body` against a signature header using the current time.
pub fn verify(raw_body: &[u8], header: &str, secret: &str, tolerance_secs: u64) -> bool {
    verify_at(raw_body, header, secret, tolerance_secs, Utc::now().timestamp())
}

/// Verify `raw_body` against a signature header as of `now` (unix seconds).
///
/// Fails closed: malformed headers, stale or far-future timestamps and
/// undecodable digests all yield `false`. The digest comparison is
/// constant-time.
pub fn verify_at(
    raw_body: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> bool {
    let Some(parsed) = parse_signature_header(header) else {
        return false;
    };

    let within_window = now
        .checked_sub(parsed.timestamp)
        .is_some_and(|skew| skew.unsigned_abs() <= tolerance_secs);
    if !within_window {
        return false;
    }

    let Ok(expected) = hex::decode(&parsed.v1) else {
        return false;
    };

    signed_mac(secret, parsed.timestamp, raw_body)
        .verify_slice(&expected)
        .is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
