//! Partner credential generation, hashing and masking.
//!
//! A partner carries three credentials: a public `client_id`, a
//! `client_secret` used to obtain control-plane tokens, and a
//! `webhook_secret` used to sign outbound deliveries. Secrets are only ever
//! shown in full when they are minted; every other read goes through
//! [`mask_secret`].

use rand::Rng;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Prefix of generated client ids.
pub const CLIENT_ID_PREFIX: &str = "cli_";

/// Prefix of generated client secrets.
pub const CLIENT_SECRET_PREFIX: &str = "sk_";

/// Prefix of generated webhook signing secrets.
pub const WEBHOOK_SECRET_PREFIX: &str = "whsec_";

/// Random alphanumeric characters in a client id.
pub const CLIENT_ID_LENGTH: usize = 24;

/// Random alphanumeric characters in a secret.
pub const SECRET_LENGTH: usize = 40;

/// Characters left visible at the end of a masked secret.
const MASK_VISIBLE_SUFFIX: usize = 4;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// A freshly minted credential set.
///
/// `client_secret` is the plaintext (returned to the caller once);
/// `client_secret_hash` is what gets stored for token exchange.
#[derive(Debug, Clone)]
pub struct GeneratedCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub client_secret_hash: String,
    pub webhook_secret: String,
}

/// Rotated secrets. The client id never changes on rotation.
#[derive(Debug, Clone)]
pub struct RotatedSecrets {
    pub client_secret: String,
    pub client_secret_hash: String,
    pub webhook_secret: String,
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a complete credential set for a new partner.
pub fn generate_credentials() -> GeneratedCredentials {
    let RotatedSecrets {
        client_secret,
        client_secret_hash,
        webhook_secret,
    } = rotate_secrets();

    GeneratedCredentials {
        client_id: format!("{CLIENT_ID_PREFIX}{}", random_alphanumeric(CLIENT_ID_LENGTH)),
        client_secret,
        client_secret_hash,
        webhook_secret,
    }
}

/// Generate a new client secret and webhook secret.
pub fn rotate_secrets() -> RotatedSecrets {
    let client_secret = format!("{CLIENT_SECRET_PREFIX}{}", random_alphanumeric(SECRET_LENGTH));
    let webhook_secret = format!("{WEBHOOK_SECRET_PREFIX}{}", random_alphanumeric(SECRET_LENGTH));

    RotatedSecrets {
        client_secret_hash: hash_secret(&client_secret),
        client_secret,
        webhook_secret,
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// SHA-256 hex digest of a client secret, used for storage and lookup.
pub fn hash_secret(secret: &str) -> String {
    crate::hashing::sha256_hex(secret.as_bytes())
}

// ---------------------------------------------------------------------------
// Masking
// ---------------------------------------------------------------------------

/// Mask a secret for display: keep the `xx_` prefix and the last 4 chars.
///
/// `whsec_AbC...wxyz` becomes `whsec_****wxyz`. Short or unprefixed values
/// collapse to `****`.
pub fn mask_secret(secret: &str) -> String {
    let prefix = secret
        .find('_')
        .map(|idx| &secret[..=idx])
        .unwrap_or_default();
    let rest = &secret[prefix.len()..];

    if rest.chars().count() <= MASK_VISIBLE_SUFFIX * 2 {
        return format!("{prefix}****");
    }

    let suffix: String = rest
        .chars()
        .rev()
        .take(MASK_VISIBLE_SUFFIX)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{prefix}****{suffix}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
