use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::error;

/// How long a password reset ticket stays valid.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

const RESET_TOKEN_BYTES: usize = 32;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("argon2 hash failed: {e}"))
}

/// Mismatch is `Ok(false)`; only a malformed stored hash is an error.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("stored hash unreadable: {e}"))?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => anyhow::bail!("argon2 verify failed: {e}"),
    }
}

lazy_static! {
    /// Stand-in hash so that an absent account costs one full verify.
    static ref DECOY_HASH: Option<String> = hash_password("decoy-credential").ok();
}

/// Checks `plain` against an optional stored hash. Without one (unknown
/// account, provider-only account) the same argon2 work is done against a
/// decoy and the answer is always `false`.
pub fn verify_password_or_decoy(plain: &str, hash: Option<&str>) -> anyhow::Result<bool> {
    match hash {
        Some(hash) => verify_password(plain, hash),
        None => {
            if let Some(decoy) = DECOY_HASH.as_deref() {
                if let Err(e) = verify_password(plain, decoy) {
                    error!(error = %e, "decoy verify failed");
                }
            }
            Ok(false)
        }
    }
}

/// Raw token goes to the user; only `token_hash` and `expires_at` are stored.
#[derive(Debug, Clone)]
pub struct ResetTicket {
    pub raw_token: String,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

pub fn generate_reset_token(now: OffsetDateTime) -> ResetTicket {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let raw_token = hex::encode(bytes);
    ResetTicket {
        token_hash: hash_reset_token(&raw_token),
        raw_token,
        expires_at: now + RESET_TOKEN_TTL,
    }
}

pub fn hash_reset_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
