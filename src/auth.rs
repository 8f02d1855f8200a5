use argon2::password_hash::rand_core::OsRng as SaltRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Name of the session cookie carrying the signed token.
pub const SESSION_COOKIE: &str = "lunasentri_session";

/// Hex of SHA-256 over the plaintext. The at-rest form of every shared
/// secret: machine API keys, webhook secrets, password-reset tokens.
pub fn sha256_hex(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_hex_64() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a machine API key: `lsk_<64 hex chars>` (32 random bytes).
/// Returns (plaintext, stored hash). The plaintext leaves the server once.
pub fn generate_api_key() -> (String, String) {
    let plaintext = format!("lsk_{}", random_hex_64());
    let hash = sha256_hex(&plaintext);
    (plaintext, hash)
}

/// Generate a single-use password-reset token: `lsr_<64 hex chars>`.
pub fn generate_reset_token() -> (String, String) {
    let plaintext = format!("lsr_{}", random_hex_64());
    let hash = sha256_hex(&plaintext);
    (plaintext, hash)
}

/// Random fallback signing key for dev runs without `AUTH_JWT_SECRET`.
pub fn generate_secret() -> String {
    random_hex_64()
}

// --- Passwords (argon2id, memory-hard by construction) ---

pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut SaltRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| e.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// --- Sessions (HS256-signed claims in a cookie) ---

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: i64,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn mint_session(secret: &str, user_id: i64, email: &str, ttl_secs: u64) -> Option<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = SessionClaims {
        sub: user_id,
        email: email.to_string(),
        iat: now,
        exp: now + ttl_secs as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .ok()
}

/// Verify a session token; returns the claims when the signature checks out
/// and the token is unexpired.
pub fn verify_session(secret: &str, token: &str) -> Option<SessionClaims> {
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}
