//! Password hashing and bearer tokens.
//!
//! Passwords are stored as `pbkdf2-sha256$<iterations>$<salt>$<hash>` with
//! base64 salt and hash, so the iteration count can be raised later without
//! invalidating existing rows.

use std::{num::NonZeroU32, time::Duration};

use base64::{engine::general_purpose, Engine};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use ring::{
    digest, pbkdf2,
    rand::{SecureRandom, SystemRandom},
};

use crate::{
    error::ApiError,
    model::{Claims, CurrentUser, User},
};

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
const CREDENTIAL_LEN: usize = digest::SHA256_OUTPUT_LEN;
const SALT_LEN: usize = 16;
const SCHEME: &str = "pbkdf2-sha256";

pub fn hash_password(password: &str, iterations: u32) -> Result<String, ApiError> {
    let iterations = NonZeroU32::new(iterations)
        .ok_or_else(|| ApiError::internal("password hash iterations must be non-zero"))?;

    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| ApiError::internal("failed to generate password salt"))?;

    let mut hash = [0u8; CREDENTIAL_LEN];
    pbkdf2::derive(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &mut hash);

    Ok(format!(
        "{SCHEME}${iterations}${}${}",
        general_purpose::STANDARD.encode(salt),
        general_purpose::STANDARD.encode(hash)
    ))
}

/// Checks `password` against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Some(iterations) = iterations.parse().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (
        general_purpose::STANDARD.decode(salt),
        general_purpose::STANDARD.decode(hash),
    ) else {
        return false;
    };

    pbkdf2::verify(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &hash).is_ok()
}

/// HS256 signing material plus the lifetime of issued tokens.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, ApiError> {
        let now = jsonwebtoken::get_current_timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat: now,
            exp: now + self.ttl.as_secs(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<CurrentUser, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;
        let id = data
            .claims
            .sub
            .parse()
            .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;
        Ok(CurrentUser {
            id,
            email: data.claims.email,
        })
    }
}
