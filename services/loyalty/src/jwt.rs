//! JWT issuing and validation
//!
//! Tokens are HS256-signed with a process-wide secret and carried in the
//! `AuthToken` HTTP-only cookie. Claims identify the user by id and login
//! and expire after 72 hours.

use anyhow::Result;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token lifetime in seconds (72 hours).
const TOKEN_TTL_SECS: u64 = 72 * 60 * 60;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: i64,
    /// User login
    pub login: String,
    /// Expiration time (unix seconds)
    pub exp: u64,
}

/// JWT service holding the signing and verification keys
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    /// Initialize from the shared HMAC secret.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;

        JwtService {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issue a token for the given user.
    pub fn issue(&self, user_id: i64, login: &str) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| anyhow::anyhow!("failed to get current time: {}", e))?
            .as_secs();

        let claims = Claims {
            sub: user_id,
            login: login.to_string(),
            exp: now + TOKEN_TTL_SECS,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }
}
