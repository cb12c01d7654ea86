//! Purchase Token Service
//!
//! Issues the short-lived signed credential a client receives when it is
//! admitted into the sale, and verifies it for the downstream checkout.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtSettings;

/// JWT claims carried by a purchase token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseClaims {
    /// Subject (client ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
    /// JWT ID, unique per admission
    pub jti: String,
}

/// Purchase token bound to one client. Not persisted.
#[derive(Debug, Clone)]
pub struct PurchaseToken {
    pub client_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,
}

/// Signs and verifies purchase tokens with an HMAC secret.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl TokenService {
    /// Create a token service from settings
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            expiry: Duration::minutes(settings.purchase_token_expiry_minutes),
        }
    }

    /// Issue a purchase token for `client_id`
    pub fn issue(&self, client_id: &str) -> Result<PurchaseToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + self.expiry;

        let claims = PurchaseClaims {
            sub: client_id.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(PurchaseToken {
            client_id: client_id.to_string(),
            token,
            expires_at,
        })
    }

    /// Decode and validate a purchase token
    pub fn verify(&self, token: &str) -> Result<PurchaseClaims, TokenError> {
        let token_data = decode::<PurchaseClaims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        Ok(token_data.claims)
    }
}
