//! JWT service for token generation and validation
//!
//! Tokens are HS256-signed and carry the user id, username and the plan
//! tier at issuance. The tier claim is informational only: anything that
//! grants privileges re-reads the user row.

use anyhow::Result;
use common::tier::PlanTier;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::models::User;

/// Fallback secret used when `JWT_SECRET` is unset
pub const INSECURE_DEFAULT_SECRET: &str = "landing-builder-insecure-default-secret";

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared HMAC secret
    pub secret: String,
    /// Token lifetime in seconds (default: 24 hours)
    pub token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: signing secret (falls back to an insecure default)
    /// - `JWT_EXPIRY_SECONDS`: token lifetime in seconds (default: 86400)
    pub fn from_env() -> Self {
        let secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                warn!("JWT_SECRET is not set; using the insecure default secret");
                INSECURE_DEFAULT_SECRET.to_string()
            });

        let token_expiry = std::env::var("JWT_EXPIRY_SECONDS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .unwrap_or(86400);

        JwtConfig {
            secret,
            token_expiry,
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub id: i64,
    pub username: String,
    /// Tier at the time the token was issued
    pub plan_tier: PlanTier,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        JwtService {
            encoding_key,
            decoding_key,
            validation,
            config,
        }
    }

    /// Generate a token for a user
    pub fn generate_token(&self, user: &User) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
            .as_secs();

        let claims = Claims {
            id: user.id,
            username: user.username.clone(),
            plan_tier: user.plan_tier,
            iat: now,
            exp: now + self.config.token_expiry,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate a token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Get the token lifetime in seconds
    pub fn token_expiry(&self) -> u64 {
        self.config.token_expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_user() -> User {
        User {
            id: 42,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            plan_tier: PlanTier::Premium,
            is_verified: true,
            is_active: true,
            verification_token: None,
            reset_token: None,
            reset_token_expires_at: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_status: None,
            subscription_expires_at: None,
            created_at: 0,
        }
    }

    fn service(secret: &str, token_expiry: u64) -> JwtService {
        JwtService::new(JwtConfig {
            secret: secret.to_string(),
            token_expiry,
        })
    }

    #[test]
    fn test_token_round_trip_carries_claims() {
        let jwt = service("secret", 3600);
        let token = jwt.generate_token(&test_user()).unwrap();

        let claims = jwt.validate_token(&token).unwrap();
        assert_eq!(claims.id, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.plan_tier, PlanTier::Premium);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = service("one", 3600).generate_token(&test_user()).unwrap();
        assert!(service("two", 3600).validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let jwt = service("secret", 3600);
        let claims = Claims {
            id: 1,
            username: "old".to_string(),
            plan_tier: PlanTier::Static,
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        assert!(jwt.validate_token(&token).is_err());
    }

    #[test]
    #[serial]
    fn test_jwt_config_from_env_defaults() {
        unsafe {
            std::env::remove_var("JWT_SECRET");
            std::env::remove_var("JWT_EXPIRY_SECONDS");
        }

        let config = JwtConfig::from_env();
        assert_eq!(config.secret, INSECURE_DEFAULT_SECRET);
        assert_eq!(config.token_expiry, 86400);
    }

    #[test]
    #[serial]
    fn test_jwt_config_from_env_custom_values() {
        unsafe {
            std::env::set_var("JWT_SECRET", "s3cret");
            std::env::set_var("JWT_EXPIRY_SECONDS", "600");
        }

        let config = JwtConfig::from_env();
        assert_eq!(config.secret, "s3cret");
        assert_eq!(config.token_expiry, 600);

        unsafe {
            std::env::remove_var("JWT_SECRET");
            std::env::remove_var("JWT_EXPIRY_SECONDS");
        }
    }
}
