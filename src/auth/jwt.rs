//! JWT token generation and validation

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::PermissionLevel;
use crate::types::AppError;

/// Claims carried in a StreakWars token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User document id (hex ObjectId)
    pub sub: String,
    /// User identifier (email or username)
    pub identifier: String,
    /// Permission level at issue time
    pub permission_level: PermissionLevel,
    /// Token version at issue time; a mismatch against the user record
    /// invalidates the token on refresh
    pub token_version: i32,
    /// Expiry (unix seconds)
    pub exp: u64,
    /// Issued at (unix seconds)
    pub iat: u64,
}

/// Result of token verification
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

/// Issues and verifies JWTs with a shared HMAC secret
#[derive(Clone)]
pub struct JwtValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a validator from the configured secret
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(AppError::Auth("JWT secret must not be empty".into()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        })
    }

    /// Dev-mode validator with a fixed insecure secret
    pub fn new_dev() -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(b"dev-only-insecure-secret"),
            decoding_key: DecodingKey::from_secret(b"dev-only-insecure-secret"),
            expiry_seconds: 3600,
        }
    }

    /// Issue a token for a user
    pub fn issue_token(
        &self,
        user_id: &str,
        identifier: &str,
        permission_level: PermissionLevel,
        token_version: i32,
    ) -> Result<(String, u64), AppError> {
        let now = Utc::now().timestamp() as u64;
        let exp = now + self.expiry_seconds;

        let claims = Claims {
            sub: user_id.to_string(),
            identifier: identifier.to_string(),
            permission_level,
            token_version,
            exp,
            iat: now,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Auth(format!("Failed to sign token: {e}")))?;

        Ok((token, exp))
    }

    /// Verify a token and return its claims
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        match decode::<Claims>(token, &self.decoding_key, &Validation::default()) {
            Ok(data) => TokenValidationResult {
                valid: true,
                claims: Some(data.claims),
                error: None,
            },
            Err(e) => TokenValidationResult {
                valid: false,
                claims: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Extract a bearer token from an Authorization header value
pub fn extract_token_from_header(header: Option<&str>) -> Option<&str> {
    header.and_then(|h| h.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let jwt = JwtValidator::new_dev();
        let (token, exp) = jwt
            .issue_token("abc123", "ada@example.com", PermissionLevel::Authenticated, 1)
            .unwrap();

        assert!(exp > Utc::now().timestamp() as u64);

        let result = jwt.verify_token(&token);
        assert!(result.valid);
        let claims = result.claims.unwrap();
        assert_eq!(claims.sub, "abc123");
        assert_eq!(claims.identifier, "ada@example.com");
        assert_eq!(claims.permission_level, PermissionLevel::Authenticated);
        assert_eq!(claims.token_version, 1);
    }

    #[test]
    fn test_garbage_token_rejected() {
        let jwt = JwtValidator::new_dev();
        let result = jwt.verify_token("not.a.token");
        assert!(!result.valid);
        assert!(result.claims.is_none());
        assert!(result.error.is_some());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = JwtValidator::new("secret-a".into(), 3600).unwrap();
        let verifier = JwtValidator::new("secret-b".into(), 3600).unwrap();

        let (token, _) = issuer
            .issue_token("abc", "x@y.z", PermissionLevel::Authenticated, 1)
            .unwrap();
        assert!(!verifier.verify_token(&token).valid);
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(JwtValidator::new(String::new(), 3600).is_err());
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token_from_header(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_token_from_header(Some("Basic abc")), None);
        assert_eq!(extract_token_from_header(None), None);
    }
}
