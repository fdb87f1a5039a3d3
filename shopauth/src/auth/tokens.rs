//! Signed access and refresh tokens.
//!
//! Both kinds are HS256 JWTs signed with independent secrets. Verification never errors: a token
//! either verifies as the requested kind or it doesn't.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::trace;
use uuid::Uuid;

use crate::{api::models::users::Role, config::AuthConfig, errors::Error, types::UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims shared by both token kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: UserId, // Subject (user ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>, // Access tokens only
    pub typ: TokenKind,
    pub jti: Uuid, // Keeps two tokens issued in the same second distinct
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl SigningKeys {
    fn new(name: &str, secret: Option<&str>, ttl: Duration) -> Result<Self, Error> {
        let secret = secret.filter(|s| !s.is_empty()).ok_or_else(|| Error::Config {
            message: format!("auth.{name}.secret is required"),
        })?;
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| Error::Config {
            message: format!("auth.{name}.expiry is out of range: {e}"),
        })?;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }
}

/// Issues and verifies tokens. Built once at startup; construction fails if either secret is
/// missing.
pub struct TokenCodec {
    access: SigningKeys,
    refresh: SigningKeys,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Result<Self, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            access: SigningKeys::new("access_token", config.access_token.secret.as_deref(), config.access_token.expiry)?,
            refresh: SigningKeys::new("refresh_token", config.refresh_token.secret.as_deref(), config.refresh_token.expiry)?,
            validation,
        })
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Sign a new token. Refresh tokens carry only the subject; the role is dropped.
    pub fn issue(&self, kind: TokenKind, user_id: UserId, role: Option<Role>) -> Result<IssuedToken, Error> {
        let keys = self.keys(kind);
        let now = Utc::now();
        let expires_at = now + keys.ttl;

        let claims = TokenClaims {
            sub: user_id,
            role: match kind {
                TokenKind::Access => role,
                TokenKind::Refresh => None,
            },
            typ: kind,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).map_err(|e| Error::Internal {
            operation: format!("sign {kind} token: {e}"),
        })?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Signature, expiry and kind check in one step. The only source of claims that may drive
    /// access decisions.
    pub fn verified_claims(&self, kind: TokenKind, token: &str) -> Option<TokenClaims> {
        match decode::<TokenClaims>(token, &self.keys(kind).decoding, &self.validation) {
            Ok(data) if data.claims.typ == kind => Some(data.claims),
            Ok(data) => {
                trace!(expected = %kind, actual = %data.claims.typ, "Token kind mismatch");
                None
            }
            Err(e) => {
                trace!(%kind, error = %e, "Token failed verification");
                None
            }
        }
    }

    pub fn verify(&self, kind: TokenKind, token: &str) -> bool {
        self.verified_claims(kind, token).is_some()
    }

    /// Read claims without checking signature or expiry. For log context only.
    pub fn decode_unverified(&self, token: &str) -> Option<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccessTokenConfig, RefreshTokenConfig};

    fn create_test_codec() -> TokenCodec {
        TokenCodec::new(&AuthConfig {
            access_token: AccessTokenConfig {
                secret: Some("access-secret".to_string()),
                ..Default::default()
            },
            refresh_token: RefreshTokenConfig {
                secret: Some("refresh-secret".to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let config = AuthConfig {
            access_token: AccessTokenConfig {
                secret: Some("access-secret".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(TokenCodec::new(&config), Err(Error::Config { .. })));
    }

    #[test]
    fn test_issue_then_verify() {
        let codec = create_test_codec();
        let user_id = Uuid::new_v4();

        let access = codec.issue(TokenKind::Access, user_id, Some(Role::FruitGuy)).unwrap();
        let claims = codec.verified_claims(TokenKind::Access, &access.token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Some(Role::FruitGuy));
        assert_eq!(claims.exp - claims.iat, 15 * 60);

        let refresh = codec.issue(TokenKind::Refresh, user_id, Some(Role::FruitGuy)).unwrap();
        let claims = codec.verified_claims(TokenKind::Refresh, &refresh.token).unwrap();
        assert_eq!(claims.role, None);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let codec = create_test_codec();
        let access = codec.issue(TokenKind::Access, Uuid::new_v4(), Some(Role::Admin)).unwrap();
        let refresh = codec.issue(TokenKind::Refresh, Uuid::new_v4(), None).unwrap();

        assert!(!codec.verify(TokenKind::Refresh, &access.token));
        assert!(!codec.verify(TokenKind::Access, &refresh.token));
    }

    #[test]
    fn test_tokens_issued_together_are_distinct() {
        let codec = create_test_codec();
        let user_id = Uuid::new_v4();
        let a = codec.issue(TokenKind::Access, user_id, Some(Role::Admin)).unwrap();
        let b = codec.issue(TokenKind::Access, user_id, Some(Role::Admin)).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_expired_token_fails_verification() {
        let codec = create_test_codec();
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            role: Some(Role::VegetableGuy),
            typ: TokenKind::Access,
            jti: Uuid::new_v4(),
            iat: now - 3600,
            exp: now - 1,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &codec.access.encoding).unwrap();

        assert!(!codec.verify(TokenKind::Access, &token));
        // Still readable as a hint
        assert_eq!(codec.decode_unverified(&token), Some(claims));
    }

    #[test]
    fn test_wrong_secret_and_garbage() {
        let codec = create_test_codec();
        let other = TokenCodec::new(&AuthConfig {
            access_token: AccessTokenConfig {
                secret: Some("someone-else".to_string()),
                ..Default::default()
            },
            refresh_token: RefreshTokenConfig {
                secret: Some("someone-else-refresh".to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();

        let foreign = other.issue(TokenKind::Access, Uuid::new_v4(), Some(Role::Admin)).unwrap();
        assert!(!codec.verify(TokenKind::Access, &foreign.token));
        assert!(!codec.verify(TokenKind::Access, "not.a.jwt"));
        assert!(!codec.verify(TokenKind::Access, ""));
        assert!(codec.decode_unverified("garbage").is_none());
    }
}
