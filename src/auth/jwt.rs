//! # Session Tokens
//!
//! Compact HS256 tokens minted for logged-in users. The claims are whatever
//! the login query returned plus an `exp` timestamp; verification yields
//! the same claims back.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};

use super::errors::{AuthError, AuthResult};

/// Default session lifetime
pub const SESSION_TTL_HOURS: i64 = 72;

/// Session token configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Signing key, shared by all nodes
    pub secret: String,

    /// Token lifetime
    pub ttl: Duration,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::hours(SESSION_TTL_HOURS),
        }
    }
}

/// The logged-in user identified by a session token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginUser {
    pub id: String,
    pub code: String,
}

impl LoginUser {
    /// Pick the user id and code out of session claims
    pub fn from_claims(claims: &Map<String, Value>) -> Self {
        Self {
            id: claim_text(claims, &["id", "user_id"]),
            code: claim_text(claims, &["code", "email", "user_code"]),
        }
    }
}

fn claim_text(claims: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| {
            claims
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

/// Signs and verifies session tokens
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Sign `claims` with an `exp` of now plus the configured lifetime
    pub fn sign(&self, mut claims: Map<String, Value>) -> AuthResult<String> {
        let exp = Utc::now() + self.config.ttl;
        claims.insert("exp".to_string(), Value::from(exp.timestamp()));
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| AuthError::TokenGenerationFailed)
    }

    /// Verify signature and expiry, returning the claims
    pub fn verify(&self, token: &str) -> AuthResult<Map<String, Value>> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            },
        )?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("ttl", &self.config.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> JwtManager {
        JwtManager::new(JwtConfig::new("test_secret_key_for_testing_only"))
    }

    fn claims(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let m = manager();
        let token = m.sign(claims(json!({"id": 7, "email": "a@b.c"}))).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let back = m.verify(&token).unwrap();
        assert_eq!(back["email"], json!("a@b.c"));
        let exp = back["exp"].as_i64().unwrap();
        let expected = (Utc::now() + Duration::hours(72)).timestamp();
        assert!((exp - expected).abs() < 60);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = manager().sign(Map::new()).unwrap();
        let other = JwtManager::new(JwtConfig::new("another_secret"));
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let m = JwtManager::new(JwtConfig {
            secret: "s".into(),
            ttl: Duration::hours(-2),
        });
        let token = m.sign(Map::new()).unwrap();
        assert!(matches!(m.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_login_user_from_claims() {
        let user = LoginUser::from_claims(&claims(json!({"ID": 42, "EMAIL": "x@y.z"})));
        assert_eq!(user.id, "42");
        assert_eq!(user.code, "x@y.z");
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(manager().verify("not-a-token"), Err(AuthError::MalformedToken)));
    }
}
