//! JWT authentication
//!
//! Access and refresh tokens (HS256), revocation by token id, failed-login
//! lockout and bcrypt password hashing.

use anyhow::{bail, Context, Result};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::error::ApiError;
use crate::config::AuthConfig;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub username: String,
    /// Issued at
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
    pub token_type: TokenType,
    /// Token ID for revocation
    pub jti: String,
}

/// Token type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Access + refresh pair handed out at login and refresh
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Authentication state
pub struct AuthState {
    secret: String,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
    max_login_attempts: u32,
    lockout_duration_minutes: i64,
    bcrypt_cost: u32,
    /// Hash checked for unknown accounts so their logins cost as much as real ones
    decoy_hash: tokio::sync::OnceCell<String>,
    /// Revoked token IDs (for logout and refresh rotation)
    revoked_tokens: RwLock<HashMap<String, DateTime<Utc>>>,
    /// Failed login attempts
    login_attempts: RwLock<HashMap<String, (u32, DateTime<Utc>)>>,
}

impl AuthState {
    pub fn new(config: &AuthConfig, secret: String) -> Arc<Self> {
        Arc::new(Self {
            secret,
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
            max_login_attempts: config.max_login_attempts,
            lockout_duration_minutes: config.lockout_duration_minutes,
            bcrypt_cost: config.bcrypt_cost,
            decoy_hash: tokio::sync::OnceCell::new(),
            revoked_tokens: RwLock::new(HashMap::new()),
            login_attempts: RwLock::new(HashMap::new()),
        })
    }

    fn issue(&self, user_id: &str, username: &str, token_type: TokenType, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            token_type,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to encode JWT")
    }

    pub fn generate_access_token(&self, user_id: &str, username: &str) -> Result<String> {
        self.issue(
            user_id,
            username,
            TokenType::Access,
            Duration::minutes(self.access_token_expiry_minutes),
        )
    }

    pub fn generate_refresh_token(&self, user_id: &str, username: &str) -> Result<String> {
        self.issue(
            user_id,
            username,
            TokenType::Refresh,
            Duration::days(self.refresh_token_expiry_days),
        )
    }

    pub fn generate_pair(&self, user_id: &str, username: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.generate_access_token(user_id, username)?,
            refresh_token: self.generate_refresh_token(user_id, username)?,
            expires_in: self.access_token_expiry_minutes * 60,
        })
    }

    /// Validate and decode token
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .context("Invalid token")?;

        if self.is_token_revoked(&token_data.claims.jti) {
            bail!("Token has been revoked");
        }

        Ok(token_data.claims)
    }

    /// Extract JTI from a correctly signed token, even an expired one
    pub fn extract_jti(&self, token: &str) -> Result<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .context("Failed to decode token")?;

        Ok(token_data.claims.jti)
    }

    /// Exchange a refresh token for a new pair; the old one is revoked
    pub fn rotate(&self, refresh_token: &str) -> Result<(Claims, TokenPair)> {
        let claims = self.validate_token(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            bail!("Not a refresh token");
        }
        self.revoke_token(&claims.jti);
        let pair = self.generate_pair(&claims.sub, &claims.username)?;
        Ok((claims, pair))
    }

    /// Revoke a token (logout)
    pub fn revoke_token(&self, jti: &str) {
        self.revoked_tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(jti.to_string(), Utc::now());
    }

    fn is_token_revoked(&self, jti: &str) -> bool {
        self.revoked_tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(jti)
    }

    /// Record failed login attempt
    pub fn record_failed_login(&self, identifier: &str) {
        let mut attempts = self.login_attempts.write().unwrap_or_else(PoisonError::into_inner);
        let entry = attempts.entry(identifier.to_string()).or_insert((0, Utc::now()));
        entry.0 += 1;
        entry.1 = Utc::now();
    }

    /// Remaining lockout, if the identifier is locked
    pub fn is_locked(&self, identifier: &str) -> Option<Duration> {
        let attempts = self.login_attempts.read().unwrap_or_else(PoisonError::into_inner);
        let (count, last_attempt) = attempts.get(identifier)?;
        if *count < self.max_login_attempts {
            return None;
        }
        let lockout_end = *last_attempt + Duration::minutes(self.lockout_duration_minutes);
        let now = Utc::now();
        (now < lockout_end).then(|| lockout_end - now)
    }

    /// Clear login attempts (on successful login)
    pub fn clear_login_attempts(&self, identifier: &str) {
        self.login_attempts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identifier);
    }

    /// Run a full bcrypt check for an account that does not exist; always false
    pub async fn verify_decoy(&self, password: &str) -> Result<bool> {
        let hash = self
            .decoy_hash
            .get_or_try_init(|| async { hash_password(&generate_reset_token(), self.bcrypt_cost).await })
            .await?;
        verify_password(password, hash).await?;
        Ok(false)
    }

    /// Drop revocations older than the refresh lifetime and stale lockouts
    pub fn cleanup(&self) {
        let now = Utc::now();
        let keep_revoked = Duration::days(self.refresh_token_expiry_days);
        self.revoked_tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, revoked_at| now - *revoked_at <= keep_revoked);

        let lockout = Duration::minutes(self.lockout_duration_minutes);
        self.login_attempts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, (_, last)| now - *last <= lockout);
    }
}

/// Generate a secure JWT secret
pub fn generate_jwt_secret() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

/// Random password-reset token (32 bytes, hex)
pub fn generate_reset_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

/// bcrypt hash, computed off the async runtime
pub async fn hash_password(password: &str, cost: u32) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("Hashing task panicked")?
        .context("Failed to hash password")
}

/// Check a password against a stored bcrypt hash. A malformed hash never
/// verifies.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("Verification task panicked")?;

    Ok(verified.unwrap_or_else(|e| {
        tracing::warn!("Stored password hash is unusable: {}", e);
        false
    }))
}

/// Token from `Authorization: Bearer ...` or a `token` query parameter
fn request_token(request: &Request) -> Option<String> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    header.or_else(|| {
        request.uri().query().and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "token")
                .map(|(_, value)| value.to_string())
                .filter(|t| !t.is_empty())
        })
    })
}

/// Axum middleware for JWT authentication
pub async fn auth_middleware(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("Not authorized, no token".into()))?;

    let claims = state.validate_token(&token).map_err(|e| {
        tracing::debug!("Rejected token: {:#}", e);
        ApiError::Unauthorized("Not authorized, token failed".into())
    })?;

    if claims.token_type != TokenType::Access {
        return Err(ApiError::Unauthorized("Not authorized, token failed".into()));
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn state() -> Arc<AuthState> {
        AuthState::new(&AuthConfig::default(), generate_jwt_secret())
    }

    #[test]
    fn test_jwt_generation_and_validation() {
        let state = state();
        let token = state.generate_access_token("user123", "ada").unwrap();
        let claims = state.validate_token(&token).unwrap();

        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.username, "ada");
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn test_token_revocation() {
        let state = state();
        let token = state.generate_access_token("user123", "ada").unwrap();
        let jti = state.extract_jti(&token).unwrap();

        state.revoke_token(&jti);
        assert!(state.validate_token(&token).is_err());
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = state().generate_access_token("user123", "ada").unwrap();
        assert!(state().validate_token(&token).is_err());
    }

    #[test]
    fn test_refresh_rotation() {
        let state = state();
        let refresh = state.generate_refresh_token("user123", "ada").unwrap();

        let (claims, pair) = state.rotate(&refresh).unwrap();
        assert_eq!(claims.sub, "user123");
        assert_eq!(state.validate_token(&pair.access_token).unwrap().token_type, TokenType::Access);

        // old refresh token is single-use
        assert!(state.rotate(&refresh).is_err());
        // access tokens cannot be rotated
        assert!(state.rotate(&pair.access_token).is_err());
    }

    #[test]
    fn test_lockout_after_max_attempts() {
        let state = state();
        for _ in 0..4 {
            state.record_failed_login("a@b.c");
        }
        assert!(state.is_locked("a@b.c").is_none());

        state.record_failed_login("a@b.c");
        assert!(state.is_locked("a@b.c").is_some());

        state.clear_login_attempts("a@b.c");
        assert!(state.is_locked("a@b.c").is_none());
    }

    #[test]
    fn test_reset_token_shape() {
        let token = generate_reset_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_reset_token());
    }

    #[tokio::test]
    async fn test_password_hashing() {
        let hash = hash_password("my_secure_password", 4).await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("my_secure_password", &hash).await.unwrap());
        assert!(!verify_password("wrong_password", &hash).await.unwrap());
        assert!(!verify_password("x", "not-a-hash").await.unwrap());
    }

    #[tokio::test]
    async fn test_decoy_never_verifies() {
        let config = AuthConfig {
            bcrypt_cost: 4,
            ..Default::default()
        };
        let state = AuthState::new(&config, generate_jwt_secret());
        assert!(!state.verify_decoy("anything").await.unwrap());
        let first = state.decoy_hash.get().cloned().unwrap();
        assert!(first.starts_with("$2"));
        assert!(!state.verify_decoy("anything").await.unwrap());
        assert_eq!(state.decoy_hash.get(), Some(&first));
    }

    #[test]
    fn test_token_from_header_or_query() {
        let req = axum::http::Request::builder()
            .uri("/dashboard/progress")
            .header(AUTHORIZATION, "Bearer abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_token(&req).as_deref(), Some("abc"));

        let req = axum::http::Request::builder()
            .uri("/dashboard/progress?x=1&token=def")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_token(&req).as_deref(), Some("def"));

        let req = axum::http::Request::builder().uri("/dashboard/progress").body(Body::empty()).unwrap();
        assert!(request_token(&req).is_none());
    }
}
