use std::sync::Arc;
use std::time::Duration;

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::{rngs::OsRng, Rng};
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::dto::{Claims, JwtKeys, SignupRequest, VerifyEmailRequest};
use crate::config::JwtConfig;
use crate::email::{self, Mailer};
use crate::error::ApiError;
use crate::models::{User, UserProfile};
use crate::state::AppState;
use crate::store::Store;

/// Verification codes are valid for 24 hours after signup.
pub const VERIFICATION_CODE_TTL: TimeDuration = TimeDuration::hours(24);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Six random digits, leading zeros allowed.
pub fn generate_verification_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{code:06}")
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            session_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    /// Stateless session token bound to the user id; no server-side session
    /// store exists.
    pub fn sign_session(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.session_ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

/// Create an unverified account and queue the verification email. Delivery
/// failure never blocks account creation.
pub async fn register(
    store: &dyn Store,
    mailer: &Arc<dyn Mailer>,
    mut req: SignupRequest,
) -> Result<User, ApiError> {
    req.email = req.email.trim().to_lowercase();

    if !is_valid_email(&req.email) {
        warn!(email = %req.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if req.password != req.confirm_password {
        return Err(ApiError::Validation("Passwords do not match".into()));
    }
    if req.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::Validation("Password too short".into()));
    }
    if store.find_user_by_email(&req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let code = generate_verification_code();
    let now = OffsetDateTime::now_utc();
    let user = User {
        id: Uuid::new_v4(),
        email: req.email,
        password_hash: hash_password(&req.password)?,
        is_verified: false,
        verification_code: Some(code.clone()),
        verification_expires: Some(now + VERIFICATION_CODE_TTL),
        profile: UserProfile::default(),
        addresses: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    store.insert_user(&user).await?;

    let mailer = mailer.clone();
    let to = user.email.clone();
    email::spawn_send("verification", async move {
        mailer.send_verification_email(&to, &code).await
    });

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

/// unverified -> verified transition. Once verified the code and expiry are
/// cleared and can never be replayed.
pub async fn verify_email(store: &dyn Store, req: VerifyEmailRequest) -> Result<(), ApiError> {
    let email = req.email.trim().to_lowercase();
    let user = store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    if user.is_verified {
        return Err(ApiError::AlreadyVerified);
    }
    if user.verification_code.as_deref() != Some(req.verification_code.as_str()) {
        return Err(ApiError::InvalidCode);
    }
    if let Some(expires) = user.verification_expires {
        if OffsetDateTime::now_utc() > expires {
            return Err(ApiError::ExpiredCode);
        }
    }

    store.mark_user_verified(&email).await?;
    info!(user_id = %user.id, email = %user.email, "email verified");
    Ok(())
}

/// Returns `None` for an unknown email or a wrong password. Callers must not
/// be able to tell which.
pub async fn authenticate(
    store: &dyn Store,
    email: &str,
    password: &str,
) -> Result<Option<User>, ApiError> {
    let email = email.trim().to_lowercase();
    let Some(user) = store.find_user_by_email(&email).await? else {
        return Ok(None);
    };
    if !verify_password(password, &user.password_hash)? {
        return Ok(None);
    }
    Ok(Some(user))
}

/// Authenticated, verified caller. The verification flag is re-checked on
/// every request, so a demoted user is denied on their next call, not just
/// at login.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let keys = JwtKeys::from_ref(&state);

        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            ApiError::Unauthorized("Invalid or expired token".into())
        })?;

        let user = state
            .store
            .find_user_by_id(claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".into()))?;
        if !user.is_verified {
            return Err(ApiError::Unverified);
        }

        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod password_tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn verification_code_is_six_digits() {
        for _ in 0..32 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last@sub.example.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("two@@example.com"));
    }
}

#[cfg(test)]
mod jwt_tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::in_memory();
        JwtKeys::from_ref(&state)
    }

    #[test]
    fn sign_and_verify_session_token() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_session(user_id).expect("sign session");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn verify_rejects_foreign_secret() {
        let keys = make_keys();
        let foreign = JwtKeys {
            encoding: EncodingKey::from_secret(b"other-secret"),
            decoding: DecodingKey::from_secret(b"other-secret"),
            issuer: keys.issuer.clone(),
            audience: keys.audience.clone(),
            session_ttl: keys.session_ttl,
        };
        let token = foreign.sign_session(Uuid::new_v4()).expect("sign");
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_garbage() {
        let keys = make_keys();
        assert!(keys.verify("definitely-not-a-jwt").is_err());
    }
}
