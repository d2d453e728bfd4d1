use std::sync::LazyLock;

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::Utc;
use tracing::{info, warn};

use msgly_db::Database;
use msgly_db::models::NewUser;
use msgly_types::api::RegisterRequest;
use msgly_types::models::UserProfile;

use crate::error::{ApiError, ApiResult};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 8;

/// Verified against when the username does not exist, so an unknown user
/// costs the same Argon2 work as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_secret("msgly-dummy-password").ok());

/// Build the dummy hash now rather than on the first unknown-user login,
/// which would otherwise pay for an extra hash. Returns whether it is usable.
pub fn prime_dummy_hash() -> bool {
    LazyLock::force(&DUMMY_HASH).is_some()
}

/// Hash a secret with Argon2id and a fresh random salt. Returns a PHC string.
pub fn hash_secret(secret: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// `Ok(false)` on mismatch; `Err` only if the stored hash is unreadable.
pub fn verify_secret(secret: &str, phc: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(phc).map_err(|e| anyhow!("Invalid password hash format: {}", e))?;

    match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("Password verification failed: {}", e)),
    }
}

/// Check a claimed username/secret pair against the stored digest.
pub fn verify_credentials(db: &Database, username: &str, secret: &str) -> ApiResult<bool> {
    let user = db
        .get_user_by_username(username)?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(verify_secret(secret, &user.password)?)
}

/// Log a user in: any failure, including an unknown username, is
/// `Unauthorized`. Only success touches `last_login_at`.
pub fn authenticate(db: &Database, username: &str, secret: &str) -> ApiResult<()> {
    match verify_credentials(db, username, secret) {
        Ok(true) => {
            db.update_last_login(username, Utc::now())?;
            info!("User {} logged in", username);
            Ok(())
        }
        Ok(false) => {
            warn!("Failed login for {}", username);
            Err(ApiError::Unauthorized)
        }
        Err(ApiError::NotFound(_)) => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_secret(secret, dummy);
            }
            warn!("Failed login for unknown user");
            Err(ApiError::Unauthorized)
        }
        Err(e) => Err(e),
    }
}

/// Create a user. `join_at` and `last_login_at` both start at now.
pub fn register(db: &Database, req: &RegisterRequest) -> ApiResult<UserProfile> {
    validate_registration(req)?;

    // Check first so a taken name doesn't pay for a hash
    if db.user_exists(&req.username)? {
        return Err(ApiError::Conflict);
    }

    let password_hash = hash_secret(&req.password)?;

    let inserted = db.insert_user(&NewUser {
        username: &req.username,
        password_hash: &password_hash,
        first_name: &req.first_name,
        last_name: &req.last_name,
        phone: &req.phone,
        now: Utc::now(),
    })?;
    if !inserted {
        return Err(ApiError::Conflict);
    }

    info!("Registered user {}", req.username);
    Ok(UserProfile {
        username: req.username.clone(),
        first_name: req.first_name.clone(),
        last_name: req.last_name.clone(),
        phone: req.phone.clone(),
    })
}

fn validate_registration(req: &RegisterRequest) -> ApiResult<()> {
    let len = req.username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(ApiError::BadRequest(format!(
            "username must be {}-{} characters",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        )));
    }
    if !req
        .username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ApiError::BadRequest(
            "username may only contain letters, digits, '_', '.' and '-'".into(),
        ));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(ApiError::BadRequest("first and last name are required".into()));
    }
    Ok(())
}
