use argon2::{
    password_hash::{
        rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher,
        PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{Post, User};

/// Capability stored on the user row. Replaces any notion of a hardcoded
/// admin allow-list: deletion rights come from here or from ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PasswordError {
    #[error("invalid credentials")]
    Mismatch,
    #[error("password hash error: {0}")]
    Hash(String),
}

// Hash of an unguessable throwaway value, verified when login hits an
// unknown email so both paths cost one argon2 run.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$MDEyMzQ1Njc4OWFiY2RlZg$gwN6hT1sNdk9kI95f7n2Gl3fL0qRmBf2Ffkj2r90/0M";

fn argon2() -> Result<Argon2<'static>, PasswordError> {
    let params =
        Params::new(19 * 1024, 2, 1, None).map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(raw: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2()?
        .hash_password(raw.as_bytes(), &salt)
        .map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

pub fn verify_password(raw: &str, stored: &str) -> Result<(), PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|e| PasswordError::Hash(e.to_string()))?;
    argon2()?
        .verify_password(raw.as_bytes(), &parsed)
        .map_err(|e| match e {
            PasswordHashError::Password => PasswordError::Mismatch,
            other => PasswordError::Hash(other.to_string()),
        })
}

/// Burn an argon2 verification against a dummy hash. Called when the email
/// lookup misses, so response timing does not reveal which emails exist.
pub fn burn_verification(raw: &str) {
    let _ = verify_password(raw, DUMMY_HASH);
}

pub fn is_admin(user: &User) -> bool {
    user.role.parse::<Role>() == Ok(Role::Admin)
}

/// Deletion rule: the author may delete their own post, admins may delete
/// anything.
pub fn can_delete_post(post: &Post, user: &User) -> bool {
    post.user_id == user.id || is_admin(user)
}

/// Role granted at signup. Emails listed in `BOOTSTRAP_ADMIN_EMAILS`
/// (comma-separated) become admins; everyone else starts as a plain user.
pub fn signup_role(email: &str) -> Role {
    let bootstrap = std::env::var("BOOTSTRAP_ADMIN_EMAILS").unwrap_or_default();
    let is_bootstrap_admin = bootstrap
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .any(|s| s.trim() == email);
    if is_bootstrap_admin {
        Role::Admin
    } else {
        Role::User
    }
}
