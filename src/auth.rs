//! Password hashing and session management.
//!
//! Passwords are hashed with Argon2id into PHC-formatted strings; the
//! plaintext is never stored. Sessions are an in-process map from a
//! cookie-carried token to the authenticated identity, expiring after a
//! configured idle TTL.

use argon2::{
    Argon2, PasswordHash, PasswordHasher as ArgonPasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{CitycastError, Result};

/// Cookie under which the session token travels.
pub const SESSION_COOKIE: &str = "citycast_session";

/// Argon2id password hasher producing PHC-formatted hash strings.
#[derive(Debug, Clone, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Hash a plaintext password with a fresh random salt.
    pub fn hash(&self, plain: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        let hash = argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| CitycastError::general(format!("password hashing failed: {e}")))?;

        Ok(hash.to_string())
    }

    /// Verify a plaintext password against a stored PHC hash.
    pub fn verify(&self, plain: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| CitycastError::general(format!("invalid password hash: {e}")))?;

        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}

/// An authenticated identity bound to a session token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// In-process session store.
///
/// Tokens are UUIDv4 strings; expired entries count as absent and are
/// dropped on access.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Bind a user to a fresh token.
    pub fn create(&self, user_id: i64, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            user_id,
            username: username.to_string(),
            expires_at: Utc::now() + self.ttl,
        };
        self.inner.write().insert(token.clone(), session);
        token
    }

    /// Resolve a token to its session, treating expired entries as absent.
    pub fn get(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        {
            let sessions = self.inner.read();
            match sessions.get(token) {
                Some(session) if session.expires_at > now => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it outside the read lock.
        self.inner.write().remove(token);
        None
    }

    /// Unbind a token.
    pub fn remove(&self, token: &str) {
        self.inner.write().remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_creates_phc_format() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("password123").unwrap();
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn verify_correct_password_succeeds() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("password123").unwrap();
        assert!(hasher.verify("password123", &hash).unwrap());
    }

    #[test]
    fn verify_wrong_password_fails() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("password123").unwrap();
        assert!(!hasher.verify("password124", &hash).unwrap());
    }

    #[test]
    fn stored_hash_fails_as_a_guess() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("password123").unwrap();
        assert!(!hasher.verify(&hash, &hash).unwrap());
    }

    #[test]
    fn same_password_hashes_differently_but_both_verify() {
        let hasher = PasswordHasher::new();
        let first = hasher.hash("password123").unwrap();
        let second = hasher.hash("password123").unwrap();
        assert_ne!(first, second);
        assert!(hasher.verify("password123", &first).unwrap());
        assert!(hasher.verify("password123", &second).unwrap());
    }

    #[test]
    fn verify_garbage_hash_is_an_error() {
        let hasher = PasswordHasher::new();
        assert!(hasher.verify("password123", "not-a-hash").is_err());
    }

    #[test]
    fn session_roundtrip() {
        let store = SessionStore::new(60);
        let token = store.create(7, "testuser");
        let session = store.get(&token).unwrap();
        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "testuser");
    }

    #[test]
    fn unknown_token_is_none() {
        let store = SessionStore::new(60);
        assert!(store.get("no-such-token").is_none());
    }

    #[test]
    fn removed_session_is_gone() {
        let store = SessionStore::new(60);
        let token = store.create(1, "testuser");
        store.remove(&token);
        assert!(store.get(&token).is_none());
    }

    #[test]
    fn expired_session_counts_as_absent() {
        let store = SessionStore::new(0);
        let token = store.create(1, "testuser");
        assert!(store.get(&token).is_none());
    }
}
