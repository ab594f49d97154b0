//! Persistent user records with hashed-password credentials.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use tokio::task;
use tracing::{debug, instrument, warn};

use crate::auth::PasswordHasher;
use crate::db::ConnectionPool;
use crate::{CitycastError, Result};

/// Message surfaced when a registration collides with an existing user.
pub const CONFLICT_MESSAGE: &str = "A user with this username or email already exists.";

/// A registered user.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

impl User {
    /// Check a plaintext password against the stored hash.
    #[must_use]
    pub fn check_password(&self, plain: &str) -> bool {
        PasswordHasher::new()
            .verify(plain, &self.password_hash)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Stored password hash could not be parsed");
                false
            })
    }
}

/// SQLite-backed user store.
#[derive(Clone)]
pub struct UserStore {
    pool: Arc<ConnectionPool>,
    hasher: PasswordHasher,
    // Verified against when a username does not exist, so the
    // unknown-user login path does the same work as a failed check.
    dummy_hash: Arc<String>,
}

impl UserStore {
    pub fn new(pool: Arc<ConnectionPool>) -> Result<Self> {
        let hasher = PasswordHasher::new();
        let dummy_hash = Arc::new(hasher.hash("")?);
        Ok(Self {
            pool,
            hasher,
            dummy_hash,
        })
    }

    /// Insert a new user with a freshly salted password hash.
    ///
    /// Uniqueness of username and email is enforced by the database
    /// constraints; a violation surfaces as a conflict. There is no
    /// pre-insert existence check.
    #[instrument(skip(self, password))]
    pub async fn create(&self, username: &str, email: &str, password: &str) -> Result<User> {
        let pool = Arc::clone(&self.pool);
        let hasher = self.hasher.clone();
        let username = username.to_owned();
        let email = email.to_owned();
        let password = password.to_owned();
        let created_at = Utc::now().to_rfc3339();

        task::spawn_blocking(move || {
            let password_hash = hasher.hash(&password)?;
            let conn = pool.get()?;

            let inserted = conn.execute(
                "INSERT INTO users (username, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![username, email, password_hash, created_at],
            );

            match inserted {
                Ok(_) => {
                    let id = conn.last_insert_rowid();
                    debug!(id, "User created");
                    Ok(User {
                        id,
                        username,
                        email,
                        password_hash,
                    })
                }
                Err(e) if is_unique_violation(&e) => {
                    Err(CitycastError::conflict(CONFLICT_MESSAGE))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(|e| CitycastError::general(format!("blocking task failed: {e}")))?
    }

    /// Look up a user by username.
    #[instrument(skip(self))]
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let pool = Arc::clone(&self.pool);
        let username = username.to_owned();

        task::spawn_blocking(move || {
            let conn = pool.get()?;
            let user = conn
                .query_row(
                    "SELECT id, username, email, password_hash FROM users WHERE username = ?1",
                    [&username],
                    row_to_user,
                )
                .optional()?;
            debug!(found = user.is_some(), "Looked up user");
            Ok(user)
        })
        .await
        .map_err(|e| CitycastError::general(format!("blocking task failed: {e}")))?
    }

    /// Verify credentials, returning the user on success.
    ///
    /// Both failure paths do a full password verification, so unknown
    /// usernames are not observably cheaper than wrong passwords.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>> {
        let user = self.find_by_username(username).await?;
        let hasher = self.hasher.clone();
        let password = password.to_owned();

        match user {
            Some(user) => {
                let hash = user.password_hash.clone();
                let ok = task::spawn_blocking(move || {
                    hasher.verify(&password, &hash).unwrap_or(false)
                })
                .await
                .map_err(|e| CitycastError::general(format!("blocking task failed: {e}")))?;
                Ok(ok.then_some(user))
            }
            None => {
                let dummy = Arc::clone(&self.dummy_hash);
                task::spawn_blocking(move || {
                    let _ = hasher.verify(&password, &dummy);
                })
                .await
                .map_err(|e| CitycastError::general(format!("blocking task failed: {e}")))?;
                Ok(None)
            }
        }
    }

    /// Number of stored users.
    pub async fn count(&self) -> Result<i64> {
        let pool = Arc::clone(&self.pool);
        task::spawn_blocking(move || {
            let conn = pool.get()?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            Ok(count)
        })
        .await
        .map_err(|e| CitycastError::general(format!("blocking task failed: {e}")))?
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
