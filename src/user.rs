//! Registered users and their credentials.

use crate::store::StoreError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// A registered shell user.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// `salt$digest`, both hex. `None` when the account has no password.
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user already exists: {0}")]
    AlreadyExists(String),
    #[error("user not found: {0}")]
    NotFound(String),
    #[error("invalid password")]
    InvalidPassword,
    #[error("username must not be empty")]
    EmptyUsername,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Storage operations on users.
pub trait UserRepository: Send + Sync {
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    /// Insert a new user and return it with its assigned id.
    fn create_user(&self, username: &str, password_hash: Option<&str>) -> Result<User, StoreError>;
    fn list_users(&self) -> Result<Vec<User>, StoreError>;
    fn update_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;
}

pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    fn find_user(&self, username: &str) -> Result<User, UserError> {
        self.repo
            .find_user_by_username(username)?
            .ok_or_else(|| UserError::NotFound(username.to_string()))
    }

    /// Register `username`. An empty password creates an account that logs
    /// in without credentials.
    pub fn create_user(&self, username: &str, password: &str) -> Result<User, UserError> {
        if username.is_empty() {
            return Err(UserError::EmptyUsername);
        }
        if self.repo.find_user_by_username(username)?.is_some() {
            return Err(UserError::AlreadyExists(username.to_string()));
        }

        let hash = (!password.is_empty()).then(|| hash_password(password));
        let user = self.repo.create_user(username, hash.as_deref())?;
        info!(user = %user.username, id = user.id, "user created");
        Ok(user)
    }

    /// Check credentials and stamp the login time.
    pub fn login_user(&self, username: &str, password: &str) -> Result<User, UserError> {
        let mut user = self.find_user(username)?;

        if let Some(hash) = &user.password_hash {
            if !verify_password(hash, password) {
                debug!(user = %username, "password rejected");
                return Err(UserError::InvalidPassword);
            }
        }

        let now = Utc::now();
        self.repo.update_last_login(user.id, now)?;
        user.last_login = Some(now);
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>, UserError> {
        Ok(self.repo.list_users()?)
    }
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    format!("{}${}", hex::encode(salt), digest(&salt, password))
}

pub(crate) fn verify_password(stored: &str, password: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    match hex::decode(salt) {
        Ok(salt) => digest(&salt, password) == expected,
        Err(_) => false,
    }
}
