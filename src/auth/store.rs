//! User records and the storage seam

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

use crate::errors::Result;

/// Row of the `users` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub created_at: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
    pub is_active: bool,
}

/// What callers get to see about a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub last_login: Option<NaiveDateTime>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            last_login: user.last_login,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create the users table and its indexes when missing
    async fn ensure_schema(&self) -> Result<()>;

    /// Whether any user has this username or email
    async fn user_exists(&self, username: &str, email: &str) -> Result<bool>;

    async fn insert_user(&self, username: &str, email: &str, password_hash: &str, salt: &str) -> Result<User>;

    /// Active user by username
    async fn find_active(&self, username: &str) -> Result<Option<User>>;

    async fn touch_last_login(&self, id: i32) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

/// Process-local user store
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user inactive; they can no longer log in
    pub fn deactivate(&self, username: &str) -> bool {
        let mut users = self.lock();
        match users.iter_mut().find(|u| u.username == username) {
            Some(user) => {
                user.is_active = false;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<User>> {
        self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn user_exists(&self, username: &str, email: &str) -> Result<bool> {
        Ok(self
            .lock()
            .iter()
            .any(|u| u.username == username || u.email == email))
    }

    async fn insert_user(&self, username: &str, email: &str, password_hash: &str, salt: &str) -> Result<User> {
        let mut users = self.lock();
        let user = User {
            id: users.len() as i32 + 1,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            salt: salt.to_string(),
            created_at: Utc::now().naive_utc(),
            last_login: None,
            is_active: true,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_active(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .lock()
            .iter()
            .find(|u| u.username == username && u.is_active)
            .cloned())
    }

    async fn touch_last_login(&self, id: i32) -> Result<()> {
        if let Some(user) = self.lock().iter_mut().find(|u| u.id == id) {
            user.last_login = Some(Utc::now().naive_utc());
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
