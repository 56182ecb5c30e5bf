//! User accounts and login sessions
//!
//! `UserManager` reports every outcome as a user-facing message rather than
//! an error; storage failures are logged and collapsed into a generic
//! "please try again".

pub mod password;
pub mod postgres;
pub mod store;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::cli::config::{AuthBackend, Config};
use crate::errors::Result;

pub use password::{generate_salt, hash_password, verify_password};
pub use postgres::{PostgresUserStore, TlsPolicy, USERS_DDL};
pub use store::{MemoryUserStore, User, UserProfile, UserStore};

pub const MSG_REGISTERED: &str = "User registered successfully";
pub const MSG_USER_EXISTS: &str = "Username or email already exists";
pub const MSG_REGISTRATION_FAILED: &str = "Registration failed. Please try again.";
pub const MSG_LOGIN_OK: &str = "Login successful";
pub const MSG_INVALID_LOGIN: &str = "Invalid username or password";
pub const MSG_AUTH_FAILED: &str = "Authentication failed. Please try again.";
pub const MSG_MISSING_FIELDS: &str = "Please fill in all fields";

/// Result of a register or login attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl AuthOutcome {
    fn ok(message: &str, user: UserProfile) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            user: Some(user),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            user: None,
        }
    }
}

/// Store selected by configuration
pub fn open_user_store(config: &Config) -> Result<Arc<dyn UserStore>> {
    match config.auth.backend {
        AuthBackend::Postgres => Ok(Arc::new(PostgresUserStore::new(&config.postgres)?)),
        AuthBackend::Memory => Ok(Arc::new(MemoryUserStore::new())),
    }
}

/// Registration and login
#[derive(Clone)]
pub struct UserManager {
    store: Arc<dyn UserStore>,
    min_password_len: usize,
}

impl UserManager {
    pub fn new(store: Arc<dyn UserStore>, min_password_len: usize) -> Self {
        Self {
            store,
            min_password_len,
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Create the users table if it does not exist
    pub async fn init(&self) -> Result<()> {
        self.store.ensure_schema().await
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> AuthOutcome {
        let (username, email) = (username.trim(), email.trim());
        if username.is_empty() || email.is_empty() || password.is_empty() {
            return AuthOutcome::fail(MSG_MISSING_FIELDS);
        }
        if password.chars().count() < self.min_password_len {
            return AuthOutcome::fail(format!(
                "Password must be at least {} characters long",
                self.min_password_len
            ));
        }

        match self.store.user_exists(username, email).await {
            Ok(true) => return AuthOutcome::fail(MSG_USER_EXISTS),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(error = %e, "user lookup failed during registration");
                return AuthOutcome::fail(MSG_REGISTRATION_FAILED);
            }
        }

        let salt = generate_salt();
        let hash = hash_password(password, &salt);
        match self.store.insert_user(username, email, &hash, &salt).await {
            Ok(user) => {
                tracing::info!(%username, "user registered");
                AuthOutcome::ok(MSG_REGISTERED, UserProfile::from(&user))
            }
            Err(e) => {
                tracing::error!(error = %e, "user registration failed");
                AuthOutcome::fail(MSG_REGISTRATION_FAILED)
            }
        }
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> AuthOutcome {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return AuthOutcome::fail(MSG_MISSING_FIELDS);
        }

        let user = match self.store.find_active(username).await {
            Ok(Some(user)) => user,
            Ok(None) => return AuthOutcome::fail(MSG_INVALID_LOGIN),
            Err(e) => {
                tracing::error!(error = %e, "authentication failed");
                return AuthOutcome::fail(MSG_AUTH_FAILED);
            }
        };

        if !verify_password(password, &user.password_hash, &user.salt) {
            return AuthOutcome::fail(MSG_INVALID_LOGIN);
        }

        if let Err(e) = self.store.touch_last_login(user.id).await {
            tracing::error!(error = %e, "failed to record last login");
            return AuthOutcome::fail(MSG_AUTH_FAILED);
        }

        // The profile reports the login before this one
        AuthOutcome::ok(MSG_LOGIN_OK, UserProfile::from(&user))
    }
}

#[derive(Debug, Clone)]
struct Session {
    user: UserProfile,
    authenticated_at: DateTime<Utc>,
}

/// Opaque bearer tokens valid for a fixed window after login
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<DashMap<String, Session>>,
    duration: Duration,
}

impl SessionManager {
    pub fn new(session_hours: i64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            duration: Duration::hours(session_hours),
        }
    }

    /// Start a session for `user` and return its token
    pub fn login(&self, user: UserProfile) -> String {
        self.login_at(user, Utc::now())
    }

    fn login_at(&self, user: UserProfile, at: DateTime<Utc>) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            token.clone(),
            Session {
                user,
                authenticated_at: at,
            },
        );
        token
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn is_session_valid(&self, token: &str) -> bool {
        self.is_valid_at(token, Utc::now())
    }

    fn is_valid_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        self.sessions
            .get(token)
            .map(|s| now < s.authenticated_at + self.duration)
            .unwrap_or(false)
    }

    /// User behind a valid token
    pub fn current_user(&self, token: &str) -> Option<UserProfile> {
        if !self.is_session_valid(token) {
            return None;
        }
        self.sessions.get(token).map(|s| s.user.clone())
    }

    /// Drop expired sessions, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| now < s.authenticated_at + self.duration);
        before - self.sessions.len()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> UserManager {
        UserManager::new(Arc::new(MemoryUserStore::new()), 6)
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: 1,
            username: "alice".into(),
            email: "a@example.com".into(),
            last_login: None,
        }
    }

    #[tokio::test]
    async fn test_register_validation() {
        let users = manager();
        assert_eq!(users.register("", "a@example.com", "secret1").await.message, MSG_MISSING_FIELDS);
        assert_eq!(
            users.register("alice", "a@example.com", "abc").await.message,
            "Password must be at least 6 characters long"
        );
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let users = manager();
        let first = users.register("alice", "a@example.com", "secret1").await;
        assert!(first.success);
        assert_eq!(first.message, MSG_REGISTERED);

        let dup_name = users.register("alice", "other@example.com", "secret1").await;
        assert_eq!(dup_name.message, MSG_USER_EXISTS);
        let dup_email = users.register("bob", "a@example.com", "secret1").await;
        assert_eq!(dup_email.message, MSG_USER_EXISTS);
    }

    #[tokio::test]
    async fn test_authenticate() {
        let users = manager();
        users.register("alice", "a@example.com", "secret1").await;

        let ok = users.authenticate("alice", "secret1").await;
        assert!(ok.success);
        assert_eq!(ok.message, MSG_LOGIN_OK);
        assert_eq!(ok.user.unwrap().username, "alice");

        assert_eq!(users.authenticate("alice", "wrong!!").await.message, MSG_INVALID_LOGIN);
        assert_eq!(users.authenticate("nobody", "secret1").await.message, MSG_INVALID_LOGIN);
    }

    #[test]
    fn test_session_lifecycle() {
        let sessions = SessionManager::new(24);
        let token = sessions.login(profile());
        assert!(sessions.is_session_valid(&token));
        assert_eq!(sessions.current_user(&token).unwrap().username, "alice");

        assert!(sessions.logout(&token));
        assert!(!sessions.is_session_valid(&token));
        assert!(sessions.current_user(&token).is_none());
        assert!(!sessions.logout(&token));
    }

    #[test]
    fn test_session_expiry() {
        let sessions = SessionManager::new(24);
        let old = sessions.login_at(profile(), Utc::now() - Duration::hours(25));
        let fresh = sessions.login_at(profile(), Utc::now() - Duration::hours(23));

        assert!(!sessions.is_session_valid(&old));
        assert!(sessions.is_session_valid(&fresh));
        assert_eq!(sessions.purge_expired(), 1);
        assert_eq!(sessions.active_sessions(), 1);
    }
}
