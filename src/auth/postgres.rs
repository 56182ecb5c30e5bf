//! PostgreSQL user store

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, NoTls, Row};

use super::store::{User, UserStore};
use crate::cli::config::PostgresConfig;
use crate::errors::{LexiError, Result};

pub const USERS_DDL: &str = "
CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    username VARCHAR(50) UNIQUE NOT NULL,
    email VARCHAR(100) UNIQUE NOT NULL,
    password_hash VARCHAR(255) NOT NULL,
    salt VARCHAR(32) NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    last_login TIMESTAMP,
    is_active BOOLEAN DEFAULT TRUE,
    profile_data JSONB DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
";

const USER_COLUMNS: &str = "id, username, email, password_hash, salt, created_at, last_login, is_active";

/// How the connection is secured, from the libpq `sslmode` names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsPolicy {
    Disable,
    /// Encrypt, do not verify the server certificate
    Encrypt { required: bool },
    /// Encrypt and verify the certificate chain
    VerifyCa,
    /// Encrypt and verify chain plus hostname
    VerifyFull,
}

impl TlsPolicy {
    pub fn from_sslmode(mode: &str) -> Result<Self> {
        match mode.trim().to_lowercase().as_str() {
            "disable" => Ok(TlsPolicy::Disable),
            "allow" | "prefer" => Ok(TlsPolicy::Encrypt { required: false }),
            "require" | "" => Ok(TlsPolicy::Encrypt { required: true }),
            "verify-ca" => Ok(TlsPolicy::VerifyCa),
            "verify-full" => Ok(TlsPolicy::VerifyFull),
            other => Err(LexiError::ConfigError(format!("Unknown sslmode: {}", other))),
        }
    }

    fn ssl_mode(&self) -> SslMode {
        match self {
            TlsPolicy::Disable => SslMode::Disable,
            TlsPolicy::Encrypt { required: false } => SslMode::Prefer,
            _ => SslMode::Require,
        }
    }

    fn connector(&self) -> Result<MakeTlsConnector> {
        let (accept_certs, accept_hostnames) = match self {
            TlsPolicy::VerifyFull => (false, false),
            TlsPolicy::VerifyCa => (false, true),
            _ => (true, true),
        };
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(accept_certs)
            .danger_accept_invalid_hostnames(accept_hostnames)
            .build()
            .map_err(|e| LexiError::DatabaseError(format!("TLS setup failed: {}", e)))?;
        Ok(MakeTlsConnector::new(connector))
    }
}

/// Users table in PostgreSQL; reconnects when the connection drops
pub struct PostgresUserStore {
    config: tokio_postgres::Config,
    tls: TlsPolicy,
    client: RwLock<Option<Arc<Client>>>,
    label: String,
}

impl PostgresUserStore {
    pub fn new(config: &PostgresConfig) -> Result<Self> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user)
            .connect_timeout(Duration::from_secs(10));
        if let Some(password) = &config.password {
            pg.password(password);
        }

        let tls = TlsPolicy::from_sslmode(&config.sslmode)?;
        pg.ssl_mode(tls.ssl_mode());

        Ok(Self {
            config: pg,
            tls,
            client: RwLock::new(None),
            label: format!("{}@{}:{}/{}", config.user, config.host, config.port, config.database),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    async fn client(&self) -> Result<Arc<Client>> {
        if let Some(client) = self.client.read().await.as_ref() {
            if !client.is_closed() {
                return Ok(client.clone());
            }
        }

        let mut slot = self.client.write().await;
        if let Some(client) = slot.as_ref() {
            if !client.is_closed() {
                return Ok(client.clone());
            }
        }

        let client = Arc::new(self.connect().await?);
        *slot = Some(client.clone());
        Ok(client)
    }

    async fn connect(&self) -> Result<Client> {
        tracing::debug!(db = %self.label, tls = ?self.tls, "connecting to postgres");
        match self.tls {
            TlsPolicy::Disable => {
                let (client, connection) = self.config.connect(NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::warn!(error = %e, "postgres connection closed");
                    }
                });
                Ok(client)
            }
            _ => {
                let (client, connection) = self.config.connect(self.tls.connector()?).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::warn!(error = %e, "postgres connection closed");
                    }
                });
                Ok(client)
            }
        }
    }
}

fn user_from_row(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        salt: row.try_get("salt")?,
        created_at: row
            .try_get::<_, Option<NaiveDateTime>>("created_at")?
            .unwrap_or_else(|| Utc::now().naive_utc()),
        last_login: row.try_get("last_login")?,
        is_active: row.try_get::<_, Option<bool>>("is_active")?.unwrap_or(true),
    })
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.client().await?.batch_execute(USERS_DDL).await?;
        tracing::info!("users table ready");
        Ok(())
    }

    async fn user_exists(&self, username: &str, email: &str) -> Result<bool> {
        let row = self
            .client()
            .await?
            .query_one(
                "SELECT COUNT(*) FROM users WHERE username = $1 OR email = $2",
                &[&username, &email],
            )
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count > 0)
    }

    async fn insert_user(&self, username: &str, email: &str, password_hash: &str, salt: &str) -> Result<User> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, salt) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        );
        let row = self
            .client()
            .await?
            .query_one(sql.as_str(), &[&username, &email, &password_hash, &salt])
            .await?;
        user_from_row(&row)
    }

    async fn find_active(&self, username: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE username = $1 AND is_active = TRUE",
            USER_COLUMNS
        );
        let row = self.client().await?.query_opt(sql.as_str(), &[&username]).await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn touch_last_login(&self, id: i32) -> Result<()> {
        self.client()
            .await?
            .execute("UPDATE users SET last_login = CURRENT_TIMESTAMP WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.client().await?.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
