//! Redis cache backend

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::time::Duration;

use super::QueryCache;
use crate::cli::config::RedisConfig;
use crate::errors::Result;

/// Keys fetched per SCAN round trip
const SCAN_COUNT: usize = 500;

/// Redis-backed cache using a reconnecting connection manager
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    addr: String,
}

impl RedisCache {
    /// Connect using host/port/password from configuration
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: 0,
                username: None,
                password: config.password.clone(),
                ..Default::default()
            },
        };

        let client = redis::Client::open(info)?;
        let manager = ConnectionManager::new(client).await?;

        tracing::info!(host = %config.host, port = config.port, "connected to redis");

        Ok(Self {
            manager,
            addr: format!("{}:{}", config.host, config.port),
        })
    }

    /// `host:port` this cache is connected to
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl QueryCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.manager.clone();
        let secs: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        // -2 missing key, -1 no expiry
        Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }

    async fn used_memory_bytes(&self) -> Result<u64> {
        let mut conn = self.manager.clone();
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await?;
        Ok(parse_used_memory(&info).unwrap_or(0))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Extract `used_memory` from an `INFO memory` reply
fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory:"))
        .and_then(|value| value.trim().parse().ok())
}
