//! Doctor command for system diagnostics
//!
//! Checks every external service and local prerequisite the service needs.

use colored::Colorize;
use std::path::Path;
use sysinfo::{Disks, System};

use crate::auth::{PostgresUserStore, UserStore};
use crate::cache::{QueryCache, RedisCache};
use crate::cli::config::{AuthBackend, CacheBackend, Config};
use crate::documents::find_on_path;
use crate::knowledge::{IndexKind, KnowledgeBase};
use crate::llm::OpenAiClient;
use crate::server::runtime_dirs;
use crate::sync::ensure_writable;

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Extra information shown for passing checks
    pub detail: Option<String>,
}

impl HealthCheck {
    fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Pass,
            detail: None,
        }
    }

    fn pass_with(name: &str, detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::pass(name)
        }
    }

    fn warn(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Warn(message.into()),
            detail: None,
        }
    }

    fn fail(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Fail(message.into()),
            detail: None,
        }
    }
}

/// Doctor diagnostics system
pub struct Doctor {
    config: Config,
}

impl Doctor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        let mut checks = vec![self.check_openai().await, self.check_redis().await, self.check_postgres().await];
        checks.extend(self.check_indexes().await);
        checks.push(self.check_directories());
        checks.push(check_binary("OCR engine", "tesseract"));
        checks.push(check_binary("PDF renderer", "pdftoppm"));
        checks.push(self.check_tracing());
        checks.push(self.check_disk_space());
        checks.push(check_memory());
        checks
    }

    async fn check_openai(&self) -> HealthCheck {
        const NAME: &str = "OpenAI API";
        if self.config.openai.api_key.is_none() {
            return HealthCheck::fail(NAME, "OPENAI_API_KEY is not set");
        }

        let client = match OpenAiClient::with_config(&self.config.openai) {
            Ok(client) => client,
            Err(e) => return HealthCheck::fail(NAME, e.to_string()),
        };
        match client.health_check().await {
            Ok(true) => HealthCheck::pass_with(NAME, client.base_url()),
            Ok(false) => HealthCheck::warn(NAME, "Key configured but the API did not accept it"),
            Err(e) => HealthCheck::fail(NAME, e.to_string()),
        }
    }

    async fn check_redis(&self) -> HealthCheck {
        const NAME: &str = "Query cache";
        if self.config.cache.backend == CacheBackend::Memory {
            return HealthCheck::pass_with(NAME, "in-process");
        }

        match RedisCache::connect(&self.config.redis).await {
            Ok(cache) => match cache.ping().await {
                Ok(()) => HealthCheck::pass_with(NAME, cache.addr()),
                Err(e) => HealthCheck::warn(NAME, format!("Redis ping failed, in-process fallback: {}", e)),
            },
            Err(e) => HealthCheck::warn(NAME, format!("Redis unreachable, in-process fallback: {}", e)),
        }
    }

    async fn check_postgres(&self) -> HealthCheck {
        const NAME: &str = "User store";
        if self.config.auth.backend == AuthBackend::Memory {
            return HealthCheck::warn(NAME, "in-memory store, accounts are lost on restart");
        }

        match PostgresUserStore::new(&self.config.postgres) {
            Ok(store) => match store.ping().await {
                Ok(()) => HealthCheck::pass_with(NAME, store.label().to_string()),
                Err(e) => HealthCheck::fail(NAME, e.to_string()),
            },
            Err(e) => HealthCheck::fail(NAME, e.to_string()),
        }
    }

    async fn check_indexes(&self) -> Vec<HealthCheck> {
        let knowledge = match KnowledgeBase::from_config(&self.config) {
            Ok(knowledge) => knowledge,
            Err(e) => return vec![HealthCheck::fail("Vector indexes", e.to_string())],
        };

        let mut checks = Vec::new();
        for kind in [IndexKind::Laws, IndexKind::Procedures] {
            let name = format!("{} index", kind);
            let store = knowledge.store(kind);
            let check = match store.count().await {
                Ok(0) => HealthCheck::warn(&name, format!("{} is empty", store.describe())),
                Ok(n) => HealthCheck::pass_with(&name, format!("{} documents", n)),
                Err(e) => HealthCheck::fail(&name, e.to_string()),
            };
            checks.push(check);
        }
        checks
    }

    fn check_directories(&self) -> HealthCheck {
        const NAME: &str = "Runtime directories";
        let failures: Vec<String> = runtime_dirs(&self.config)
            .iter()
            .filter_map(|dir| ensure_writable(dir).err().map(|e| format!("{}: {}", dir.display(), e)))
            .collect();

        if failures.is_empty() {
            HealthCheck::pass(NAME)
        } else {
            HealthCheck::fail(NAME, failures.join("; "))
        }
    }

    fn check_tracing(&self) -> HealthCheck {
        const NAME: &str = "Trace export";
        match &self.config.tracing.arize_key {
            Some(_) => HealthCheck::pass_with(NAME, self.config.tracing.project_name.clone()),
            None => HealthCheck::warn(NAME, "ARIZE_PHNX not set, traces stay local"),
        }
    }

    fn check_disk_space(&self) -> HealthCheck {
        const NAME: &str = "Disk Space";
        let disks = Disks::new_with_refreshed_list();
        let cache_dir = self.config.download_cache_dir();

        let disk = disks
            .iter()
            .filter(|d| cache_dir.starts_with(d.mount_point()) || Path::new("/") == d.mount_point())
            .max_by_key(|d| d.mount_point().as_os_str().len());

        match disk {
            Some(disk) => {
                let available_gb = disk.available_space() / (1024 * 1024 * 1024);
                if available_gb < 1 {
                    HealthCheck::fail(NAME, format!("Less than 1GB available ({} GB)", available_gb))
                } else if available_gb < 5 {
                    HealthCheck::warn(NAME, format!("Low disk space ({} GB available)", available_gb))
                } else {
                    HealthCheck::pass_with(NAME, format!("{} GB available", available_gb))
                }
            }
            None => HealthCheck::warn(NAME, "Could not determine disk space"),
        }
    }

    /// Display diagnostics results
    pub fn display_results(checks: &[HealthCheck]) {
        println!("\n{}\n", "Lexi System Diagnostics".bold());
        println!("{:<22} Status", "Check");
        println!("{}", "=".repeat(60));

        for check in checks {
            let line = match &check.status {
                HealthStatus::Pass => match &check.detail {
                    Some(detail) => format!("PASS ({})", detail).green(),
                    None => "PASS".green(),
                },
                HealthStatus::Warn(msg) => format!("WARN: {}", msg).yellow(),
                HealthStatus::Fail(msg) => format!("FAIL: {}", msg).red(),
            };
            println!("{:<22} {}", check.name, line);
        }

        println!();
    }

    /// Get overall health status
    pub fn overall_status(checks: &[HealthCheck]) -> bool {
        !checks.iter().any(|c| matches!(c.status, HealthStatus::Fail(_)))
    }
}

fn check_binary(name: &str, binary: &str) -> HealthCheck {
    match find_on_path(binary) {
        Some(path) => HealthCheck::pass_with(name, path.display().to_string()),
        None => HealthCheck::warn(name, format!("{} not found on PATH", binary)),
    }
}

fn check_memory() -> HealthCheck {
    const NAME: &str = "Memory";
    let mut sys = System::new();
    sys.refresh_memory();

    let available_gb = sys.available_memory() / (1024 * 1024 * 1024);
    if available_gb < 1 {
        HealthCheck::fail(NAME, format!("Less than 1GB RAM available ({} GB)", available_gb))
    } else if available_gb < 2 {
        HealthCheck::warn(NAME, format!("Low memory ({} GB available)", available_gb))
    } else {
        HealthCheck::pass(NAME)
    }
}
