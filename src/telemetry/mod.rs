//! Telemetry for Lexi
//!
//! Tracing subscriber setup plus in-process counters for cache, routing and
//! tool activity, reported by `/status` and `lexi doctor`.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Maximum events retained for `recent_events`
const MAX_EVENTS: usize = 1000;

/// Initialise the global tracing subscriber.
///
/// `verbosity` counts `-v` flags; `quiet` wins over it. `RUST_LOG` overrides both.
pub fn init_tracing(verbosity: u8, quiet: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else {
        match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    CacheHit {
        namespace: String,
        timestamp: Instant,
    },
    CacheMiss {
        namespace: String,
        timestamp: Instant,
    },
    CacheEviction {
        evicted: usize,
        timestamp: Instant,
    },
    RouteSelected {
        route: String,
        timestamp: Instant,
    },
    ToolStarted {
        tool: String,
        timestamp: Instant,
    },
    ToolCompleted {
        tool: String,
        duration_ms: u64,
        success: bool,
        timestamp: Instant,
    },
    RetryAttempt {
        operation: String,
        attempt: u32,
        timestamp: Instant,
    },
    QueryCompleted {
        duration_ms: u64,
        success: bool,
        timestamp: Instant,
    },
}

/// Serializable view of one event, newest last in `/status`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventRecord {
    pub kind: &'static str,
    pub subject: String,
    pub age_ms: u64,
}

impl TelemetryEvent {
    pub fn to_record(&self) -> EventRecord {
        let (kind, subject, timestamp) = match self {
            TelemetryEvent::CacheHit { namespace, timestamp } => ("cache_hit", namespace.clone(), timestamp),
            TelemetryEvent::CacheMiss { namespace, timestamp } => ("cache_miss", namespace.clone(), timestamp),
            TelemetryEvent::CacheEviction { evicted, timestamp } => ("cache_eviction", evicted.to_string(), timestamp),
            TelemetryEvent::RouteSelected { route, timestamp } => ("route", route.clone(), timestamp),
            TelemetryEvent::ToolStarted { tool, timestamp } => ("tool_started", tool.clone(), timestamp),
            TelemetryEvent::ToolCompleted { tool, success, timestamp, .. } => {
                (if *success { "tool_ok" } else { "tool_failed" }, tool.clone(), timestamp)
            }
            TelemetryEvent::RetryAttempt { operation, attempt, timestamp } => {
                ("retry", format!("{} #{}", operation, attempt), timestamp)
            }
            TelemetryEvent::QueryCompleted { duration_ms, success, timestamp } => (
                if *success { "query_ok" } else { "query_failed" },
                format!("{}ms", duration_ms),
                timestamp,
            ),
        };
        EventRecord {
            kind,
            subject,
            age_ms: timestamp.elapsed().as_millis() as u64,
        }
    }
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetryStats {
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_evictions: usize,
    pub routes_law: usize,
    pub routes_procedure: usize,
    pub routes_general: usize,
    pub routes_finish: usize,
    pub tools_executed: usize,
    pub tools_succeeded: usize,
    pub tools_failed: usize,
    pub retry_attempts: usize,
    pub queries_completed: usize,
    pub queries_failed: usize,
}

/// Telemetry collector, cheap to clone and share between handlers
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                TelemetryEvent::CacheHit { .. } => stats.cache_hits += 1,
                TelemetryEvent::CacheMiss { .. } => stats.cache_misses += 1,
                TelemetryEvent::CacheEviction { evicted, .. } => {
                    stats.cache_evictions += evicted;
                }
                TelemetryEvent::RouteSelected { route, .. } => match route.as_str() {
                    "law" => stats.routes_law += 1,
                    "procedure" => stats.routes_procedure += 1,
                    "finish" => stats.routes_finish += 1,
                    _ => stats.routes_general += 1,
                },
                TelemetryEvent::ToolStarted { .. } => stats.tools_executed += 1,
                TelemetryEvent::ToolCompleted { success, .. } => {
                    if *success {
                        stats.tools_succeeded += 1;
                    } else {
                        stats.tools_failed += 1;
                    }
                }
                TelemetryEvent::RetryAttempt { .. } => stats.retry_attempts += 1,
                TelemetryEvent::QueryCompleted { success, .. } => {
                    if *success {
                        stats.queries_completed += 1;
                    } else {
                        stats.queries_failed += 1;
                    }
                }
            }
        }

        let mut events = lock(&self.events);
        if events.len() >= MAX_EVENTS {
            events.remove(0);
        }
        events.push(event);
    }

    pub fn cache_hit(&self, namespace: &str) {
        self.record(TelemetryEvent::CacheHit {
            namespace: namespace.to_string(),
            timestamp: Instant::now(),
        });
    }

    pub fn cache_miss(&self, namespace: &str) {
        self.record(TelemetryEvent::CacheMiss {
            namespace: namespace.to_string(),
            timestamp: Instant::now(),
        });
    }

    pub fn route_selected(&self, route: &str) {
        self.record(TelemetryEvent::RouteSelected {
            route: route.to_string(),
            timestamp: Instant::now(),
        });
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        lock(&self.stats).clone()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    /// Fraction of cache lookups that hit
    pub fn cache_hit_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        let total = stats.cache_hits + stats.cache_misses;
        if total == 0 {
            0.0
        } else {
            stats.cache_hits as f64 / total as f64
        }
    }

    /// Calculate tool success rate
    pub fn tool_success_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        let total = stats.tools_succeeded + stats.tools_failed;
        if total == 0 {
            1.0
        } else {
            stats.tools_succeeded as f64 / total as f64
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
