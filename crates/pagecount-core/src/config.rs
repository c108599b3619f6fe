use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    pub https: bool,
    pub pv_window_secs: u64,
    pub uv_window_secs: u64,
    pub count_timeout_ms: u64,
    pub cache_backend: CacheBackend,
    pub cache_sweep_secs: u64,
    /// Posts inserted at startup if missing, from `PAGECOUNT_SEED_POSTS`.
    pub seed_posts: Vec<(i64, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheBackend {
    /// Process-local map; suitable for a single server instance.
    Memory,
    /// Holds the connection URL read from `PAGECOUNT_REDIS_URL`.
    Redis(String),
}

/// The subset of [`Config`] that drives visit counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountingConfig {
    pub pv_window: Duration,
    pub uv_window: Duration,
    pub call_timeout: Duration,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            pv_window: Duration::from_secs(60),
            uv_window: Duration::from_secs(24 * 60 * 60),
            call_timeout: Duration::from_millis(250),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("PAGECOUNT_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("PAGECOUNT_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("PAGECOUNT_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            https: std::env::var("PAGECOUNT_HTTPS")
                .map(|v| v == "true")
                .unwrap_or(false),
            pv_window_secs: env_u64("PAGECOUNT_PV_WINDOW_SECS", 60),
            uv_window_secs: env_u64("PAGECOUNT_UV_WINDOW_SECS", 86_400),
            count_timeout_ms: env_u64("PAGECOUNT_COUNT_TIMEOUT_MS", 250),
            cache_backend: {
                let raw =
                    std::env::var("PAGECOUNT_CACHE").unwrap_or_else(|_| "memory".to_string());
                match raw.as_str() {
                    "redis" => {
                        let url = std::env::var("PAGECOUNT_REDIS_URL").map_err(|_| {
                            "PAGECOUNT_REDIS_URL required when CACHE=redis".to_string()
                        })?;
                        CacheBackend::Redis(url)
                    }
                    _ => CacheBackend::Memory,
                }
            },
            cache_sweep_secs: env_u64("PAGECOUNT_CACHE_SWEEP_SECS", 60),
            seed_posts: match std::env::var("PAGECOUNT_SEED_POSTS") {
                Ok(raw) => parse_seed_posts(&raw)?,
                Err(_) => Vec::new(),
            },
        })
    }

    pub fn pv_window(&self) -> Duration {
        Duration::from_secs(self.pv_window_secs)
    }

    pub fn uv_window(&self) -> Duration {
        Duration::from_secs(self.uv_window_secs)
    }

    pub fn count_timeout(&self) -> Duration {
        Duration::from_millis(self.count_timeout_ms)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        // tokio::time::interval panics on a zero period.
        Duration::from_secs(self.cache_sweep_secs.max(1))
    }

    pub fn counting(&self) -> CountingConfig {
        CountingConfig {
            pv_window: self.pv_window(),
            uv_window: self.uv_window(),
            call_timeout: self.count_timeout(),
        }
    }
}

/// Parse `PAGECOUNT_SEED_POSTS`: `id=title` pairs separated by `;`, e.g.
/// `1=Hello world;2=Second post`. Blank entries are skipped.
pub fn parse_seed_posts(raw: &str) -> Result<Vec<(i64, String)>, String> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, title) = entry
                .split_once('=')
                .ok_or_else(|| format!("invalid seed post {entry:?}: expected id=title"))?;
            let id: i64 = id
                .trim()
                .parse()
                .map_err(|e| format!("invalid seed post id {id:?}: {e}"))?;
            let title = title.trim();
            if title.is_empty() {
                return Err(format!("seed post {id} has an empty title"));
            }
            Ok((id, title.to_string()))
        })
        .collect()
}

/// Tuning knobs fall back to their default on a malformed value.
fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
