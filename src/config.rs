use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Server settings, read from `COVERS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub lock_timeout: Duration,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7878,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            lock_timeout: Duration::from_millis(2000),
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparseable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        let defaults = Self::default();
        Self {
            bind: lookup("COVERS_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "COVERS_PORT").unwrap_or(defaults.port),
            data_dir: lookup("COVERS_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            max_connections: parsed(&lookup, "COVERS_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            lock_timeout: parsed(&lookup, "COVERS_LOCK_TIMEOUT_MS")
                .map_or(defaults.lock_timeout, Duration::from_millis),
            compact_threshold: parsed(&lookup, "COVERS_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parsed(&lookup, "COVERS_METRICS_PORT"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("covers.wal")
    }
}
