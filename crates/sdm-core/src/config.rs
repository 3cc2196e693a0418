use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per segment (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// Network timeouts applied to the probe and to every range fetch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connect timeout in seconds.
    pub connect_secs: u64,
    /// A fetch whose throughput stays below this many bytes/sec...
    pub low_speed_bytes: u32,
    /// ...for this many seconds is aborted as a timeout (and retried).
    pub low_speed_secs: u64,
    /// Hard limit for the metadata probe.
    pub probe_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            low_speed_bytes: 1024,
            low_speed_secs: 60,
            probe_secs: 30,
        }
    }
}

/// Global configuration loaded from `~/.config/sdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdmConfig {
    /// Segment count used when a request carries no hint.
    pub default_segments: usize,
    /// Upper bound for any requested segment count.
    pub max_segments: usize,
    /// Maximum range fetchers running at once for one download.
    pub max_concurrent_fetches: usize,
    /// Size of one streamed chunk; also the cancellation granularity.
    pub chunk_size_bytes: usize,
    /// Time-based checkpoint cadence. `Done` transitions always checkpoint.
    pub checkpoint_interval_ms: u64,
    /// Aggregate bandwidth ceiling in bytes per second (None = unlimited).
    #[serde(default)]
    pub max_bytes_per_sec: Option<u64>,
    /// Smallest segment the planner may produce (None = no minimum).
    #[serde(default)]
    pub min_segment_bytes: Option<u64>,
    /// Leave `<output>.part` on disk when a download is canceled.
    #[serde(default)]
    pub keep_partial_on_cancel: bool,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional timeouts; if missing, built-in defaults are used.
    #[serde(default)]
    pub timeouts: Option<TimeoutConfig>,
}

impl Default for SdmConfig {
    fn default() -> Self {
        Self {
            default_segments: 4,
            max_segments: 16,
            max_concurrent_fetches: 8,
            chunk_size_bytes: 64 * 1024,
            checkpoint_interval_ms: 2000,
            max_bytes_per_sec: None,
            min_segment_bytes: None,
            keep_partial_on_cancel: false,
            retry: None,
            timeouts: None,
        }
    }
}

impl SdmConfig {
    /// Retry policy from the `[retry]` section, or the built-in default.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(|r| {
                let max_delay = Duration::from_secs(r.max_delay_secs);
                // Out-of-range values (inf, 1e30) fall back to the cap.
                let base_delay = Duration::try_from_secs_f64(r.base_delay_secs.max(0.0))
                    .unwrap_or(max_delay)
                    .min(max_delay);
                RetryPolicy {
                    max_attempts: r.max_attempts.max(1),
                    base_delay,
                    max_delay,
                }
            })
            .unwrap_or_default()
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        self.timeouts.unwrap_or_default()
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms.max(1))
    }

    /// Effective segment count for a request hint, before planner clamping.
    pub fn segment_count_for(&self, requested: Option<usize>, total_size: Option<u64>) -> usize {
        let mut n = requested
            .unwrap_or(self.default_segments)
            .min(self.max_segments.max(1))
            .max(1);
        if let (Some(min), Some(size)) = (self.min_segment_bytes, total_size) {
            if min > 0 {
                let by_min = (size / min).max(1);
                n = n.min(usize::try_from(by_min).unwrap_or(usize::MAX));
            }
        }
        n
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("sdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: SdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}
