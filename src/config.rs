use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::foundation::error::{KinemaError, KinemaResult};
use crate::render::params::{AudioParams, PixelFormat};

/// Options controlling a [`crate::RenderBackend`].
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Root directory of the disk frame cache.
    pub cache_dir: PathBuf,
    /// Number of render workers. `None` uses one per available core.
    pub worker_count: Option<usize>,
    /// Cache name stamped at startup. Empty leaves frames uncacheable until one is set.
    pub cache_name: String,
    /// Pixel layout of cached frames.
    pub pixel_format: PixelFormat,
    /// Resolution divider applied to the viewer's size.
    pub divider: u32,
    /// Audio format of cached audio blocks. `None` caches no audio.
    pub audio: Option<AudioParams>,
    /// Weight of points behind the playhead relative to points ahead of it.
    pub behind_penalty: i64,
    /// How long `init` waits for every worker to report in, in milliseconds.
    pub startup_timeout_ms: u64,
    /// How long `close` waits for every worker to exit, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("kinema-cache"),
            worker_count: None,
            cache_name: String::new(),
            pixel_format: PixelFormat::Rgba8,
            divider: 1,
            audio: None,
            behind_penalty: 5,
            startup_timeout_ms: 10_000,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl BackendConfig {
    /// Parse a JSON config file.
    pub fn load(path: &Path) -> KinemaResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| KinemaError::io(e, path))?;
        let cfg: Self = serde_json::from_str(&text)
            .map_err(|e| KinemaError::config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the backend cannot work with.
    pub fn validate(&self) -> KinemaResult<()> {
        if self.worker_count == Some(0) {
            return Err(KinemaError::config("worker_count must be at least 1"));
        }
        if self.divider == 0 {
            return Err(KinemaError::config("divider must be at least 1"));
        }
        if self.audio.is_some_and(|a| a.sample_rate == 0) {
            return Err(KinemaError::config("audio sample_rate must be positive"));
        }
        if self.behind_penalty < 1 {
            return Err(KinemaError::config("behind_penalty must be at least 1"));
        }
        Ok(())
    }

    /// Worker count after resolving the per-core default.
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Startup deadline.
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Shutdown deadline.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
