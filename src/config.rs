use crate::foundation::core::Fps;
use crate::foundation::error::{HeadcastError, HeadcastResult};
use crate::stream::dispatch::Backpressure;
use crate::stream::filler::NodOpts;
use crate::stream::producer::ProducerOpts;
use anyhow::Context;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Streaming pipeline configuration.
///
/// Every field has a default, so `{}` is a valid configuration file.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Frame production options.
    pub producer: ProducerOpts,
    /// Output frame rate.
    pub fps: Fps,
    /// Idle nodding motion.
    pub nod: NodOpts,
    /// Milliseconds between idle filler frames.
    pub idle_interval_ms: u64,
    /// Per-observer queue policy.
    pub dispatch: Backpressure,
    /// Overwrite an existing output artifact.
    pub overwrite: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            producer: ProducerOpts::default(),
            fps: Fps::default(),
            nod: NodOpts::default(),
            idle_interval_ms: 100,
            dispatch: Backpressure::default(),
            overwrite: true,
        }
    }
}

impl StreamConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_reader<R: std::io::Read>(r: R) -> HeadcastResult<Self> {
        let cfg: Self = serde_json::from_reader(r)
            .map_err(|e| HeadcastError::config(format!("parse config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> HeadcastResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        Self::from_reader(BufReader::new(f))
    }

    /// Check value ranges.
    pub fn validate(&self) -> HeadcastResult<()> {
        if self.producer.preview_size == Some(0) {
            return Err(HeadcastError::config("producer.preview_size must be > 0"));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        self.nod.validate()?;
        if self.idle_interval_ms == 0 {
            return Err(HeadcastError::config("idle_interval_ms must be > 0"));
        }
        if let Backpressure::DropNewest { capacity: 0 } = self.dispatch {
            return Err(HeadcastError::config("dispatch capacity must be > 0"));
        }
        Ok(())
    }

    /// Idle tick as a [`Duration`].
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
