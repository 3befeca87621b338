//! Engine configuration: defaults, JSON files and environment overrides

use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 300;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SCROLL_ATTEMPTS: usize = 5;
pub const DEFAULT_PROXIMITY_PX: f64 = 100.0;

/// Interval and deadline for the screen-state poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollOptions {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
        }
    }
}

impl PollOptions {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }
}

/// Scroll-search tuning. The safe band is `[top_margin, height - bottom_margin]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollOptions {
    pub max_attempts: usize,
    /// Keeps targets out from under the status / navigation bar
    pub top_margin: f64,
    /// Keeps targets out from under the home indicator / tab bar
    pub bottom_margin: f64,
    /// Fraction of viewport height covered by one scroll drag
    pub swipe_fraction: f64,
    pub swipe_duration_ms: u64,
    /// Pause after each scroll before re-resolving
    pub settle_ms: u64,
    pub proximity_threshold: f64,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_SCROLL_ATTEMPTS,
            top_margin: 80.0,
            bottom_margin: 50.0,
            swipe_fraction: 0.4,
            swipe_duration_ms: 500,
            settle_ms: 400,
            proximity_threshold: DEFAULT_PROXIMITY_PX,
        }
    }
}

impl ScrollOptions {
    pub fn swipe_duration(&self) -> Duration {
        Duration::from_millis(self.swipe_duration_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Gesture executor timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureOptions {
    /// Press duration for the synthesized tap
    pub tap_hold_ms: u64,
    pub long_press_ms: u64,
    pub drag_duration_ms: u64,
}

impl Default for GestureOptions {
    fn default() -> Self {
        Self {
            tap_hold_ms: 80,
            long_press_ms: 1_000,
            drag_duration_ms: 600,
        }
    }
}

impl GestureOptions {
    pub fn tap_hold(&self) -> Duration {
        Duration::from_millis(self.tap_hold_ms)
    }

    pub fn long_press(&self) -> Duration {
        Duration::from_millis(self.long_press_ms)
    }

    pub fn drag_duration(&self) -> Duration {
        Duration::from_millis(self.drag_duration_ms)
    }
}

/// Resolver options
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveOptions {
    /// Default maximum distance for proximity tie-breaks
    pub proximity_threshold: f64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            proximity_threshold: DEFAULT_PROXIMITY_PX,
        }
    }
}

/// Everything the engine can be tuned with, in one place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poll: PollOptions,
    pub scroll: ScrollOptions,
    pub gesture: GestureOptions,
    /// Re-resolutions the transition protocol allows after a stale handle
    pub stale_retries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll: PollOptions::default(),
            scroll: ScrollOptions::default(),
            gesture: GestureOptions::default(),
            stale_retries: 2,
        }
    }
}

impl EngineConfig {
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            proximity_threshold: self.scroll.proximity_threshold,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, AutomationError> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| AutomationError::Config(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AutomationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AutomationError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Defaults overridden by `SCREENWRIGHT_*` environment variables.
    pub fn from_env() -> Result<Self, AutomationError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment, in production).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AutomationError> {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, AutomationError> {
            raw.trim()
                .parse()
                .map_err(|_| AutomationError::Config(format!("{key}: cannot parse '{raw}'")))
        }

        if let Some(v) = lookup("SCREENWRIGHT_POLL_INTERVAL_MS") {
            self.poll.interval_ms = parse("SCREENWRIGHT_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("SCREENWRIGHT_TIMEOUT_MS") {
            self.poll.timeout_ms = parse("SCREENWRIGHT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SCREENWRIGHT_SCROLL_ATTEMPTS") {
            self.scroll.max_attempts = parse("SCREENWRIGHT_SCROLL_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("SCREENWRIGHT_PROXIMITY_PX") {
            self.scroll.proximity_threshold = parse("SCREENWRIGHT_PROXIMITY_PX", &v)?;
        }
        debug!(config = ?self, "engine config after overrides");
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.poll.interval_ms == 0 {
            return Err(AutomationError::Config(
                "poll.interval_ms must be greater than zero".to_string(),
            ));
        }
        if !(self.scroll.swipe_fraction > 0.0 && self.scroll.swipe_fraction < 1.0) {
            return Err(AutomationError::Config(format!(
                "scroll.swipe_fraction must be in (0, 1), got {}",
                self.scroll.swipe_fraction
            )));
        }
        if self.scroll.top_margin < 0.0 || self.scroll.bottom_margin < 0.0 {
            return Err(AutomationError::Config(
                "scroll margins must not be negative".to_string(),
            ));
        }
        if self.scroll.proximity_threshold <= 0.0 {
            return Err(AutomationError::Config(
                "scroll.proximity_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
