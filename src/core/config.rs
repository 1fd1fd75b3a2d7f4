/*!
 * Orchestrator Configuration
 *
 * Defaults come from `core::limits`. A JSON file named by `KIOSK_CONFIG` and a
 * handful of environment variables may override them.
 */

use super::errors::{ConfigError, ConfigResult};
use super::limits::*;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Runtime configuration for the orchestrator, the oracle and the termination engine
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct OrchestratorConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub launch_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub launch_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub web_hide_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub native_hide_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reappear_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub terminate_cooldown: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub kill_budget: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub debounce_window: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub check_budget: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub gate_wait: Duration,

    /// Media player executables; any running instance counts as alive
    pub media_player_paths: Vec<PathBuf>,
    /// Browser executables; the first one hosts web targets
    pub browser_paths: Vec<PathBuf>,
    /// Further process names watched for a visible window
    pub extra_monitored: Vec<String>,
    /// Extra arguments passed to the browser for web targets
    pub browser_args: Vec<String>,
    pub app_mode_marker: String,
    /// Treat every process as owning a visible window (headless or Wayland kiosks)
    pub assume_windows: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            launch_delay: DEFAULT_LAUNCH_DELAY,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            web_hide_delay: DEFAULT_WEB_HIDE_DELAY,
            native_hide_delay: DEFAULT_NATIVE_HIDE_DELAY,
            reappear_delay: DEFAULT_REAPPEAR_DELAY,
            terminate_cooldown: DEFAULT_TERMINATE_COOLDOWN,
            kill_budget: DEFAULT_KILL_BUDGET,
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            check_budget: DEFAULT_CHECK_BUDGET,
            gate_wait: DEFAULT_GATE_WAIT,
            media_player_paths: Vec::new(),
            browser_paths: Vec::new(),
            extra_monitored: Vec::new(),
            browser_args: vec!["--start-fullscreen".to_string()],
            app_mode_marker: DEFAULT_APP_MODE_MARKER.to_string(),
            assume_windows: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults, then the `KIOSK_CONFIG` file if set, then env overrides
    pub fn load() -> ConfigResult<Self> {
        let mut config = match std::env::var("KIOSK_CONFIG") {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        info!(path = %path.display(), "Loaded orchestrator config");
        Ok(config)
    }

    /// Apply `KIOSK_*` environment overrides
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        if let Some(d) = env_millis("KIOSK_WEB_HIDE_DELAY_MS")? {
            self.web_hide_delay = d;
        }
        if let Some(d) = env_millis("KIOSK_NATIVE_HIDE_DELAY_MS")? {
            self.native_hide_delay = d;
        }
        if let Some(d) = env_millis("KIOSK_POLL_INTERVAL_MS")? {
            self.poll_interval = d;
        }
        if let Ok(browser) = std::env::var("KIOSK_BROWSER") {
            debug!(browser = %browser, "Browser overridden from environment");
            self.browser_paths.insert(0, PathBuf::from(browser));
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "poll_interval".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.app_mode_marker.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "app_mode_marker".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Hide delay for the given kind of target
    pub fn hide_delay(&self, is_web: bool) -> Duration {
        if is_web {
            self.web_hide_delay
        } else {
            self.native_hide_delay
        }
    }

    /// Executable hosting web targets
    pub fn primary_browser(&self) -> Option<&Path> {
        self.browser_paths.first().map(PathBuf::as_path)
    }

    #[must_use]
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    #[must_use]
    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_hide_delays(mut self, web: Duration, native: Duration) -> Self {
        self.web_hide_delay = web;
        self.native_hide_delay = native;
        self
    }

    #[must_use]
    pub fn with_reappear_delay(mut self, delay: Duration) -> Self {
        self.reappear_delay = delay;
        self
    }

    #[must_use]
    pub fn with_terminate_cooldown(mut self, cooldown: Duration) -> Self {
        self.terminate_cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_kill_budget(mut self, budget: Duration) -> Self {
        self.kill_budget = budget;
        self
    }

    #[must_use]
    pub fn with_polling(mut self, interval: Duration, debounce: Duration) -> Self {
        self.poll_interval = interval;
        self.debounce_window = debounce;
        self
    }

    #[must_use]
    pub fn with_media_player(mut self, path: impl Into<PathBuf>) -> Self {
        self.media_player_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn with_browser(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser_paths.push(path.into());
        self
    }

    /// Watch an extra windowed process name for native targets
    #[must_use]
    pub fn with_monitored(mut self, name: impl Into<String>) -> Self {
        self.extra_monitored.push(name.into());
        self
    }

    #[must_use]
    pub fn with_assume_windows(mut self, assume: bool) -> Self {
        self.assume_windows = assume;
        self
    }
}

fn env_millis(key: &str) -> ConfigResult<Option<Duration>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Process name as it appears in the process table, from an executable path
pub fn process_name_of(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

/// Watched process names, split by how liveness is judged
///
/// Built once from configuration and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredProcessSet {
    media_players: BTreeSet<String>,
    browsers: BTreeSet<String>,
    others: BTreeSet<String>,
}

impl MonitoredProcessSet {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let media_players: BTreeSet<String> = config
            .media_player_paths
            .iter()
            .filter_map(|p| process_name_of(p))
            .collect();
        let browsers: BTreeSet<String> = config
            .browser_paths
            .iter()
            .filter_map(|p| process_name_of(p))
            .collect();
        let others = config
            .extra_monitored
            .iter()
            .filter(|name| !media_players.contains(*name) && !browsers.contains(*name))
            .cloned()
            .collect();

        Self {
            media_players,
            browsers,
            others,
        }
    }

    pub fn media_players(&self) -> impl Iterator<Item = &str> {
        self.media_players.iter().map(String::as_str)
    }

    pub fn browsers(&self) -> impl Iterator<Item = &str> {
        self.browsers.iter().map(String::as_str)
    }

    /// Every non-media name: browsers and extra names
    pub fn windowed(&self) -> impl Iterator<Item = &str> {
        self.browsers
            .iter()
            .chain(self.others.iter())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.media_players.contains(name)
            || self.browsers.contains(name)
            || self.others.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.media_players.is_empty() && self.browsers.is_empty() && self.others.is_empty()
    }
}
