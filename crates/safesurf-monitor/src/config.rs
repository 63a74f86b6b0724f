use anyhow::{Context, Result};
use safesurf_backend::RetryPolicy;
use safesurf_core::RiskLevel;
use safesurf_overlay::OverlayTimings;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const CONFIG_FILE: &str = "safesurf.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub backend: BackendConfig,
    pub classifier: ClassifierConfig,
    pub monitor: MonitorConfig,
    pub overlay: OverlayConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct BackendConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_owned(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ClassifierConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Level assumed when the backend stays unreachable.
    pub fallback_risk: RiskLevel,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            retry_delay_ms: duration_ms(policy.retry_delay),
            fallback_risk: policy.fallback_risk,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct MonitorConfig {
    pub id: String,
    pub cooldown_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            id: "default".to_owned(),
            cooldown_ms: 2_000,
            socket: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct OverlayConfig {
    pub entrance_ms: u64,
    pub display_ms: u64,
    pub exit_ms: u64,
    pub result_ms: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        let timings = OverlayTimings::default();
        Self {
            entrance_ms: duration_ms(timings.entrance),
            display_ms: duration_ms(timings.display),
            exit_ms: duration_ms(timings.exit),
            result_ms: duration_ms(timings.result),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct NotificationsConfig {
    pub enabled: bool,
    /// Program and leading arguments; title and message are appended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl Config {
    /// Load config from a TOML file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file means defaults.
    pub(crate) fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Resolve config path: check arg, then default locations.
    pub(crate) fn find_config_path(explicit: Option<&str>) -> PathBuf {
        if let Some(p) = explicit {
            return PathBuf::from(p);
        }

        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return local;
        }

        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            let xdg = PathBuf::from(config_dir).join("safesurf").join(CONFIG_FILE);
            if xdg.exists() {
                return xdg;
            }
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config/safesurf")
                .join(CONFIG_FILE);
            if home_config.exists() {
                return home_config;
            }
        }

        local
    }

    pub(crate) fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.classifier.max_retries,
            retry_delay: Duration::from_millis(self.classifier.retry_delay_ms),
            fallback_risk: self.classifier.fallback_risk,
        }
    }

    pub(crate) fn cooldown(&self) -> Duration {
        Duration::from_millis(self.monitor.cooldown_ms)
    }

    pub(crate) fn overlay_timings(&self) -> OverlayTimings {
        OverlayTimings {
            entrance: Duration::from_millis(self.overlay.entrance_ms),
            display: Duration::from_millis(self.overlay.display_ms),
            exit: Duration::from_millis(self.overlay.exit_ms),
            result: Duration::from_millis(self.overlay.result_ms),
        }
    }

    pub(crate) fn socket_path(&self) -> PathBuf {
        self.monitor
            .socket_path_in(std::env::var_os("XDG_RUNTIME_DIR").as_deref())
    }
}

impl MonitorConfig {
    /// The explicit `socket`, else `<runtime_dir>/safesurf/<id>.sock`, else
    /// `/tmp/safesurf-<id>.sock`.
    fn socket_path_in(&self, runtime_dir: Option<&OsStr>) -> PathBuf {
        if let Some(socket) = &self.socket {
            return PathBuf::from(socket);
        }

        // Monitor ids end up in file names.
        let stem: String = self
            .id
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
                _ => '-',
            })
            .collect();

        match runtime_dir.filter(|dir| !dir.is_empty()) {
            Some(dir) => Path::new(dir).join("safesurf").join(format!("{stem}.sock")),
            None => PathBuf::from(format!("/tmp/safesurf-{stem}.sock")),
        }
    }
}
