//! Engine configuration loaded from TOML.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub desktop: DesktopConfig,
    #[serde(default)]
    pub input: InputConfig,
    /// Known identities and their shared secrets.
    #[serde(default)]
    pub identities: Vec<IdentityConfig>,
}

impl Config {
    /// Parse a TOML document and validate it.
    pub fn from_toml(content: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints the serde defaults cannot express.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.engine.sweep_interval_secs == 0 {
            return Err(EngineError::Config(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.session.idle_timeout_secs == 0 {
            return Err(EngineError::Config(
                "idle_timeout_secs must be positive".to_string(),
            ));
        }
        if self.session.idle_after_secs >= self.session.idle_timeout_secs {
            return Err(EngineError::Config(
                "idle_after_secs must be below idle_timeout_secs".to_string(),
            ));
        }
        if self.session.max_sessions == 0 {
            return Err(EngineError::Config(
                "max_sessions must be positive".to_string(),
            ));
        }
        if self.desktop.max_clipboard_bytes == 0 {
            return Err(EngineError::Config(
                "max_clipboard_bytes must be positive".to_string(),
            ));
        }
        let resolution =
            deskgate_types::ScreenResolution::new(self.desktop.width, self.desktop.height);
        if !resolution.is_valid() {
            return Err(EngineError::Config(format!(
                "initial resolution {resolution} is out of bounds"
            )));
        }
        Ok(())
    }
}

/// Engine runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between idle-sweep runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            log_level: default_log_level(),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds of inactivity before a session is marked Idle (soft).
    #[serde(default = "default_idle_after")]
    pub idle_after_secs: u64,
    /// Seconds of inactivity before a session is terminated.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Seconds a Terminated session is retained for audit before GC.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    /// Maximum number of live sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_after_secs: default_idle_after(),
            idle_timeout_secs: default_idle_timeout(),
            retention_secs: default_retention(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Desktop state settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopConfig {
    #[serde(default = "default_desktop_name")]
    pub name: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_max_clipboard")]
    pub max_clipboard_bytes: usize,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            name: default_desktop_name(),
            width: default_width(),
            height: default_height(),
            max_clipboard_bytes: default_max_clipboard(),
        }
    }
}

/// Input command policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Key names rejected in any combo, compared case-insensitively.
    #[serde(default = "default_blocked_keys")]
    pub blocked_keys: Vec<String>,
    /// Maximum keys in a single combo.
    #[serde(default = "default_max_combo_keys")]
    pub max_combo_keys: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            blocked_keys: default_blocked_keys(),
            max_combo_keys: default_max_combo_keys(),
        }
    }
}

/// One identity allowed to authenticate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub name: String,
    pub secret: String,
}

fn default_sweep_interval() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_idle_after() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    30
}

fn default_retention() -> u64 {
    300
}

fn default_max_sessions() -> usize {
    10
}

fn default_desktop_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "deskgate".to_string())
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_max_clipboard() -> usize {
    1024 * 1024 // 1 MiB of clipboard text
}

fn default_blocked_keys() -> Vec<String> {
    vec!["End".to_string()]
}

fn default_max_combo_keys() -> usize {
    5
}
