use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use phonepilot_protocol::DisplayMode;
use serde::Deserialize;
use tracing::debug;

use crate::coalescer::DEFAULT_FLUSH_WINDOW;
use crate::error::PilotErr;
use crate::error::Result;
use crate::poller::DEFAULT_POLL_INTERVAL;

pub const CONFIG_DIR_ENV_VAR: &str = "PHONEPILOT_HOME";
pub const BACKEND_URL_ENV_VAR: &str = "PHONEPILOT_BACKEND_URL";

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Runtime settings for the console.
///
/// Resolution order: built-in defaults, then `config.toml` from the
/// phonepilot home directory, then environment overrides. All of it is
/// explicit state handed to the components at construction; nothing reads
/// these ambiently.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend_url: String,
    /// Separate video endpoint; `None` means the platform has no decoder and
    /// the display arbitration falls back to screenshots.
    pub video_stream_url: Option<String>,
    pub display_mode: DisplayMode,
    pub stream_idle_timeout: Duration,
    pub screenshot_poll_interval: Duration,
    pub thinking_flush_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            video_stream_url: None,
            display_mode: DisplayMode::Auto,
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
            screenshot_poll_interval: DEFAULT_POLL_INTERVAL,
            thinking_flush_window: DEFAULT_FLUSH_WINDOW,
        }
    }
}

/// On-disk shape of `config.toml`; every field optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigToml {
    backend_url: Option<String>,
    video_stream_url: Option<String>,
    display_mode: Option<DisplayMode>,
    stream_idle_timeout_ms: Option<u64>,
    screenshot_poll_interval_ms: Option<u64>,
    thinking_flush_window_ms: Option<u64>,
}

impl Config {
    /// Loads from the default home directory, tolerating a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_home().join("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let parsed: ConfigToml = toml::from_str(&raw)
                    .map_err(|err| PilotErr::Config(format!("{}: {err}", path.display())))?;
                config.merge(parsed);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config file at {}; using defaults", path.display());
            }
            Err(err) => return Err(err.into()),
        }
        config.apply_env_overrides();
        Ok(config)
    }

    fn merge(&mut self, file: ConfigToml) {
        if let Some(url) = file.backend_url {
            self.backend_url = url;
        }
        if file.video_stream_url.is_some() {
            self.video_stream_url = file.video_stream_url;
        }
        if let Some(mode) = file.display_mode {
            self.display_mode = mode;
        }
        if let Some(ms) = file.stream_idle_timeout_ms {
            self.stream_idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.screenshot_poll_interval_ms {
            self.screenshot_poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.thinking_flush_window_ms {
            self.thinking_flush_window = Duration::from_millis(ms);
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV_VAR)
            && !url.is_empty()
        {
            self.backend_url = url;
        }
    }
}

fn config_home() -> PathBuf {
    if let Ok(home) = std::env::var(CONFIG_DIR_ENV_VAR)
        && !home.is_empty()
    {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|home| home.join(".phonepilot"))
        .unwrap_or_else(|| PathBuf::from(".phonepilot"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.display_mode, DisplayMode::Auto);
        assert_eq!(config.screenshot_poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
backend_url = "http://10.1.2.3:9000"
video_stream_url = "https://10.1.2.3:9443/stream"
display_mode = "screenshot"
screenshot_poll_interval_ms = 750
"#,
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.backend_url, "http://10.1.2.3:9000");
        assert_eq!(
            config.video_stream_url.as_deref(),
            Some("https://10.1.2.3:9443/stream")
        );
        assert_eq!(config.display_mode, DisplayMode::Screenshot);
        assert_eq!(config.screenshot_poll_interval, Duration::from_millis(750));
        // Untouched settings keep their defaults.
        assert_eq!(config.thinking_flush_window, DEFAULT_FLUSH_WINDOW);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend_url = [not toml").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, PilotErr::Config(_)));
    }
}
