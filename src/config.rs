//! Configuration loading
//!
//! Precedence, lowest first: built-in defaults, `config.toml`, environment
//! (`JARVIX_URL`, `JARVIX_TTS`, `JARVIX_DEBUG`), command line flags.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{JarvixError, Result};

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8000/ws";

/// Configuration for a Jarvix client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarvixConfig {
    /// WebSocket endpoint of the backend
    pub url: String,

    /// Whether finished turns are read aloud
    pub tts: bool,

    /// Debug logging
    pub debug: bool,

    /// Program + args used for speech output; empty means platform default
    pub speak_command: Vec<String>,

    /// Program + args used for speech recognition; empty disables voice input
    pub listen_command: Vec<String>,
}

impl Default for JarvixConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            tts: true,
            debug: false,
            speak_command: Vec::new(),
            listen_command: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    url: Option<String>,
    tts: Option<bool>,
    debug: Option<bool>,
    #[serde(default)]
    voice: VoiceToml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct VoiceToml {
    speak_command: Option<Vec<String>>,
    listen_command: Option<Vec<String>>,
}

/// `<config dir>/jarvix/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("jarvix").join("config.toml"))
}

/// Directory for the TUI log file.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("jarvix")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl JarvixConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_tts(mut self, tts: bool) -> Self {
        self.tts = tts;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Defaults, then `path` (or the default location) if it exists, then
    /// the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        if let Some(path) = path {
            if path.exists() {
                config = config.merge_file(&path)?;
            }
        }
        Ok(config.merge_env(|key| std::env::var(key).ok()))
    }

    /// Overlay values from a TOML file.
    pub fn merge_file(self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        self.merge_toml(&content)
            .map_err(|e| JarvixError::Config(format!("{}: {}", path.display(), e)))
    }

    fn merge_toml(mut self, content: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: ConfigToml = toml::from_str(content)?;
        if let Some(url) = file.url {
            self.url = url;
        }
        if let Some(tts) = file.tts {
            self.tts = tts;
        }
        if let Some(debug) = file.debug {
            self.debug = debug;
        }
        if let Some(cmd) = file.voice.speak_command {
            self.speak_command = cmd;
        }
        if let Some(cmd) = file.voice.listen_command {
            self.listen_command = cmd;
        }
        Ok(self)
    }

    /// Overlay environment variables, read through `lookup`.
    pub fn merge_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("JARVIX_URL").filter(|u| !u.trim().is_empty()) {
            self.url = url;
        }
        if let Some(tts) = lookup("JARVIX_TTS").as_deref().and_then(parse_bool) {
            self.tts = tts;
        }
        if let Some(debug) = lookup("JARVIX_DEBUG").as_deref().and_then(parse_bool) {
            self.debug = debug;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = JarvixConfig::new();
        assert_eq!(config.url, DEFAULT_URL);
        assert!(config.tts);
        assert!(config.listen_command.is_empty());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
url = "ws://example:9000/ws"
tts = false

[voice]
listen_command = ["whisper-listen", "--once"]
"#,
        )
        .unwrap();

        let config = JarvixConfig::new().merge_file(&path).unwrap();
        assert_eq!(config.url, "ws://example:9000/ws");
        assert!(!config.tts);
        assert_eq!(config.listen_command, vec!["whisper-listen", "--once"]);
        assert!(config.speak_command.is_empty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "url = [").unwrap();
        assert!(matches!(
            JarvixConfig::new().merge_file(&path),
            Err(JarvixError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let config = JarvixConfig::new()
            .with_url("ws://file/ws")
            .merge_env(|key| match key {
                "JARVIX_URL" => Some("ws://env/ws".to_string()),
                "JARVIX_TTS" => Some("no".to_string()),
                "JARVIX_DEBUG" => Some("garbage".to_string()),
                _ => None,
            });
        assert_eq!(config.url, "ws://env/ws");
        assert!(!config.tts);
        assert!(!config.debug);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = JarvixConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.listen_command, Vec::<String>::new());
    }
}
