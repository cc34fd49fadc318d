//! Optional TOML config file and the resolved settings of a session.

use crate::channel::ChannelConfig;
use crate::model::StartForm;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";
pub const DEFAULT_CYCLES: &str = "10";
pub const DEFAULT_DELAY: &str = "30";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Contents of `config.toml`. Every field is optional.
///
/// ```toml
/// server = "http://10.0.0.5:5000"
/// connect_timeout = "15s"
///
/// [form]
/// website = "example.com"
/// cycles = 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub stop_grace: Option<Duration>,
    pub form: FormDefaults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormDefaults {
    pub keywords: Option<String>,
    pub website: Option<String>,
    pub cycles: Option<i64>,
    pub delay: Option<i64>,
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cycle-panel").join("config.toml"))
}

pub fn parse(text: &str) -> Result<FileConfig> {
    toml::from_str(text).context("invalid config file")
}

/// Load the config file. An explicit path must exist; the default path is
/// optional.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    let (path, required) = match explicit {
        Some(p) => (p.to_path_buf(), true),
        None => match default_path() {
            Some(p) => (p, false),
            None => return Ok(FileConfig::default()),
        },
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            tracing::debug!("loaded config from {}", path.display());
            parse(&text).with_context(|| format!("in {}", path.display()))
        }
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            Ok(FileConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("read config {}", path.display())),
    }
}

/// Everything a session needs, after CLI flags have been merged over the file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: Url,
    pub form: StartForm,
    pub connect_timeout: Duration,
    pub stop_grace: Duration,
}

impl Settings {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            server: self.server.clone(),
            connect_timeout: self.connect_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let cfg = parse(
            r#"
            server = "http://10.0.0.5:5000"
            connect_timeout = "15s"
            stop_grace = "1m"

            [form]
            keywords = "rust async"
            website = "example.com"
            cycles = 5
            delay = 1000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.as_deref(), Some("http://10.0.0.5:5000"));
        assert_eq!(cfg.connect_timeout, Some(Duration::from_secs(15)));
        assert_eq!(cfg.stop_grace, Some(Duration::from_secs(60)));
        assert_eq!(cfg.form.website.as_deref(), Some("example.com"));
        assert_eq!(cfg.form.cycles, Some(5));
        assert_eq!(cfg.form.delay, Some(1000));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(parse("").unwrap(), FileConfig::default());
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(parse("servr = \"x\"").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let missing = std::env::temp_dir().join("cycle-panel-does-not-exist.toml");
        assert!(load(Some(&missing)).is_err());
    }
}
