//! Runtime configuration.
//!
//! Defaults cover a local single-user wiki. An optional YAML file named by
//! `ONEWIKI_CONFIG` replaces them, and a few environment variables override
//! the file.

use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_REALM: &str = "OneWiki Authorization";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub wiki: WikiConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Requests declaring a larger body are answered with 413.
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    pub data_dir: PathBuf,
    pub passwd_path: PathBuf,
    pub realm: String,
    /// Cache-Control value for static file responses; omitted when unset.
    pub static_cache_control: Option<String>,
    /// Extensions rendered as templates when reached through a guess.
    pub template_extensions: Vec<String>,
    /// Priority order for "any extension" guesses.
    pub fallback_extensions: Vec<String>,
    /// When false the redirect page only shows a link.
    pub auto_redirect: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Nonces older than this are answered with `stale=true`.
    pub nonce_lifetime_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            passwd_path: PathBuf::from(".passwd"),
            realm: DEFAULT_REALM.to_string(),
            static_cache_control: None,
            template_extensions: vec!["tmpl".to_string()],
            fallback_extensions: ["html", "htm", "tmpl", "md", "txt"]
                .into_iter()
                .map(String::from)
                .collect(),
            auto_redirect: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads the file named by `ONEWIKI_CONFIG` (if any), then applies
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("ONEWIKI_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                Self::from_yaml(&text).with_context(|| format!("parsing config file {path}"))?
            }
            Err(_) => Self::default(),
        };

        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Applies `LISTEN`, `ONEWIKI_DATA_DIR` and `ONEWIKI_PASSWD` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("LISTEN") {
            self.server.listen_addr = addr;
        }
        if let Some(dir) = lookup("ONEWIKI_DATA_DIR") {
            self.wiki.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("ONEWIKI_PASSWD") {
            self.wiki.passwd_path = PathBuf::from(path);
        }
    }
}
