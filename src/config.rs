//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXFETCH_CONFIG` (environment variable)
//! 2. `~/.config/mboxfetch/config.toml` (Linux/macOS)
//!    `%APPDATA%\mboxfetch\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override every value read here.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pop3::DEFAULT_PORT;
use crate::store::writer::DEFAULT_ENVELOPE_SENDER;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mail server connection.
    pub server: ServerConfig,
    /// Local archive settings.
    pub archive: ArchiveConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the directory for the log file.
    pub log_dir: Option<PathBuf>,
}

/// Mail server connection.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// POP3S host name.
    pub host: Option<String>,
    /// POP3S port.
    pub port: u16,
    /// Login name.
    pub username: Option<String>,
    /// Password. Prefer `MBOXFETCH_PASSWORD` over storing it here.
    pub password: Option<String>,
    /// Socket timeout in seconds for connect, read and write.
    pub timeout_secs: u64,
}

/// Local archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// MBOX file to append to.
    pub path: PathBuf,
    /// Sender written on every `From ` envelope line.
    pub envelope_sender: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            username: None,
            password: None,
            timeout_secs: 60,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./messages.mbox"),
            envelope_sender: DEFAULT_ENVELOPE_SENDER.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOXFETCH_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mboxfetch").join("config.toml"))
}

/// Return the directory for the log file.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxfetch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 995);
        assert_eq!(cfg.server.timeout_secs, 60);
        assert!(cfg.server.host.is_none());
        assert_eq!(cfg.archive.path, PathBuf::from("./messages.mbox"));
        assert_eq!(cfg.archive.envelope_sender, "MAILER-DAEMON");
        assert_eq!(cfg.general.log_level, "info");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[server]
host = "pop.example.com"
username = "me"

[archive]
path = "/var/mail/me.mbox"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.server.host.as_deref(), Some("pop.example.com"));
        assert_eq!(cfg.server.username.as_deref(), Some("me"));
        assert_eq!(cfg.archive.path, PathBuf::from("/var/mail/me.mbox"));
        // Other fields use defaults
        assert_eq!(cfg.server.port, 995);
        assert_eq!(cfg.archive.envelope_sender, "MAILER-DAEMON");
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut cfg = ServerConfig::default();
        cfg.password = Some("hunter2".to_string());
        let text = format!("{cfg:?}");
        assert!(!text.contains("hunter2"));
        assert!(text.contains("redacted"));
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let cfg = ServerConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.timeout(), Duration::from_secs(1));
    }
}
