//! Configuration loader: a manual `key = value` line parser, grounded on
//! `original_source/src/config/config.c`'s `zeus_config_load`/
//! `zeus_config_init_default`/`get_key_id`. The format is flat and not
//! self-describing, so a deserialization framework buys nothing over a
//! direct parser — the teacher repo never reaches for `serde` either.

use std::fmt::Display;
use std::fs;
use std::path::Path;

/// Server configuration, defaults matching
/// `original_source/include/config/config.h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_host: String,
    pub bind_port: u16,
    pub num_workers: usize,
    pub tls_cert_path: String,
    pub tls_key_path: String,
    pub log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 8443,
            num_workers: 4,
            tls_cert_path: "certs/server.crt".to_string(),
            tls_key_path: "certs/server.key".to_string(),
            log_file: "stderr".to_string(),
        }
    }
}

/// `ConfigFatal` per `spec.md` §7: a malformed numeric value for a
/// recognized key. A missing file is not an error — it falls back to
/// defaults, matching `zeus_config_load`'s behavior when `fopen` fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidPort(String),
    InvalidWorkerCount(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort(v) => write!(f, "invalid bind_port value '{v}'"),
            ConfigError::InvalidWorkerCount(v) => write!(f, "invalid num_workers value '{v}'"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Loads configuration from `path`, falling back to defaults for any
    /// directive the file doesn't set. A missing or unreadable file is
    /// logged and treated as "no overrides", not a fatal error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!(
                    "config: failed to read '{}' ({e}), using defaults",
                    path.display()
                );
                return Ok(config);
            }
        };

        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim_start();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                continue;
            }

            match key {
                "bind_host" => config.bind_host = value.to_string(),
                "bind_port" => {
                    config.bind_port = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidPort(value.to_string()))?
                }
                "num_workers" => {
                    config.num_workers = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidWorkerCount(value.to_string()))?
                }
                "tls_cert_path" => config.tls_cert_path = value.to_string(),
                "tls_key_path" => config.tls_key_path = value.to_string(),
                "log_file" => config.log_file = value.to_string(),
                other => log::warn!("config: unknown key '{other}' at line {}, ignoring", line_num + 1),
            }
        }

        log::info!("config: loaded settings from '{}'", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_documented_table() {
        let config = Config::default();
        assert_eq!("127.0.0.1", config.bind_host);
        assert_eq!(8443, config.bind_port);
        assert_eq!(4, config.num_workers);
        assert_eq!("certs/server.crt", config.tls_cert_path);
        assert_eq!("certs/server.key", config.tls_key_path);
        assert_eq!("stderr", config.log_file);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/rask.conf")).unwrap();
        assert_eq!(Config::default(), config);
    }

    #[test]
    fn recognized_keys_override_defaults_and_others_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# comment\n[section]\nbind_host = 0.0.0.0\nbind_port = 9443\nnum_workers = 8\nmystery_key = nope\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!("0.0.0.0", config.bind_host);
        assert_eq!(9443, config.bind_port);
        assert_eq!(8, config.num_workers);
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port = not-a-number").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
