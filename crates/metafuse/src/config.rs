//! Configuration handling for metafuse.
//!
//! Settings come from a TOML file (explicit `--config` path, or the XDG
//! config directory) with `METAFUSE_*` environment variables taking
//! precedence over both. Every value has a default, so the service starts
//! with no file at all.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use metafuse_state::StateServiceConfig;
use metafuse_vfs::VfsConfig;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// File resolution and projection attributes
    #[serde(default)]
    pub files: FilesConfig,

    /// Store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP API binding
    #[serde(default)]
    pub api: ApiConfig,

    /// Event consumption tuning
    #[serde(default)]
    pub events: EventsConfig,
}

/// File-resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Root the upstream files live under
    #[serde(default = "default_files_root")]
    pub files_root: String,

    /// Mount point served by the companion kernel driver (informational)
    #[serde(default)]
    pub meta_core_path: Option<String>,

    /// External share base URL; enables webdavUrl in read responses
    #[serde(default)]
    pub webdav_base_url: Option<String>,

    /// Permission bits for file nodes, octal
    #[serde(default = "default_file_mode")]
    pub file_mode: String,

    /// Permission bits for directory nodes, octal
    #[serde(default = "default_dir_mode")]
    pub dir_mode: String,

    #[serde(default)]
    pub uid: u32,

    #[serde(default)]
    pub gid: u32,
}

fn default_files_root() -> String {
    "/files".to_string()
}

fn default_file_mode() -> String {
    "0644".to_string()
}

fn default_dir_mode() -> String {
    "0755".to_string()
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            files_root: default_files_root(),
            meta_core_path: None,
            webdav_base_url: None,
            file_mode: default_file_mode(),
            dir_mode: default_dir_mode(),
            uid: 0,
            gid: 0,
        }
    }
}

/// Store connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Prefix the writer puts in front of every key
    #[serde(default)]
    pub store_prefix: String,
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_url: default_store_url(),
            store_prefix: String::new(),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub api_host: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds during which requests get 503 until bootstrap completes;
    /// zero serves immediately
    #[serde(default)]
    pub startup_grace_secs: u64,
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            api_port: default_api_port(),
            startup_grace_secs: 0,
        }
    }
}

/// Event-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Stream key holding the change log
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Entries per bootstrap read
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Block timeout for live-tail reads, seconds
    #[serde(default = "default_tail_timeout_secs")]
    pub tail_timeout_secs: u64,
}

fn default_stream() -> String {
    "meta:events".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_tail_timeout_secs() -> u64 {
    5
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            stream: default_stream(),
            batch_size: default_batch_size(),
            tail_timeout_secs: default_tail_timeout_secs(),
        }
    }
}

impl Config {
    /// Load from the given path, or the default location, falling back to
    /// defaults when no file exists. Environment overrides apply last.
    pub fn load(path: Option<PathBuf>) -> Result<Config, metafuse_core::Error> {
        let path = path.or_else(Self::config_path);
        let mut config = match path {
            Some(ref p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)
                    .map_err(|e| metafuse_core::Error::Config(format!("{}: {e}", p.display())))?
            }
            _ => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("METAFUSE_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.toml"));
        }
        ProjectDirs::from("", "", "metafuse").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Directory holding the rule config and its backups.
    pub fn rules_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("METAFUSE_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        ProjectDirs::from("", "", "metafuse")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("METAFUSE_FILES_ROOT") {
            self.files.files_root = v;
        }
        if let Ok(v) = std::env::var("METAFUSE_META_CORE_PATH") {
            self.files.meta_core_path = Some(v);
        }
        if let Ok(v) = std::env::var("METAFUSE_WEBDAV_BASE_URL") {
            self.files.webdav_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("METAFUSE_FILE_MODE") {
            self.files.file_mode = v;
        }
        if let Ok(v) = std::env::var("METAFUSE_DIR_MODE") {
            self.files.dir_mode = v;
        }
        if let Ok(v) = std::env::var("METAFUSE_UID") {
            if let Ok(uid) = v.parse() {
                self.files.uid = uid;
            }
        }
        if let Ok(v) = std::env::var("METAFUSE_GID") {
            if let Ok(gid) = v.parse() {
                self.files.gid = gid;
            }
        }
        if let Ok(v) = std::env::var("METAFUSE_STORE_URL") {
            self.store.store_url = v;
        }
        if let Ok(v) = std::env::var("METAFUSE_STORE_PREFIX") {
            self.store.store_prefix = v;
        }
        if let Ok(v) = std::env::var("METAFUSE_API_HOST") {
            self.api.api_host = v;
        }
        if let Ok(v) = std::env::var("METAFUSE_API_PORT") {
            if let Ok(port) = v.parse() {
                self.api.api_port = port;
            }
        }
    }

    /// Projection parameters derived from this config.
    pub fn vfs_config(&self) -> VfsConfig {
        VfsConfig {
            files_root: self.files.files_root.clone(),
            webdav_base: self.files.webdav_base_url.clone(),
            file_mode: parse_octal(&self.files.file_mode, 0o644),
            dir_mode: parse_octal(&self.files.dir_mode, 0o755),
            uid: self.files.uid,
            gid: self.files.gid,
        }
    }

    /// Event-loop parameters derived from this config.
    pub fn state_config(&self) -> StateServiceConfig {
        StateServiceConfig {
            stream: self.events.stream.clone(),
            batch_size: self.events.batch_size,
            tail_timeout: Duration::from_secs(self.events.tail_timeout_secs),
            ..StateServiceConfig::default()
        }
    }

    /// Sample file for `metafuse config init`.
    pub fn sample_toml() -> String {
        let header = "# metafuse configuration\n\
                      # Values may also be set via METAFUSE_* environment variables.\n\n";
        let body = toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# failed to render defaults\n"));
        format!("{header}{body}")
    }
}

fn parse_octal(value: &str, fallback: u32) -> u32 {
    u32::from_str_radix(value.trim_start_matches("0o"), 8).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.files.files_root, "/files");
        assert_eq!(config.store.store_url, "redis://127.0.0.1:6379");
        assert_eq!(config.api.api_port, 3000);
        assert_eq!(config.events.stream, "meta:events");
        assert_eq!(config.events.batch_size, 100);
    }

    #[test]
    fn test_vfs_config_parses_octal_modes() {
        let mut config = Config::default();
        config.files.file_mode = "0600".to_string();
        config.files.dir_mode = "0700".to_string();

        let vfs = config.vfs_config();
        assert_eq!(vfs.file_mode, 0o600);
        assert_eq!(vfs.dir_mode, 0o700);
    }

    #[test]
    fn test_bad_octal_falls_back() {
        let mut config = Config::default();
        config.files.file_mode = "rwxr".to_string();
        assert_eq!(config.vfs_config().file_mode, 0o644);
    }

    #[test]
    fn test_toml_roundtrip() {
        let raw = r#"
            [files]
            files_root = "/data/files"
            webdav_base_url = "http://share/dav"

            [store]
            store_url = "redis://store:6379"
            store_prefix = "prod:"

            [api]
            api_port = 8080

            [events]
            batch_size = 250
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.files.files_root, "/data/files");
        assert_eq!(config.store.store_prefix, "prod:");
        assert_eq!(config.api.api_port, 8080);
        assert_eq!(config.events.batch_size, 250);
        // Unset sections keep their defaults.
        assert_eq!(config.events.tail_timeout_secs, 5);
    }

    #[test]
    fn test_sample_toml_parses_back() {
        let sample = Config::sample_toml();
        let parsed: Result<Config, _> = toml::from_str(&sample);
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_state_config_derivation() {
        let config = Config::default();
        let state = config.state_config();
        assert_eq!(state.stream, "meta:events");
        assert_eq!(state.tail_timeout, Duration::from_secs(5));
    }
}
