//! Application configuration.
//!
//! Loaded from a TOML file; a missing file yields the built-in defaults and
//! unknown keys are ignored. The config path is validated against the base
//! directory so a crafted `CONFIG_PATH` cannot read files outside it.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use keymask_core::detect::{EntropyConfig, PatternConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub proxy: ProxySection,
    pub tls: TlsSection,
    pub storage: StorageSection,
    pub placeholder: PlaceholderSection,
    pub interceptors: InterceptorsSection,
    pub logging: LoggingSection,
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxySection {
    pub listen: String,
    pub max_body_bytes: usize,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            listen: ":8080".to_string(),
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    pub ca_cert: PathBuf,
    pub ca_key: PathBuf,
}

impl Default for TlsSection {
    fn default() -> Self {
        Self {
            ca_cert: PathBuf::from("./certs/ca.crt"),
            ca_key: PathBuf::from("./certs/ca.key"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// `memory` or `redis`.
    pub r#type: String,
    /// Mapping TTL in seconds.
    pub ttl_secs: u64,
    pub redis: RedisSection,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            r#type: "memory".to_string(),
            ttl_secs: 24 * 60 * 60,
            redis: RedisSection::default(),
        }
    }
}

impl StorageSection {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSection {
    pub address: String,
    pub password: String,
    pub db: i64,
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            address: "localhost:6379".to_string(),
            password: String::new(),
            db: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaceholderSection {
    pub prefix: String,
    pub suffix: String,
}

impl Default for PlaceholderSection {
    fn default() -> Self {
        Self {
            prefix: "__SECRET_".to_string(),
            suffix: "__".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterceptorsSection {
    pub entropy: EntropyConfig,
    pub pattern: PatternConfig,
    /// Reserved for the Bitwarden-backed detector; parsed but not wired.
    pub bitwarden: BitwardenSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BitwardenSection {
    pub enabled: bool,
    pub server_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `debug`, `info`, `warn`, or `error`.
    pub level: String,
    pub audit: AuditSection,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            audit: AuditSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    pub enabled: bool,
    /// `minimal`, `standard`, or `verbose`.
    pub level: String,
    /// `stdout`, `stderr`, or a file path (JSON format only).
    pub output: String,
    /// `json` or `text`.
    pub format: String,
    /// When false, hosts are blanked in audit events.
    pub include_request_details: bool,
    pub log_interceptor_name: bool,
    pub log_secret_type: bool,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "standard".to_string(),
            output: "stdout".to_string(),
            format: "json".to_string(),
            include_request_details: false,
            log_interceptor_name: true,
            log_secret_type: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    pub enabled: bool,
    pub endpoint: String,
    pub port: u16,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/metrics".to_string(),
            port: 9090,
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, resolved against `base_dir`.
    ///
    /// A missing file is not an error; a file that exists but fails to parse
    /// is fatal, as is a path escaping the base directory.
    pub fn load(path: &Path, base_dir: &Path) -> anyhow::Result<Self> {
        let safe_path = sanitize_config_path(path, base_dir)?;

        let contents = match std::fs::read_to_string(&safe_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %safe_path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(anyhow::anyhow!("failed to read config file: {e}")),
        };

        let config: AppConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse config file: {e}"))?;
        Ok(config)
    }
}

/// Resolves `path` against `base_dir` and rejects any result that escapes
/// it.
fn sanitize_config_path(path: &Path, base_dir: &Path) -> anyhow::Result<PathBuf> {
    let base = base_dir
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("failed to resolve base directory: {e}"))?;

    let target = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    };

    if !target.starts_with(&base) {
        anyhow::bail!("config path escapes the base directory");
    }
    Ok(target)
}

/// Lexically removes `.` and resolves `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
