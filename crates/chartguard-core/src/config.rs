use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Top-level configuration (loaded from chartguard.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartguardConfig {
    pub storage: StorageConfig,
    pub kdf: KdfConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Per-user application data directory (default: the platform data dir,
    /// e.g. ~/.local/share/chartguard on Linux)
    pub data_dir: PathBuf,
    /// Credential record file name inside `data_dir` (default: auth.json)
    pub auth_file: String,
}

/// Argon2id cost for newly written credential records.
///
/// Existing records keep the params they were written with; these only apply
/// at registration and on password change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_kib: u32,
    /// Iterations (default: 3)
    pub iterations: u32,
    /// Parallelism (default: 2)
    pub parallelism: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level or EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            auth_file: "auth.json".into(),
        }
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 2,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ChartguardConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))
    }

    /// Full path of the credential record, with `~` expanded.
    pub fn auth_path(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir).join(&self.storage.auth_file)
    }
}

/// Platform per-user data directory for chartguard, falling back to
/// `~/.local/share/chartguard` when no home directory can be resolved.
pub fn default_data_dir() -> PathBuf {
    match directories::ProjectDirs::from("org", "chartguard", "chartguard") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => PathBuf::from("~/.local/share/chartguard"),
    }
}

/// Expand a leading `~/` to `$HOME`
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[storage]
data_dir = "/var/lib/chartguard"
auth_file = "credentials.json"

[kdf]
memory_kib = 131072
iterations = 4
parallelism = 8

[log]
level = "debug"
format = "json"
"#;
        let config: ChartguardConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/chartguard"));
        assert_eq!(config.storage.auth_file, "credentials.json");
        assert_eq!(config.kdf.memory_kib, 131072);
        assert_eq!(config.kdf.iterations, 4);
        assert_eq!(config.kdf.parallelism, 8);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(
            config.auth_path(),
            PathBuf::from("/var/lib/chartguard/credentials.json")
        );
    }

    #[test]
    fn test_parse_defaults() {
        let config: ChartguardConfig = toml::from_str("").unwrap();

        assert_eq!(config.storage.data_dir, default_data_dir());
        assert_eq!(config.storage.auth_file, "auth.json");
        assert_eq!(config.kdf.memory_kib, 65536);
        assert_eq!(config.kdf.iterations, 3);
        assert_eq!(config.kdf.parallelism, 2);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[kdf]
iterations = 5
"#;
        let config: ChartguardConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.kdf.iterations, 5);
        // Defaults
        assert_eq!(config.kdf.memory_kib, 65536);
        assert_eq!(config.storage.auth_file, "auth.json");
    }

    #[test]
    fn test_auth_path_expands_tilde() {
        let config = ChartguardConfig::default();
        let path = config.auth_path();
        assert!(!path.starts_with("~"));
        assert!(path.ends_with("auth.json"));
        assert!(path.starts_with(expand_tilde(&default_data_dir())));
    }

    #[test]
    fn test_default_data_dir_is_per_user() {
        let dir = default_data_dir();
        assert!(dir.is_absolute() || dir.starts_with("~"));
        assert!(dir.to_string_lossy().contains("chartguard"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChartguardConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.kdf.iterations, 3);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chartguard.toml");
        std::fs::write(&path, "[kdf]\niterations = \"many\"\n").unwrap();

        let err = ChartguardConfig::load(&path).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ChartguardConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ChartguardConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.storage.data_dir, parsed.storage.data_dir);
        assert_eq!(config.kdf.memory_kib, parsed.kdf.memory_kib);
        assert_eq!(config.log.format, parsed.log.format);
    }
}
