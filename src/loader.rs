//! Configuration loading from disk.
//!
//! # Responsibilities
//! - Read the configuration file in its declared format
//! - Overlay environment variables (automatic and per-key bindings)
//! - Deserialize the merged tree into a typed value
//! - Serialize a value back into the file format (default seeding, write-back)
//!
//! # Design Decisions
//! - Reading and unmarshalling are separate steps, so a reload can tell a
//!   broken file from a value that does not fit the target type
//! - Bindings without an explicit variable name are derived at read time,
//!   so a prefix configured later still applies

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ConfigError, Result};
use crate::options::{EnvKeyReplacer, FileFormat, Options};

/// Environment overlay settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSettings {
    pub prefix: Option<String>,
    pub automatic: bool,
    pub allow_empty: bool,
    pub replacer: Option<EnvKeyReplacer>,
}

impl EnvSettings {
    pub fn from_options(opts: &Options) -> Self {
        Self {
            prefix: opts.env_prefix().map(str::to_string),
            automatic: opts.automatic_env(),
            allow_empty: opts.allow_empty_env(),
            replacer: opts.env_key_replacer().cloned(),
        }
    }

    /// Environment variable name derived from a configuration key.
    pub fn var_name(&self, key: &str) -> String {
        let replaced = match &self.replacer {
            Some(replacer) => replacer.apply(key),
            None => EnvKeyReplacer::default().apply(key),
        };
        let name = replaced.to_ascii_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_ascii_uppercase(), name),
            None => name,
        }
    }
}

/// Reads a configuration file and its environment overlay.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    format: Option<FileFormat>,
    env: EnvSettings,
    bindings: BTreeMap<String, Option<String>>,
    contents: Option<Config>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config_file(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn set_format(&mut self, format: FileFormat) {
        self.format = Some(format);
    }

    pub fn configure_env(&mut self, settings: EnvSettings) {
        self.env = settings;
    }

    /// Bind `key` to an environment variable. Without `var` the name is
    /// derived from the key (see [`EnvSettings::var_name`]).
    pub fn bind_env(&mut self, key: &str, var: Option<&str>) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidBinding("empty configuration key".into()));
        }
        if let Some(var) = var {
            if var.trim().is_empty() {
                return Err(ConfigError::InvalidBinding(format!(
                    "empty environment variable name for key {}",
                    key
                )));
            }
        }
        self.bindings
            .insert(key.to_string(), var.map(|v| v.trim().to_string()));
        Ok(())
    }

    pub fn config_file_used(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the file and environment overlay into memory.
    pub fn read_in_config(&mut self) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| ConfigError::FileNotFound(PathBuf::new()))?;
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path));
        }

        let format = self
            .format
            .or_else(|| FileFormat::from_path(&path))
            .unwrap_or(FileFormat::Yaml);

        let mut builder = Config::builder()
            .add_source(File::from(path.as_path()).format(format.into()).required(true));

        if self.env.automatic {
            builder = builder.add_source(self.environment_source());
        }

        for (key, var) in &self.bindings {
            let name = var.clone().unwrap_or_else(|| self.env.var_name(key));
            let Ok(value) = env::var(&name) else {
                continue;
            };
            if value.is_empty() && !self.env.allow_empty {
                continue;
            }
            tracing::debug!(key = %key, var = %name, "Applying environment binding");
            builder = builder
                .set_override(key.as_str(), value)
                .map_err(|source| ConfigError::ParseFailed {
                    path: path.clone(),
                    source,
                })?;
        }

        let contents = builder
            .build()
            .map_err(|source| ConfigError::ParseFailed {
                path: path.clone(),
                source,
            })?;
        self.contents = Some(contents);
        Ok(())
    }

    /// Deserialize the last successful read into `T`.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T> {
        let contents = self.contents.clone().ok_or(ConfigError::NotInitialized)?;
        contents
            .try_deserialize()
            .map_err(|source| ConfigError::ParseFailed {
                path: self.path.clone().unwrap_or_default(),
                source,
            })
    }

    fn environment_source(&self) -> Environment {
        let mut source = match &self.env.prefix {
            Some(prefix) => Environment::with_prefix(prefix).prefix_separator("_"),
            None => Environment::default(),
        };
        if let Some(replacer) = &self.env.replacer {
            if !replacer.separator().is_empty() {
                source = source.separator(replacer.separator());
            }
        }
        source.ignore_empty(!self.env.allow_empty).try_parsing(true)
    }
}

/// Serialize `value` in `format`.
pub fn encode<T: Serialize>(value: &T, format: FileFormat) -> Result<String> {
    let encoded = match format {
        FileFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        FileFormat::Json => serde_json::to_string_pretty(value)
            .map(|mut json| {
                json.push('\n');
                json
            })
            .map_err(|e| e.to_string()),
        FileFormat::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
    };
    encoded.map_err(|message| ConfigError::Encode { format, message })
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `value` to `path` unless the file already exists.
///
/// Returns `true` when a file was written.
pub fn seed_file<T: Serialize>(path: &Path, format: FileFormat, value: &T) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let contents = encode(value, format)?;
    write_file(path, &contents)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Database {
        host: String,
        port: u16,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct AppConfig {
        name: String,
        port: u16,
        database: Database,
    }

    fn sample() -> AppConfig {
        AppConfig {
            name: "svc".into(),
            port: 8080,
            database: Database {
                host: "localhost".into(),
                port: 5432,
            },
        }
    }

    fn loader_for(path: &Path) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        loader.set_config_file(path);
        loader
    }

    const SAMPLE_YAML: &str = "name: svc\nport: 8080\ndatabase:\n  host: localhost\n  port: 5432\n";

    #[test]
    fn test_read_and_unmarshal_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, SAMPLE_YAML).unwrap();

        let mut loader = loader_for(&path);
        loader.read_in_config().unwrap();
        let config: AppConfig = loader.unmarshal().unwrap();
        assert_eq!(config, sample());
        assert_eq!(loader.config_file_used(), Some(path.as_path()));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = loader_for(&dir.path().join("absent.yaml"));
        assert!(matches!(
            loader.read_in_config(),
            Err(ConfigError::FileNotFound(_))
        ));

        let mut loader = ConfigLoader::new();
        assert!(matches!(
            loader.read_in_config(),
            Err(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_unmarshal_before_read() {
        let loader = ConfigLoader::new();
        assert!(matches!(
            loader.unmarshal::<AppConfig>(),
            Err(ConfigError::NotInitialized)
        ));
    }

    #[test]
    fn test_type_error_is_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "name: svc\nport: notanumber\ndatabase:\n  host: localhost\n  port: 5432\n",
        )
        .unwrap();

        let mut loader = loader_for(&path);
        loader.read_in_config().unwrap();
        assert!(matches!(
            loader.unmarshal::<AppConfig>(),
            Err(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn test_syntax_error_is_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ \"name\": ").unwrap();

        let mut loader = loader_for(&path);
        assert!(matches!(
            loader.read_in_config(),
            Err(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn test_explicit_format_overrides_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.conf");
        fs::write(&path, "name = \"svc\"\nport = 8080\n[database]\nhost = \"localhost\"\nport = 5432\n")
            .unwrap();

        let mut loader = loader_for(&path);
        loader.set_format(FileFormat::Toml);
        loader.read_in_config().unwrap();
        assert_eq!(loader.unmarshal::<AppConfig>().unwrap(), sample());
    }

    #[test]
    fn test_bind_env_with_explicit_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, SAMPLE_YAML).unwrap();
        env::set_var("LIVE_CONFIG_TEST_DB_HOST", "db.internal");

        let mut loader = loader_for(&path);
        loader
            .bind_env("database.host", Some("LIVE_CONFIG_TEST_DB_HOST"))
            .unwrap();
        loader.read_in_config().unwrap();
        let config: AppConfig = loader.unmarshal().unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 5432);
    }

    #[test]
    fn test_bind_env_derived_name_and_empty_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, SAMPLE_YAML).unwrap();
        env::set_var("LCBIND_DATABASE_PORT", "6432");
        env::set_var("LCBIND_NAME", "");

        let mut loader = loader_for(&path);
        loader.configure_env(EnvSettings {
            prefix: Some("lcbind".into()),
            ..EnvSettings::default()
        });
        loader.bind_env("database.port", None).unwrap();
        loader.bind_env("name", None).unwrap();
        loader.read_in_config().unwrap();

        let config: AppConfig = loader.unmarshal().unwrap();
        assert_eq!(config.database.port, 6432);
        assert_eq!(config.name, "svc");
    }

    #[test]
    fn test_automatic_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, SAMPLE_YAML).unwrap();
        env::set_var("LCAUTO_PORT", "9191");

        let mut loader = loader_for(&path);
        loader.configure_env(EnvSettings {
            prefix: Some("LCAUTO".into()),
            automatic: true,
            ..EnvSettings::default()
        });
        loader.read_in_config().unwrap();

        let config: AppConfig = loader.unmarshal().unwrap();
        assert_eq!(config.port, 9191);
    }

    #[test]
    fn test_invalid_bindings() {
        let mut loader = ConfigLoader::new();
        assert!(matches!(
            loader.bind_env("  ", None),
            Err(ConfigError::InvalidBinding(_))
        ));
        assert!(matches!(
            loader.bind_env("name", Some("")),
            Err(ConfigError::InvalidBinding(_))
        ));
    }

    #[test]
    fn test_var_name_derivation() {
        let settings = EnvSettings::default();
        assert_eq!(settings.var_name("database.host"), "DATABASE_HOST");

        let settings = EnvSettings {
            prefix: Some("app".into()),
            replacer: Some(EnvKeyReplacer::new(".", "__")),
            ..EnvSettings::default()
        };
        assert_eq!(settings.var_name("database.host"), "APP_DATABASE__HOST");
    }

    #[test]
    fn test_seed_file_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(seed_file(&path, FileFormat::Toml, &sample()).unwrap());
        assert!(!seed_file(&path, FileFormat::Toml, &sample()).unwrap());

        let mut loader = loader_for(&path);
        loader.read_in_config().unwrap();
        assert_eq!(loader.unmarshal::<AppConfig>().unwrap(), sample());
    }

    #[test]
    fn test_encode_rejects_unrepresentable_toml() {
        let err = encode(&vec![1, 2, 3], FileFormat::Toml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Encode {
                format: FileFormat::Toml,
                ..
            }
        ));
    }
}
