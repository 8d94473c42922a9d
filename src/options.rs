//! Option descriptor for locating and watching the configuration file.
//!
//! # Responsibilities
//! - Hold the file location (directory + filename) and format
//! - Hold behavioral knobs (debounce window, environment binding)
//! - Resolve and cache the absolute file path
//!
//! # Design Decisions
//! - Every field is a [`Setting`]: the first explicit value wins, so a later
//!   `apply_defaults` pass never clobbers what the caller chose
//! - Overwriting is opt-in through [`Options::overwrite`]
//! - Unset booleans are distinct from `false`

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// Default configuration filename.
pub const DEFAULT_FILENAME: &str = "config.yaml";

/// Default configuration directory.
pub const DEFAULT_DIRECTORY: &str = "./configs";

/// Default debounce window for file change events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

/// A value that can be set once; later sets are ignored unless replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting<T>(Option<T>);

impl<T> Setting<T> {
    /// An unset cell.
    pub const fn unset() -> Self {
        Self(None)
    }

    /// Store `value` if nothing is set yet. Returns whether it was stored.
    pub fn set(&mut self, value: T) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.0 = Some(value);
        true
    }

    /// Store `value` unconditionally, returning the previous value.
    pub fn replace(&mut self, value: T) -> Option<T> {
        self.0.replace(value)
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

impl<T> Default for Setting<T> {
    fn default() -> Self {
        Self::unset()
    }
}

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Yaml,
    Json,
    Toml,
}

impl FileFormat {
    /// Infer the format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(FileFormat::Yaml),
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }

    /// Infer the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Yaml => "yaml",
            FileFormat::Json => "json",
            FileFormat::Toml => "toml",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("unsupported config format: {}", s))
    }
}

impl From<FileFormat> for config::FileFormat {
    fn from(format: FileFormat) -> Self {
        match format {
            FileFormat::Yaml => config::FileFormat::Yaml,
            FileFormat::Json => config::FileFormat::Json,
            FileFormat::Toml => config::FileFormat::Toml,
        }
    }
}

/// Maps configuration keys to environment variable names.
///
/// `EnvKeyReplacer::new(".", "_")` turns `database.host` into `database_host`;
/// uppercasing and the prefix are added by
/// [`EnvSettings::var_name`](crate::loader::EnvSettings::var_name).
/// The target string also acts as the nesting separator for automatic env.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvKeyReplacer {
    from: String,
    to: String,
}

impl EnvKeyReplacer {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn apply(&self, key: &str) -> String {
        if self.from.is_empty() {
            return key.to_string();
        }
        key.replace(&self.from, &self.to)
    }

    pub fn separator(&self) -> &str {
        &self.to
    }
}

impl Default for EnvKeyReplacer {
    fn default() -> Self {
        Self::new(".", "_")
    }
}

/// Location and behavior of a managed configuration file.
#[derive(Debug, Clone, Default)]
pub struct Options {
    directory: Setting<PathBuf>,
    filename: Setting<String>,
    format: Setting<FileFormat>,
    debounce: Setting<Duration>,
    env_prefix: Setting<String>,
    automatic_env: Setting<bool>,
    allow_empty_env: Setting<bool>,
    env_key_replacer: Setting<EnvKeyReplacer>,
    overwrite: bool,
    resolved: OnceLock<PathBuf>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `with_*` call replace values that are already set.
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        store(&mut self.directory, directory.into(), self.overwrite);
        self.resolved = OnceLock::new();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        store(&mut self.filename, filename.into(), self.overwrite);
        self.resolved = OnceLock::new();
        self
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        store(&mut self.format, format, self.overwrite);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        store(&mut self.debounce, debounce, self.overwrite);
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        store(&mut self.env_prefix, prefix.into(), self.overwrite);
        self
    }

    pub fn with_automatic_env(mut self, enabled: bool) -> Self {
        store(&mut self.automatic_env, enabled, self.overwrite);
        self
    }

    pub fn with_allow_empty_env(mut self, allowed: bool) -> Self {
        store(&mut self.allow_empty_env, allowed, self.overwrite);
        self
    }

    pub fn with_env_key_replacer(mut self, replacer: EnvKeyReplacer) -> Self {
        store(&mut self.env_key_replacer, replacer, self.overwrite);
        self
    }

    /// Fill every unset field with its default. Explicit values are kept.
    pub fn apply_defaults(&mut self) -> &mut Self {
        self.directory.set(PathBuf::from(DEFAULT_DIRECTORY));
        self.filename.set(DEFAULT_FILENAME.to_string());
        let inferred = FileFormat::from_path(Path::new(self.filename())).unwrap_or(FileFormat::Yaml);
        self.format.set(inferred);
        self.debounce.set(DEFAULT_DEBOUNCE);
        self.automatic_env.set(false);
        self.allow_empty_env.set(false);
        self
    }

    pub fn directory(&self) -> &Path {
        self.directory
            .get()
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(DEFAULT_DIRECTORY))
    }

    pub fn filename(&self) -> &str {
        self.filename.get().map(String::as_str).unwrap_or(DEFAULT_FILENAME)
    }

    /// Explicit format, else the filename extension, else yaml.
    pub fn format(&self) -> FileFormat {
        self.format
            .get()
            .copied()
            .or_else(|| FileFormat::from_path(Path::new(self.filename())))
            .unwrap_or(FileFormat::Yaml)
    }

    pub fn debounce(&self) -> Duration {
        self.debounce.get().copied().unwrap_or(DEFAULT_DEBOUNCE)
    }

    pub fn env_prefix(&self) -> Option<&str> {
        self.env_prefix
            .get()
            .map(String::as_str)
            .filter(|prefix| !prefix.is_empty())
    }

    pub fn automatic_env(&self) -> bool {
        self.automatic_env.get().copied().unwrap_or(false)
    }

    pub fn allow_empty_env(&self) -> bool {
        self.allow_empty_env.get().copied().unwrap_or(false)
    }

    pub fn env_key_replacer(&self) -> Option<&EnvKeyReplacer> {
        self.env_key_replacer.get()
    }

    /// Absolute path of `directory/filename`, computed once.
    pub fn file_path(&self) -> &Path {
        self.resolved.get_or_init(|| {
            let joined = self.directory().join(self.filename());
            std::path::absolute(&joined).unwrap_or(joined)
        })
    }
}

fn store<T>(setting: &mut Setting<T>, value: T, overwrite: bool) {
    if overwrite {
        setting.replace(value);
    } else {
        setting.set(value);
    }
}
