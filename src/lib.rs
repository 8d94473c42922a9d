//! Thread-safe, hot-reloadable configuration manager.
//!
//! A [`ConfigManager`] holds one typed configuration value loaded from a
//! YAML, JSON or TOML file, keeps it in sync with the file on disk and hands
//! out independent copies to readers.

pub mod error;
pub mod hooks;
pub mod loader;
pub mod manager;
pub mod options;
pub mod snapshot;
pub mod validation;
pub mod watcher;

pub use error::{ConfigError, Result};
pub use hooks::{HookContext, HookHandler, HookPattern, HookRegistry};
pub use manager::{ConfigManager, ReloadCallback, ReloadContext, ReloadOutcome};
pub use options::{EnvKeyReplacer, FileFormat, Options};
pub use snapshot::Snapshot;
pub use validation::{ChangeSet, FieldChange};
pub use watcher::{ChangeEvent, ChangeOp};
