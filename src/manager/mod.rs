//! Live configuration manager.
//!
//! # Data Flow
//! ```text
//! init()
//!     → options resolved (defaults for unset fields)
//!     → default value seeded if the file is missing
//!     → load_config() (read → unmarshal → store)
//!     → watcher started, validate_config() against the default template
//!
//! file write event:
//!     watcher.rs → reload.rs debounce gate
//!     → loader re-reads and unmarshals a candidate
//!     → validation.rs compares stored vs candidate
//!     → swap + info hook + callbacks, or keep old + error hook
//!
//! get_config():
//!     read lock → snapshot.rs deep copy → caller owns the copy
//! ```
//!
//! # Design Decisions
//! - One reader/writer lock for the value, a separate one for hooks, a mutex
//!   for the options and one for the loader
//! - Lock order is value → options → loader; nothing takes them in reverse
//! - Hooks and callbacks always run after every lock is released
//! - `load_config` replaces the value without structural validation; only
//!   watch-triggered reloads are validated
//! - No operation has a timeout: a hung read during `load_config` holds the
//!   write lock and stalls readers

mod reload;

pub use reload::{ReloadCallback, ReloadContext, ReloadOutcome};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::error::{ConfigError, Result};
use crate::hooks::{HookContext, HookPattern, HookRegistry};
use crate::loader::{self, ConfigLoader, EnvSettings};
use crate::options::{FileFormat, Options};
use crate::snapshot::{deep_copy, Snapshot};
use crate::validation::{self, ChangeSet};
use crate::watcher::FileWatcher;

use reload::DebounceGate;

#[derive(Debug, Default)]
struct OptionsState {
    options: Options,
    initialized: bool,
}

/// Thread-safe, hot-reloadable holder of a typed configuration value.
///
/// Shared as `Arc<ConfigManager<T>>`; the watch subscription only holds a
/// weak reference, so dropping the last `Arc` also stops watching.
pub struct ConfigManager<T: Snapshot> {
    config: RwLock<Option<T>>,
    default_config: T,
    options: Mutex<OptionsState>,
    loader: Mutex<ConfigLoader>,
    hooks: HookRegistry,
    gate: DebounceGate,
    init_callbacks: RwLock<Vec<ReloadCallback<T>>>,
    callbacks: RwLock<Vec<ReloadCallback<T>>>,
    starting: AtomicBool,
    watcher: Mutex<Option<FileWatcher>>,
}

/// Marks an `init` in progress; cleared on drop.
struct StartGuard<'a>(&'a AtomicBool);

impl<'a> StartGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: Snapshot> ConfigManager<T> {
    /// Create an empty manager. `default_config` seeds a missing file and is
    /// the template for [`validate_config`](Self::validate_config).
    pub fn new(default_config: T) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(None),
            default_config,
            options: Mutex::new(OptionsState::default()),
            loader: Mutex::new(ConfigLoader::new()),
            hooks: HookRegistry::new(),
            gate: DebounceGate::new(Instant::now()),
            init_callbacks: RwLock::new(Vec::new()),
            callbacks: RwLock::new(Vec::new()),
            starting: AtomicBool::new(false),
            watcher: Mutex::new(None),
        })
    }

    /// Accept `options` if none have been accepted yet; later calls are no-ops.
    /// Unset fields are filled with defaults.
    pub fn set_option(&self, options: Options) -> &Self {
        let mut state = self.options.lock();
        if state.initialized {
            tracing::debug!("Options already initialized, ignoring");
            return self;
        }
        state.options = options;
        state.options.apply_defaults();
        state.initialized = true;
        self.gate.set_window(state.options.debounce());
        self
    }

    /// Snapshot of the accepted options (defaults if none were set).
    pub fn options(&self) -> Options {
        self.ensure_options();
        self.options.lock().options.clone()
    }

    /// Absolute path of the managed file.
    pub fn config_path(&self) -> PathBuf {
        self.ensure_options();
        self.options.lock().options.file_path().to_path_buf()
    }

    fn ensure_options(&self) {
        let initialized = self.options.lock().initialized;
        if !initialized {
            self.set_option(Options::new());
        }
    }

    fn file_target(&self) -> (PathBuf, FileFormat, EnvSettings) {
        self.ensure_options();
        let state = self.options.lock();
        (
            state.options.file_path().to_path_buf(),
            state.options.format(),
            EnvSettings::from_options(&state.options),
        )
    }

    /// Read the file and replace the stored value.
    ///
    /// The write lock is held for the whole call. This explicit path is
    /// authoritative: the new value is stored without structural validation.
    pub fn load_config(&self) -> Result<()> {
        let mut config = self.config.write();
        let value = self.read_candidate()?;
        *config = Some(value);
        Ok(())
    }

    /// Lock the loader and point it at the resolved file.
    fn prepared_loader(&self) -> MutexGuard<'_, ConfigLoader> {
        let (path, format, env) = self.file_target();
        let mut loader = self.loader.lock();
        loader.set_config_file(path);
        loader.set_format(format);
        loader.configure_env(env);
        loader
    }

    fn read_candidate(&self) -> Result<T> {
        let mut loader = self.prepared_loader();
        loader.read_in_config()?;
        loader.unmarshal()
    }

    /// Independent copy of the stored value.
    pub fn get_config(&self) -> Result<T> {
        let config = self.config.read();
        let current = config.as_ref().ok_or(ConfigError::NotInitialized)?;
        deep_copy(current)
    }

    pub fn is_initialized(&self) -> bool {
        self.config.read().is_some()
    }

    /// One-shot setup: seed the file if missing, load it, start watching and
    /// validate against the default template. Any failure aborts setup and
    /// leaves the stored value and the init callbacks as they were.
    ///
    /// `callbacks` replace the set given to a previous `init`; callbacks
    /// registered with [`on_reload`](Self::on_reload) are kept.
    pub fn init<I>(self: &Arc<Self>, callbacks: I) -> Result<()>
    where
        I: IntoIterator<Item = ReloadCallback<T>>,
    {
        let Some(_guard) = StartGuard::acquire(&self.starting) else {
            return Err(ConfigError::AlreadyRunning);
        };
        if self.is_watching() {
            return Err(ConfigError::AlreadyRunning);
        }
        self.emit(HookPattern::Init, "initializing configuration manager");

        let callbacks: Vec<_> = callbacks.into_iter().collect();
        let previous_callbacks = std::mem::replace(&mut *self.init_callbacks.write(), callbacks);
        let mut replaced = None;

        if let Err(e) = self.start(&mut replaced) {
            if let Some(previous) = replaced {
                *self.config.write() = previous;
            }
            *self.init_callbacks.write() = previous_callbacks;
            self.emit(
                HookPattern::Error,
                format!("configuration manager initialization failed: {}", e),
            );
            return Err(e);
        }

        self.emit(
            HookPattern::Info,
            format!("configuration loaded from {}", self.config_path().display()),
        );
        Ok(())
    }

    /// `replaced` receives the value the first load displaced, so a later
    /// failure can put it back.
    fn start(self: &Arc<Self>, replaced: &mut Option<Option<T>>) -> Result<()> {
        self.ensure_config_file()?;
        {
            let mut config = self.config.write();
            let value = self.read_candidate()?;
            *replaced = Some(config.replace(value));
        }
        self.emit(
            HookPattern::Debug,
            format!("loaded configuration file {}", self.config_path().display()),
        );

        self.watch()?;
        if let Err(e) = self.validate_config() {
            self.stop();
            return Err(e);
        }
        Ok(())
    }

    /// Write the default value to the resolved path if no file exists.
    fn ensure_config_file(&self) -> Result<()> {
        let (path, format, _) = self.file_target();
        if loader::seed_file(&path, format, &self.default_config)? {
            self.emit(
                HookPattern::Info,
                format!("default configuration file written: {}", path.display()),
            );
        }
        Ok(())
    }

    fn watch(self: &Arc<Self>) -> Result<()> {
        let manager = Arc::downgrade(self);
        let watcher = FileWatcher::spawn(&self.config_path(), move |event| {
            if let Some(manager) = manager.upgrade() {
                manager.handle_event(&event);
            }
        })?;
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    /// Stop watching the file. Returns whether a subscription was running.
    pub fn stop(&self) -> bool {
        let stopped = self.watcher.lock().take().is_some();
        if stopped {
            self.emit(HookPattern::Info, "configuration watcher stopped");
        }
        stopped
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Compare the stored value with the default template.
    ///
    /// Returns the fields that differ from their defaults.
    pub fn validate_config(&self) -> Result<ChangeSet> {
        let diff = {
            let config = self.config.read();
            let current = config.as_ref().ok_or(ConfigError::NotInitialized)?;
            validation::compare(&self.default_config, current)?
        };

        if !diff.is_compatible() {
            self.emit(
                HookPattern::Error,
                "configuration is not compatible with the default template",
            );
            return Err(ConfigError::TypeMismatch);
        }

        let changes = diff.into_changes();
        self.emit(
            HookPattern::Debug,
            format!(
                "configuration validated, {} field(s) differ from defaults",
                changes.len()
            ),
        );
        Ok(changes)
    }

    /// Apply `update` to a copy of the stored value, persist it to the file
    /// and then store it. On any failure the stored value is unchanged.
    ///
    /// The file is rewritten in full from the effective value; comments are
    /// not preserved, and fields currently supplied by environment overrides
    /// (`bind_env`, automatic env) are written into the file as well.
    pub fn update_config<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut T),
    {
        let (path, format, _) = self.file_target();
        let mut config = self.config.write();
        let current = config.as_ref().ok_or(ConfigError::NotInitialized)?;

        let mut next = deep_copy(current)?;
        update(&mut next);

        let contents = loader::encode(&next, format)?;
        self.gate.mark(Instant::now());
        loader::write_file(&path, &contents)?;
        *config = Some(next);
        drop(config);

        self.emit(
            HookPattern::Info,
            format!("configuration updated and written to {}", path.display()),
        );
        Ok(())
    }

    /// Bind a configuration key to an environment variable.
    ///
    /// Without `var`, the name is the key uppercased with `.` replaced
    /// (by the configured replacer) and the env prefix prepended.
    pub fn bind_env(&self, key: &str, var: Option<&str>) -> Result<()> {
        self.loader.lock().bind_env(key, var)
    }

    /// Install a hook handler for `pattern`, replacing any previous one.
    pub fn set_hook<F>(&self, pattern: HookPattern, handler: F) -> &Self
    where
        F: Fn(&HookContext) + Send + Sync + 'static,
    {
        self.hooks.set(pattern, handler);
        self
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Register a callback invoked after every accepted reload, in addition
    /// to the callbacks passed to [`init`](Self::init).
    pub fn on_reload<F>(&self, callback: F) -> &Self
    where
        F: Fn(&ReloadContext<'_, T>) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
        self
    }

    /// Log `message` and dispatch it to the hook for `pattern`.
    fn emit(&self, pattern: HookPattern, message: impl Into<String>) {
        let message = message.into();
        match pattern {
            HookPattern::Init | HookPattern::Info => tracing::info!(hook = %pattern, "{}", message),
            HookPattern::Debug => tracing::debug!(hook = %pattern, "{}", message),
            HookPattern::Warn => tracing::warn!(hook = %pattern, "{}", message),
            HookPattern::Error => tracing::error!(hook = %pattern, "{}", message),
        }
        self.hooks.exec(pattern, message);
    }
}

impl<T: Snapshot> std::fmt::Debug for ConfigManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("initialized", &self.is_initialized())
            .field("watching", &self.is_watching())
            .field("hooks", &self.hooks)
            .finish()
    }
}
