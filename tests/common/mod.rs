//! Shared utilities for the hot-reload integration tests.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use live_config::{ConfigManager, HookContext, HookPattern, Options, Snapshot};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

pub const DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Database {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub port: u16,
    pub database: Database,
}

impl Snapshot for AppConfig {}

/// A temporary directory plus a manager pointed at `filename` inside it.
pub struct Fixture<T: Snapshot> {
    pub dir: TempDir,
    pub manager: Arc<ConfigManager<T>>,
    pub hooks: Arc<Mutex<Vec<HookContext>>>,
}

impl<T: Snapshot> Fixture<T> {
    pub fn new(filename: &str, default: T) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::new(default);
        manager.set_option(
            Options::new()
                .with_directory(dir.path())
                .with_filename(filename)
                .with_debounce(DEBOUNCE),
        );

        let hooks = Arc::new(Mutex::new(Vec::new()));
        for pattern in HookPattern::ALL {
            let hooks = hooks.clone();
            manager.set_hook(pattern, move |ctx| hooks.lock().unwrap().push(ctx.clone()));
        }

        Self {
            dir,
            manager,
            hooks,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.manager.config_path()
    }

    pub fn count(&self, pattern: HookPattern) -> usize {
        self.hooks
            .lock()
            .unwrap()
            .iter()
            .filter(|ctx| ctx.pattern() == pattern)
            .count()
    }

    #[allow(dead_code)]
    pub fn messages(&self, pattern: HookPattern) -> Vec<String> {
        self.hooks
            .lock()
            .unwrap()
            .iter()
            .filter(|ctx| ctx.pattern() == pattern)
            .map(|ctx| ctx.message().to_string())
            .collect()
    }
}

#[allow(dead_code)]
/// Overwrite `path` in place with a single write.
///
/// Truncating first would emit a separate event for the empty file, so the
/// new contents are padded with newlines to at least the old length instead.
pub fn rewrite(path: &Path, contents: &str) {
    let old_len = std::fs::metadata(path).map(|m| m.len() as usize).unwrap_or(0);
    let mut padded = contents.to_string();
    while padded.len() < old_len {
        padded.push('\n');
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open(path)
        .unwrap();
    file.write_all(padded.as_bytes()).unwrap();
    file.sync_all().unwrap();
}

#[allow(dead_code)]
/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

#[allow(dead_code)]
/// Sleep past the debounce window so the next event is accepted.
pub fn settle() {
    std::thread::sleep(DEBOUNCE * 3);
}

/// Shared counter for callbacks.
#[allow(dead_code)]
pub fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let reader = count.clone();
    (count, move || reader.load(Ordering::SeqCst))
}
