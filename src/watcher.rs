//! Configuration file watcher for hot reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::Result;

/// Kind of change reported for the watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOp {
    Write,
    Create,
    Rename,
    Remove,
    Chmod,
}

impl ChangeOp {
    /// Translate a notify event kind. Access and unclassified events map to `None`.
    pub fn from_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(ChangeOp::Create),
            EventKind::Remove(_) => Some(ChangeOp::Remove),
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                Some(ChangeOp::Write)
            }
            EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeOp::Rename),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(ChangeOp::Chmod),
            _ => None,
        }
    }
}

/// A change to the watched configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub op: ChangeOp,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, op: ChangeOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

/// Owned watch subscription; dropping it stops delivery.
pub struct FileWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `path` and call `handler` for every change to it.
    ///
    /// The parent directory is watched so that editors replacing the file
    /// keep producing events. `handler` runs on the watch backend's thread.
    pub fn spawn<F>(path: &Path, handler: F) -> Result<Self>
    where
        F: Fn(ChangeEvent) + Send + 'static,
    {
        let target: Option<OsString> = path.file_name().map(|name| name.to_os_string());
        let directory = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let Some(op) = ChangeOp::from_kind(&event.kind) else {
                        return;
                    };
                    for changed in event.paths {
                        if changed.file_name().map(|name| name.to_os_string()) == target {
                            handler(ChangeEvent::new(changed, op));
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(Self {
            path: path.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").field("path", &self.path).finish()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        tracing::info!(path = ?self.path, "Config watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use std::sync::mpsc;

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(
            ChangeOp::from_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeOp::Write)
        );
        assert_eq!(
            ChangeOp::from_kind(&EventKind::Modify(ModifyKind::Any)),
            Some(ChangeOp::Write)
        );
        assert_eq!(
            ChangeOp::from_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeOp::Create)
        );
        assert_eq!(
            ChangeOp::from_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(ChangeOp::Rename)
        );
        assert_eq!(
            ChangeOp::from_kind(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeOp::Remove)
        );
        assert_eq!(
            ChangeOp::from_kind(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            Some(ChangeOp::Chmod)
        );
        assert_eq!(ChangeOp::from_kind(&EventKind::Access(AccessKind::Any)), None);
        assert_eq!(ChangeOp::from_kind(&EventKind::Other), None);
    }

    #[test]
    fn test_watcher_reports_writes_to_target_only() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("config.yaml");
        let other = dir.path().join("other.yaml");
        std::fs::write(&target, "a: 1\n").unwrap();
        std::fs::write(&other, "a: 1\n").unwrap();

        let (tx, rx) = mpsc::channel();
        let watcher = FileWatcher::spawn(&target, move |event| {
            let _ = tx.send(event);
        })
        .unwrap();
        assert_eq!(watcher.path(), target.as_path());

        std::fs::write(&other, "a: 2\n").unwrap();
        std::fs::write(&target, "a: 2\n").unwrap();

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.path.file_name(), target.file_name());

        drop(watcher);
        while let Ok(event) = rx.recv_timeout(Duration::from_millis(200)) {
            assert_eq!(event.path.file_name(), target.file_name());
        }
    }
}
