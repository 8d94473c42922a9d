//! Debounced reload pipeline.
//!
//! # State Transitions
//! ```text
//! event ─▶ op != Write ───────────────────────────▶ Ignored
//!       ─▶ inside debounce window ─────────────────▶ Debounced
//!       ─▶ read fails ─────────────── error hook ─▶ ReadFailed
//!       ─▶ unmarshal fails ────────── error hook ─▶ ParseFailed
//!       ─▶ incompatible ───────────── error hook ─▶ Rejected
//!       ─▶ swap ─▶ info hook ─▶ callbacks ────────▶ Applied
//! ```
//!
//! # Design Decisions
//! - The gate check-and-advance is one atomic read-modify-write, so two
//!   overlapping events cannot both pass
//! - The gate never moves backwards
//! - The file is read without holding the value lock; only the compare and
//!   swap runs under the write lock
//! - Failures never reach a caller; they go to the `error` hook

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ConfigError;
use crate::hooks::HookPattern;
use crate::options::DEFAULT_DEBOUNCE;
use crate::snapshot::Snapshot;
use crate::validation::{self, ChangeSet};
use crate::watcher::{ChangeEvent, ChangeOp};

use super::ConfigManager;

/// Callback invoked after an accepted reload.
pub type ReloadCallback<T> = Arc<dyn Fn(&ReloadContext<'_, T>) + Send + Sync>;

/// What a reload callback gets to see.
pub struct ReloadContext<'a, T: Snapshot> {
    event: &'a ChangeEvent,
    changes: &'a ChangeSet,
    manager: &'a ConfigManager<T>,
}

impl<'a, T: Snapshot> ReloadContext<'a, T> {
    /// The file event that triggered the reload.
    pub fn event(&self) -> &ChangeEvent {
        self.event
    }

    /// Fields that changed, by dotted path.
    pub fn changes(&self) -> &ChangeSet {
        self.changes
    }

    pub fn manager(&self) -> &ConfigManager<T> {
        self.manager
    }

    /// Copy of the configuration that was just stored.
    pub fn config(&self) -> crate::Result<T> {
        self.manager.get_config()
    }
}

/// Result of handling one change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Not a content write.
    Ignored,
    /// Dropped by the debounce gate.
    Debounced,
    /// The file could not be read.
    ReadFailed,
    /// The file did not unmarshal into the target type.
    ParseFailed,
    /// The candidate is not compatible with the stored value
    /// (see [`Snapshot::is_compatible`]).
    Rejected,
    /// The candidate was stored.
    Applied { changed: usize },
}

/// Leading-edge debounce over monotonic time.
#[derive(Debug)]
pub(crate) struct DebounceGate {
    epoch: Instant,
    /// Nanoseconds since `epoch` plus one; zero means no event accepted yet.
    last: AtomicU64,
    window: AtomicU64,
}

impl DebounceGate {
    pub(crate) fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            last: AtomicU64::new(0),
            window: AtomicU64::new(nanos(DEFAULT_DEBOUNCE)),
        }
    }

    pub(crate) fn set_window(&self, window: Duration) {
        self.window.store(nanos(window), Ordering::Release);
    }

    fn stamp(&self, now: Instant) -> u64 {
        nanos(now.saturating_duration_since(self.epoch)).saturating_add(1)
    }

    /// Accept `now` if at least one window has passed since the last accepted
    /// instant, advancing the gate.
    pub(crate) fn try_pass(&self, now: Instant) -> bool {
        let now = self.stamp(now);
        let window = self.window.load(Ordering::Acquire);
        self.last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                if last != 0 && (now < last || now - last < window) {
                    None
                } else {
                    Some(now)
                }
            })
            .is_ok()
    }

    /// Advance the gate to `now` without a check.
    pub(crate) fn mark(&self, now: Instant) {
        self.last.fetch_max(self.stamp(now), Ordering::AcqRel);
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl<T: Snapshot> ConfigManager<T> {
    /// Run the reload pipeline for one change event.
    ///
    /// Called from the watch thread; also usable directly.
    pub fn handle_event(&self, event: &ChangeEvent) -> ReloadOutcome {
        self.handle_event_at(event, Instant::now())
    }

    pub(crate) fn handle_event_at(&self, event: &ChangeEvent, now: Instant) -> ReloadOutcome {
        if event.op != ChangeOp::Write {
            return ReloadOutcome::Ignored;
        }
        if !self.gate.try_pass(now) {
            tracing::trace!(path = %event.path.display(), "Change inside debounce window, dropped");
            return ReloadOutcome::Debounced;
        }

        self.emit(
            HookPattern::Debug,
            format!("configuration file changed: {}", event.path.display()),
        );

        let read = {
            let mut loader = self.prepared_loader();
            match loader.read_in_config() {
                Ok(()) => Ok(loader.unmarshal::<T>()),
                Err(e) => Err(e),
            }
        };

        let candidate = match read {
            Ok(Ok(candidate)) => candidate,
            Ok(Err(e)) => {
                self.emit(
                    HookPattern::Error,
                    format!("failed to parse reloaded configuration, keeping current: {}", e),
                );
                return ReloadOutcome::ParseFailed;
            }
            Err(e) => {
                self.emit(
                    HookPattern::Error,
                    format!("failed to re-read configuration file, keeping current: {}", e),
                );
                return ReloadOutcome::ReadFailed;
            }
        };

        let changes = {
            let mut config = self.config.write();
            let previous = config.take();
            let verdict = match previous.as_ref() {
                Some(current) => validation::compare(current, &candidate).map(|diff| {
                    diff.is_compatible().then(|| diff.into_changes())
                }),
                None => Ok(Some(ChangeSet::new())),
            };

            match verdict {
                Ok(Some(changes)) => {
                    *config = Some(candidate);
                    Ok(changes)
                }
                Ok(None) => {
                    *config = previous;
                    Err(ConfigError::TypeMismatch)
                }
                Err(e) => {
                    *config = previous;
                    Err(e)
                }
            }
        };

        let changes = match changes {
            Ok(changes) => changes,
            Err(e) => {
                self.emit(
                    HookPattern::Error,
                    format!("reloaded configuration rejected, keeping current: {}", e),
                );
                return ReloadOutcome::Rejected;
            }
        };

        self.emit(
            HookPattern::Info,
            format!(
                "configuration reloaded from {} ({} field(s) changed)",
                event.path.display(),
                changes.len()
            ),
        );

        let mut callbacks = self.init_callbacks.read().clone();
        callbacks.extend(self.callbacks.read().iter().cloned());
        let context = ReloadContext {
            event,
            changes: &changes,
            manager: self,
        };
        for callback in &callbacks {
            callback(&context);
        }

        ReloadOutcome::Applied {
            changed: changes.len(),
        }
    }
}
