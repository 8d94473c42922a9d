//! Hook dispatch registry.
//!
//! # Responsibilities
//! - Hold at most one handler per severity channel
//! - Dispatch lifecycle and failure messages to those handlers
//!
//! # Design Decisions
//! - Fixed array indexed by [`HookPattern`]; dispatch is O(1), no map
//! - Handlers are cloned out under the read lock and invoked after it is
//!   released, so a handler may call back into the manager or replace hooks
//! - Dispatching to an unset channel is a no-op

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Severity channel of a hook.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPattern {
    Init = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl HookPattern {
    pub const ALL: [HookPattern; 5] = [
        HookPattern::Init,
        HookPattern::Debug,
        HookPattern::Info,
        HookPattern::Warn,
        HookPattern::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookPattern::Init => "init",
            HookPattern::Debug => "debug",
            HookPattern::Info => "info",
            HookPattern::Warn => "warn",
            HookPattern::Error => "error",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for HookPattern {
    type Error = u8;

    fn try_from(val: u8) -> Result<Self, u8> {
        match val {
            0 => Ok(HookPattern::Init),
            1 => Ok(HookPattern::Debug),
            2 => Ok(HookPattern::Info),
            3 => Ok(HookPattern::Warn),
            4 => Ok(HookPattern::Error),
            other => Err(other),
        }
    }
}

impl fmt::Display for HookPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message delivered to a hook handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext {
    message: String,
    pattern: HookPattern,
}

impl HookContext {
    pub fn new(pattern: HookPattern, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            pattern,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn pattern(&self) -> HookPattern {
        self.pattern
    }
}

/// Shared hook handler.
pub type HookHandler = Arc<dyn Fn(&HookContext) + Send + Sync>;

/// One optional handler per [`HookPattern`].
#[derive(Default)]
pub struct HookRegistry {
    handlers: RwLock<[Option<HookHandler>; 5]>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `pattern`, replacing any previous one.
    pub fn set<F>(&self, pattern: HookPattern, handler: F)
    where
        F: Fn(&HookContext) + Send + Sync + 'static,
    {
        self.handlers.write()[pattern.index()] = Some(Arc::new(handler));
    }

    /// Remove the handler for `pattern`. Returns whether one was set.
    pub fn clear(&self, pattern: HookPattern) -> bool {
        self.handlers.write()[pattern.index()].take().is_some()
    }

    pub fn is_set(&self, pattern: HookPattern) -> bool {
        self.handlers.read()[pattern.index()].is_some()
    }

    /// Dispatch `message` to the handler for `pattern`, if any.
    pub fn exec(&self, pattern: HookPattern, message: impl Into<String>) {
        let handler = self.handlers.read()[pattern.index()].clone();
        if let Some(handler) = handler {
            handler(&HookContext::new(pattern, message));
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let set: Vec<&str> = HookPattern::ALL
            .iter()
            .filter(|pattern| handlers[pattern.index()].is_some())
            .map(HookPattern::as_str)
            .collect();
        f.debug_struct("HookRegistry").field("set", &set).finish()
    }
}
