//! Deep-copy strategy for configuration snapshots.
//!
//! # Responsibilities
//! - Give every reader a copy that shares nothing with the stored value
//!
//! # Design Decisions
//! - A type opts into a custom copy by overriding [`Snapshot::snapshot`]
//! - Otherwise the value takes a JSON round trip; fields marked
//!   `#[serde(skip)]` come back as their `Default`
//! - The same trait carries the reload compatibility check; two values of
//!   one Rust type are compatible unless the type says otherwise

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::validation::same_shape;

/// Capability trait for values stored in a [`ConfigManager`](crate::ConfigManager).
///
/// An empty `impl Snapshot for MyConfig {}` selects the JSON round trip.
///
/// ```
/// use live_config::Snapshot;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct AppConfig {
///     name: String,
/// }
///
/// impl Snapshot for AppConfig {
///     fn snapshot(&self) -> Option<Self> {
///         Some(self.clone())
///     }
/// }
/// ```
pub trait Snapshot: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Independent copy of `self`, or `None` to use the generic round trip.
    fn snapshot(&self) -> Option<Self> {
        None
    }

    /// Whether `other` may replace `self` on reload.
    fn is_compatible(&self, _other: &Self) -> bool {
        true
    }
}

/// Untyped trees must keep their shape (see [`same_shape`]).
impl Snapshot for serde_json::Value {
    fn snapshot(&self) -> Option<Self> {
        Some(self.clone())
    }

    fn is_compatible(&self, other: &Self) -> bool {
        same_shape(self, other)
    }
}

/// Produce an independent copy of `value`.
pub fn deep_copy<T: Snapshot>(value: &T) -> Result<T> {
    if let Some(copy) = value.snapshot() {
        return Ok(copy);
    }
    json_round_trip(value)
}

fn json_round_trip<T: Serialize + DeserializeOwned>(value: &T) -> Result<T> {
    let data = serde_json::to_vec(value)?;
    Ok(serde_json::from_slice(&data)?)
}
