//! Persistence and recipe-source collaborator traits.
//!
//! Recovery snapshots are written from inside the control tick, on
//! transitions and heartbeats, so a [`Persistence`] handed to the engine
//! must not block. Backends that touch a disk go behind a write-behind
//! queue. Recipes are read on command. Implementations must be internally
//! synchronized (`&self` methods).

use thiserror::Error;

use crate::config::ManualDefaults;
use crate::recipe::Recipe;
use crate::snapshot::RecoverySnapshot;

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Encoding a record failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored record could not be decoded.
    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// Durable run state.
pub trait Persistence: Send + Sync {
    fn save_recovery_state(&self, snapshot: &RecoverySnapshot) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing is stored. A record that cannot be decoded is
    /// reported as `Malformed`; callers treat it as absent.
    fn get_recovery_state(&self) -> Result<Option<RecoverySnapshot>, StoreError>;

    fn clear_recovery_state(&self) -> Result<(), StoreError>;

    /// Remember the operator's latest manual settings.
    fn save_manual_defaults(&self, defaults: &ManualDefaults) -> Result<(), StoreError>;

    fn load_manual_defaults(&self) -> Result<Option<ManualDefaults>, StoreError>;

    /// Remember the most recently loaded recipe.
    fn save_last_recipe_id(&self, id: &str) -> Result<(), StoreError>;

    fn last_recipe_id(&self) -> Result<Option<String>, StoreError>;
}

/// Recipe library.
pub trait RecipeSource: Send + Sync {
    fn load_recipe(&self, id: &str) -> Result<Recipe, StoreError>;

    fn save_recipe(&self, recipe: &Recipe) -> Result<(), StoreError>;

    /// `(id, name)` pairs.
    fn list_recipes(&self) -> Result<Vec<(String, String)>, StoreError>;
}
