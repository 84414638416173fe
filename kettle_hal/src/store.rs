//! Storage backends for [`Persistence`] and [`RecipeSource`].
//!
//! ## File layout (`FileStore`)
//!
//! | File            | Contents                                   |
//! |-----------------|--------------------------------------------|
//! | `recovery.json` | latest [`RecoverySnapshot`], absent if none |
//! | `manual.json`   | last manual-mode settings                  |
//! | `session.json`  | id of the last loaded recipe               |
//! | `recipes.json`  | object of recipe id → recipe               |
//!
//! Every write goes to a sibling `.tmp` file first and is renamed into
//! place, so a power cut mid-write leaves the previous version intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use kettle_common::config::ManualDefaults;
use kettle_common::recipe::{Recipe, RecipeRecord};
use kettle_common::snapshot::RecoverySnapshot;
use kettle_common::store::{Persistence, RecipeSource, StoreError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

const RECOVERY_FILE: &str = "recovery.json";
const MANUAL_FILE: &str = "manual.json";
const SESSION_FILE: &str = "session.json";
const RECIPES_FILE: &str = "recipes.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Session {
    #[serde(default)]
    last_recipe_id: Option<String>,
}

// ─── File Store ─────────────────────────────────────────────────────

/// JSON files in one data directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on the files.
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) the data directory. A missing recipe
    /// library is seeded with the stock recipe.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        let store = Self {
            dir: dir.to_path_buf(),
            lock: Mutex::new(()),
        };
        if !store.path(RECIPES_FILE).exists() {
            info!(dir = %dir.display(), "No recipe library, seeding default recipe");
            store.save_recipe(&Recipe::default_recipe())?;
        }
        Ok(store)
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// `Ok(None)` when the file does not exist.
    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>, StoreError> {
        let path = self.path(file);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Malformed(format!("{}: {e}", path.display())))
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        let path = self.path(file);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&tmp, body).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        debug!(file, "Stored");
        Ok(())
    }

    fn recipe_map(&self) -> Result<Map<String, Value>, StoreError> {
        Ok(self.read_json(RECIPES_FILE)?.unwrap_or_default())
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl Persistence for FileStore {
    fn save_recovery_state(&self, snapshot: &RecoverySnapshot) -> Result<(), StoreError> {
        let _g = self.lock.lock();
        self.write_json(RECOVERY_FILE, snapshot)
    }

    fn get_recovery_state(&self) -> Result<Option<RecoverySnapshot>, StoreError> {
        let _g = self.lock.lock();
        self.read_json(RECOVERY_FILE)
    }

    fn clear_recovery_state(&self) -> Result<(), StoreError> {
        let _g = self.lock.lock();
        let path = self.path(RECOVERY_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn save_manual_defaults(&self, defaults: &ManualDefaults) -> Result<(), StoreError> {
        let _g = self.lock.lock();
        self.write_json(MANUAL_FILE, defaults)
    }

    fn load_manual_defaults(&self) -> Result<Option<ManualDefaults>, StoreError> {
        let _g = self.lock.lock();
        self.read_json(MANUAL_FILE)
    }

    fn save_last_recipe_id(&self, id: &str) -> Result<(), StoreError> {
        let _g = self.lock.lock();
        self.write_json(
            SESSION_FILE,
            &Session {
                last_recipe_id: Some(id.to_string()),
            },
        )
    }

    fn last_recipe_id(&self) -> Result<Option<String>, StoreError> {
        let _g = self.lock.lock();
        Ok(self
            .read_json::<Session>(SESSION_FILE)?
            .and_then(|s| s.last_recipe_id))
    }
}

impl RecipeSource for FileStore {
    fn load_recipe(&self, id: &str) -> Result<Recipe, StoreError> {
        let _g = self.lock.lock();
        let mut map = self.recipe_map()?;
        let raw = map
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("recipe '{id}'")))?;
        let mut record: RecipeRecord = serde_json::from_value(raw)
            .map_err(|e| StoreError::Malformed(format!("recipe '{id}': {e}")))?;
        if record.id.is_empty() {
            record.id = id.to_string();
        }
        let (recipe, diags) = Recipe::from_record(record);
        for d in &diags {
            warn!("{d}");
        }
        Ok(recipe)
    }

    fn save_recipe(&self, recipe: &Recipe) -> Result<(), StoreError> {
        let _g = self.lock.lock();
        let mut map = self.recipe_map()?;
        let value =
            serde_json::to_value(recipe).map_err(|e| StoreError::Serialization(e.to_string()))?;
        map.insert(recipe.id.clone(), value);
        self.write_json(RECIPES_FILE, &map)?;
        info!(id = %recipe.id, name = %recipe.name, "Recipe saved");
        Ok(())
    }

    fn list_recipes(&self) -> Result<Vec<(String, String)>, StoreError> {
        let _g = self.lock.lock();
        Ok(self
            .recipe_map()?
            .iter()
            .map(|(id, v)| {
                let name = v
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown Profile");
                (id.clone(), name.to_string())
            })
            .collect())
    }
}

// ─── Memory Store ───────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    recovery: Option<RecoverySnapshot>,
    recovery_writes: usize,
    manual: Option<ManualDefaults>,
    last_recipe_id: Option<String>,
    recipes: BTreeMap<String, Recipe>,
}

/// Volatile store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with `recipes`.
    pub fn with_recipes(recipes: impl IntoIterator<Item = Recipe>) -> Self {
        let store = Self::new();
        store
            .inner
            .lock()
            .recipes
            .extend(recipes.into_iter().map(|r| (r.id.clone(), r)));
        store
    }

    /// Current recovery record.
    pub fn recovery(&self) -> Option<RecoverySnapshot> {
        self.inner.lock().recovery.clone()
    }

    /// Number of recovery saves since creation.
    pub fn recovery_writes(&self) -> usize {
        self.inner.lock().recovery_writes
    }

    pub fn manual_defaults(&self) -> Option<ManualDefaults> {
        self.inner.lock().manual.clone()
    }
}

impl Persistence for MemoryStore {
    fn save_recovery_state(&self, snapshot: &RecoverySnapshot) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.recovery = Some(snapshot.clone());
        inner.recovery_writes += 1;
        Ok(())
    }

    fn get_recovery_state(&self) -> Result<Option<RecoverySnapshot>, StoreError> {
        Ok(self.inner.lock().recovery.clone())
    }

    fn clear_recovery_state(&self) -> Result<(), StoreError> {
        self.inner.lock().recovery = None;
        Ok(())
    }

    fn save_manual_defaults(&self, defaults: &ManualDefaults) -> Result<(), StoreError> {
        self.inner.lock().manual = Some(defaults.clone());
        Ok(())
    }

    fn load_manual_defaults(&self) -> Result<Option<ManualDefaults>, StoreError> {
        Ok(self.inner.lock().manual.clone())
    }

    fn save_last_recipe_id(&self, id: &str) -> Result<(), StoreError> {
        self.inner.lock().last_recipe_id = Some(id.to_string());
        Ok(())
    }

    fn last_recipe_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().last_recipe_id.clone())
    }
}

impl RecipeSource for MemoryStore {
    fn load_recipe(&self, id: &str) -> Result<Recipe, StoreError> {
        self.inner
            .lock()
            .recipes
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("recipe '{id}'")))
    }

    fn save_recipe(&self, recipe: &Recipe) -> Result<(), StoreError> {
        self.inner
            .lock()
            .recipes
            .insert(recipe.id.clone(), recipe.clone());
        Ok(())
    }

    fn list_recipes(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .inner
            .lock()
            .recipes
            .values()
            .map(|r| (r.id.clone(), r.name.clone()))
            .collect())
    }
}
