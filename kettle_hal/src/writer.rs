//! Write-behind persistence.
//!
//! The engine persists a recovery snapshot on transitions and heartbeats,
//! and it does so from inside the control tick. A write to an SD card can
//! take hundreds of milliseconds, so [`WriteBehindStore`] queues writes
//! for its own thread and returns at once. Only the newest value of each
//! record is queued: a snapshot superseded before the writer gets to it is
//! never written.
//!
//! Reads wait for queued writes to land first, so a read always sees the
//! writes made before it.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use kettle_common::config::ManualDefaults;
use kettle_common::snapshot::RecoverySnapshot;
use kettle_common::store::{Persistence, StoreError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
enum RecoveryWrite {
    Save(RecoverySnapshot),
    Clear,
}

/// Newest queued value per record.
#[derive(Debug, Default)]
struct Pending {
    recovery: Option<RecoveryWrite>,
    manual: Option<ManualDefaults>,
    last_recipe_id: Option<String>,
    /// A batch taken from here is being written.
    busy: bool,
}

impl Pending {
    fn is_idle(&self) -> bool {
        !self.busy
            && self.recovery.is_none()
            && self.manual.is_none()
            && self.last_recipe_id.is_none()
    }
}

#[derive(Default)]
struct Shared {
    pending: Mutex<Pending>,
    idle: Condvar,
}

/// [`Persistence`] wrapper that moves writes off the caller's thread.
pub struct WriteBehindStore {
    inner: Arc<dyn Persistence>,
    shared: Arc<Shared>,
    wake: Option<SyncSender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl WriteBehindStore {
    /// Start the writer thread in front of `inner`.
    pub fn spawn(inner: Arc<dyn Persistence>) -> Result<Self, StoreError> {
        let shared = Arc::new(Shared::default());
        let (wake, rx) = mpsc::sync_channel(1);

        let thread_inner = Arc::clone(&inner);
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("kettle-store".into())
            .spawn(move || writer_loop(thread_inner.as_ref(), &thread_shared, &rx))
            .map_err(|e| StoreError::Io {
                path: "store writer thread".into(),
                source: e,
            })?;

        info!("Store writer running");
        Ok(Self {
            inner,
            shared,
            wake: Some(wake),
            handle: Some(handle),
        })
    }

    /// Block until every queued write has been attempted.
    pub fn flush(&self) {
        let mut pending = self.shared.pending.lock();
        while !pending.is_idle() {
            self.shared.idle.wait(&mut pending);
        }
    }

    fn enqueue(&self, update: impl FnOnce(&mut Pending)) {
        update(&mut self.shared.pending.lock());
        let Some(wake) = &self.wake else {
            return;
        };
        match wake.try_send(()) {
            // Full: the queued wake-up will pick this write up too.
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                warn!("Store writer gone, writing inline");
                write_batch(self.inner.as_ref(), &self.shared);
            }
        }
    }
}

impl Drop for WriteBehindStore {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit.
        self.wake.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn writer_loop(store: &dyn Persistence, shared: &Shared, wake: &Receiver<()>) {
    debug!("Store writer started");
    while wake.recv().is_ok() {
        write_batch(store, shared);
    }
    write_batch(store, shared);
    debug!("Store writer stopped");
}

fn write_batch(store: &dyn Persistence, shared: &Shared) {
    let (recovery, manual, last_recipe_id) = {
        let mut p = shared.pending.lock();
        p.busy = true;
        (p.recovery.take(), p.manual.take(), p.last_recipe_id.take())
    };

    if let Some(id) = last_recipe_id {
        if let Err(e) = store.save_last_recipe_id(&id) {
            warn!(error = %e, "Failed to remember last recipe");
        }
    }
    if let Some(defaults) = manual {
        if let Err(e) = store.save_manual_defaults(&defaults) {
            warn!(error = %e, "Failed to save manual defaults");
        }
    }
    match recovery {
        Some(RecoveryWrite::Save(snapshot)) => {
            if let Err(e) = store.save_recovery_state(&snapshot) {
                warn!(error = %e, "Failed to save recovery snapshot");
            }
        }
        Some(RecoveryWrite::Clear) => {
            if let Err(e) = store.clear_recovery_state() {
                warn!(error = %e, "Failed to clear recovery snapshot");
            }
        }
        None => {}
    }

    shared.pending.lock().busy = false;
    shared.idle.notify_all();
}

impl Persistence for WriteBehindStore {
    fn save_recovery_state(&self, snapshot: &RecoverySnapshot) -> Result<(), StoreError> {
        let write = RecoveryWrite::Save(snapshot.clone());
        self.enqueue(|p| p.recovery = Some(write));
        Ok(())
    }

    fn get_recovery_state(&self) -> Result<Option<RecoverySnapshot>, StoreError> {
        self.flush();
        self.inner.get_recovery_state()
    }

    fn clear_recovery_state(&self) -> Result<(), StoreError> {
        self.enqueue(|p| p.recovery = Some(RecoveryWrite::Clear));
        Ok(())
    }

    fn save_manual_defaults(&self, defaults: &ManualDefaults) -> Result<(), StoreError> {
        let defaults = defaults.clone();
        self.enqueue(|p| p.manual = Some(defaults));
        Ok(())
    }

    fn load_manual_defaults(&self) -> Result<Option<ManualDefaults>, StoreError> {
        self.flush();
        self.inner.load_manual_defaults()
    }

    fn save_last_recipe_id(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.enqueue(|p| p.last_recipe_id = Some(id));
        Ok(())
    }

    fn last_recipe_id(&self) -> Result<Option<String>, StoreError> {
        self.flush();
        self.inner.last_recipe_id()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
