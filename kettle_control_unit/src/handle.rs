//! Shared engine handle.
//!
//! The cycle runner and every front end hold a clone. Each command and
//! each tick takes the lock once, so a command is always applied between
//! two ticks and never half-way through one. No guard leaves this
//! module, so nobody outside it can hold the lock across a tick.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::{Command, CommandOutcome};
use crate::engine::Engine;
use crate::status::EngineSummary;

#[derive(Clone)]
pub struct KettleHandle {
    inner: Arc<Mutex<Engine>>,
}

impl KettleHandle {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn apply(&self, cmd: Command) -> CommandOutcome {
        self.inner.lock().apply(cmd)
    }

    /// Run `f` against the engine under the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn summary(&self) -> EngineSummary {
        self.inner.lock().summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kettle_common::clock::ManualClock;
    use kettle_common::config::KettleConfig;
    use kettle_common::state::SequenceStatus;
    use kettle_hal::{LogAlertSink, MemoryStore};
    use std::thread;

    #[test]
    fn commands_from_other_threads_are_serialized() {
        let handle = KettleHandle::new(Engine::new(
            KettleConfig::default(),
            Arc::new(ManualClock::new(0.0, Utc::now())),
            Arc::new(LogAlertSink::new()),
            Arc::new(MemoryStore::new()),
        ));
        let remote = handle.clone();
        thread::spawn(move || remote.apply(Command::EnterManual))
            .join()
            .unwrap();
        assert_eq!(handle.summary().status, SequenceStatus::Manual);
        assert_eq!(handle.with(|e| e.status()), SequenceStatus::Manual);
    }
}
