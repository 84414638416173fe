//! Common re-exports.

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{ConfigError, ConfigLoader, KettleConfig, ManualDefaults};
pub use crate::hal::{AlertSink, HalError, RelayActuator, RelayMask, TemperatureSensor};
pub use crate::recipe::{Addition, CompletionPolicy, Recipe, Step, StepKind};
pub use crate::snapshot::{RecoveryMode, RecoverySnapshot};
pub use crate::state::{PendingAlert, RunOrigin, SequenceStatus};
pub use crate::store::{Persistence, RecipeSource, StoreError};
