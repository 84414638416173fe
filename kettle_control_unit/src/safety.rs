//! Safety module root.
//!
//! Hard-stop override, sensor fail-safe tracking and crash recovery.

pub mod fail_safe;
pub mod hard_stop;
pub mod recovery;
