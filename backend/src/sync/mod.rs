//! Pure building blocks of the routine sync engine.

pub mod calendar;
pub mod hash;
pub mod lock;
pub mod validator;

pub use calendar::{date_label, day_label, next_run_after, parse_sync_date, week_dates};
pub use hash::{RoutineFingerprint, hash_entry, hash_routine};
pub use lock::DayLocks;
pub use validator::{InvalidReason, check_routine_validity, is_valid};
