pub mod reference;
pub mod routine;
pub mod sync;

pub use reference::{Course, Module, Room, StudentGroup, Teacher};
pub use routine::{DaySlot, Routine, WeekDay, WeekRoutine};
pub use sync::{DaySyncOutcome, SyncResult, SyncTotals, WeekSyncResult};
