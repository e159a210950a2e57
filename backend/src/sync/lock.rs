use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Datelike, NaiveDate, Weekday};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per day label. Every date falling on the same weekday
/// reads and then writes the same set of routines, so those syncs must not
/// overlap.
#[derive(Clone, Default)]
pub struct DayLocks {
    inner: Arc<Mutex<HashMap<Weekday, Arc<AsyncMutex<()>>>>>,
}

impl DayLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, date: NaiveDate) -> OwnedMutexGuard<()> {
        let weekday = date.weekday();
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // drop slots nobody holds or waits on
            map.retain(|d, m| *d == weekday || Arc::strong_count(m) > 1);
            map.entry(weekday).or_default().clone()
        };
        slot.lock_owned().await
    }
}
