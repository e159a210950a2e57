use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc, Weekday};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::db::repository::{self, NewRoutine};
use crate::error::AppError;
use crate::external::{RoutineEntry, ScheduleSource};
use crate::models::{DaySyncOutcome, Routine, SyncResult, WeekSyncResult};
use crate::sync::hash::{self, short};
use crate::sync::{DayLocks, check_routine_validity, date_label, week_dates};

/// Reconciles locally stored routines against the upstream schedule.
pub struct SyncService {
    db: SqlitePool,
    source: Arc<dyn ScheduleSource>,
    locks: DayLocks,
    excluded_weekday: Option<Weekday>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddOutcome {
    Added,
    Reactivated,
    AlreadyActive,
}

impl SyncService {
    pub fn new(db: SqlitePool, source: Arc<dyn ScheduleSource>, excluded_weekday: Option<Weekday>) -> Self {
        Self {
            db,
            source,
            locks: DayLocks::new(),
            excluded_weekday,
        }
    }

    pub fn excluded_weekday(&self) -> Option<Weekday> {
        self.excluded_weekday
    }

    /// Syncs one calendar day with an existing token.
    ///
    /// Per-entry failures land in `SyncResult::errors`. Upstream, auth and
    /// initial read failures abort the day and are returned as `Err`.
    pub async fn sync_daily(&self, token: &str, date: NaiveDate) -> Result<SyncResult, AppError> {
        let _guard = self.locks.lock(date).await;
        let day = date_label(date);
        info!("Syncing routines for {} ({})", date, day);

        let (local, external) = tokio::join!(
            repository::fetch_active_routines_for_day(&self.db, day),
            self.source.get_routines_of_date(token, date),
        );
        let external = external?;
        let local = local?;
        info!("DB: {}, API: {}", local.len(), external.len());

        let mut result = SyncResult::new(date, day);

        let mut external_by_hash: BTreeMap<String, &RoutineEntry> = BTreeMap::new();
        for (index, entry) in external.iter().enumerate() {
            let entry = match (check_routine_validity(entry.as_ref()), entry) {
                (Ok(()), Some(entry)) => entry,
                (Err(reason), _) => {
                    let name = entry.as_ref().map(RoutineEntry::display_name).unwrap_or("Unknown");
                    debug!("Skipping invalid entry #{} ({}): {}", index, name, reason);
                    result.invalid += 1;
                    result.errors.push(format!("Invalid entry #{} ({}): {}", index, name, reason));
                    continue;
                }
                (Ok(()), None) => continue,
            };
            match hash::hash_entry(entry) {
                Some(h) => {
                    external_by_hash.entry(h).or_insert(entry);
                }
                None => {
                    result.invalid += 1;
                    result.errors.push(format!("Could not hash entry #{} ({})", index, entry.display_name()));
                }
            }
        }
        info!(
            "Valid API routines: {} out of {} ({} distinct)",
            external.len() - result.invalid,
            external.len(),
            external_by_hash.len()
        );

        let local_by_hash = index_local(&local);

        let to_add: Vec<(&String, &RoutineEntry)> = external_by_hash
            .iter()
            .filter(|(h, _)| !local_by_hash.contains_key(h.as_str()))
            .map(|(h, e)| (h, *e))
            .collect();
        let to_remove: Vec<&Routine> = local_by_hash
            .iter()
            .filter(|(h, _)| !external_by_hash.contains_key(**h))
            .map(|(_, r)| *r)
            .collect();
        result.unchanged = local_by_hash
            .keys()
            .filter(|h| external_by_hash.contains_key(**h))
            .count();

        info!(
            "New: {}, Removed: {}, Same: {}",
            to_add.len(),
            to_remove.len(),
            result.unchanged
        );

        for (hash, entry) in to_add {
            match self.add_or_reactivate(hash, entry).await {
                Ok(AddOutcome::Added) => {
                    result.added += 1;
                    debug!("Added: {} (hash: {})", entry.display_name(), short(hash));
                }
                Ok(AddOutcome::Reactivated) => {
                    result.reactivated += 1;
                    debug!("Reactivated: {} (hash: {})", entry.display_name(), short(hash));
                }
                Ok(AddOutcome::AlreadyActive) => {
                    warn!(
                        "Routine {} (hash: {}) is already active under another day label",
                        entry.display_name(),
                        short(hash)
                    );
                    result.unchanged += 1;
                }
                Err(e) => {
                    warn!("Error adding {} (hash: {}): {}", entry.display_name(), short(hash), e);
                    result.errors.push(format!("Error adding {}: {}", entry.display_name(), e));
                }
            }
        }

        for routine in to_remove {
            match repository::set_active(&self.db, &routine.id, false).await {
                Ok(_) => {
                    result.removed += 1;
                    debug!(
                        "Marked inactive: {} (hash: {})",
                        routine.module_name,
                        routine.hash.as_deref().map(short).unwrap_or("-")
                    );
                }
                Err(e) => {
                    warn!("Error removing {}: {}", routine.module_name, e);
                    result.errors.push(format!("Error removing {}: {}", routine.module_name, e));
                }
            }
        }

        info!(
            "Sync complete for {}: added={}, reactivated={}, removed={}, unchanged={}, errors={}",
            date,
            result.added,
            result.reactivated,
            result.removed,
            result.unchanged,
            result.errors.len()
        );
        Ok(result)
    }

    /// Runs [`Self::sync_daily`], refreshing `token` once if upstream reports it expired.
    pub async fn sync_date_with_refresh(&self, token: &mut String, date: NaiveDate) -> Result<SyncResult, AppError> {
        match self.sync_daily(token, date).await {
            Err(AppError::TokenExpired) => {
                warn!("Token expired while syncing {}, refreshing", date);
                *token = self.source.get_auth_token().await?;
                self.sync_daily(token, date).await
            }
            other => other,
        }
    }

    /// Fetches a token and syncs one date.
    pub async fn sync_daily_now(&self, date: NaiveDate) -> Result<SyncResult, AppError> {
        let mut token = self.source.get_auth_token().await?;
        self.sync_date_with_refresh(&mut token, date).await
    }

    pub async fn sync_today(&self) -> Result<SyncResult, AppError> {
        self.sync_daily_now(Utc::now().date_naive()).await
    }

    /// Syncs the seven days starting at `start_date`, sequentially, skipping the
    /// excluded weekday. One failed date never stops the remaining ones.
    pub async fn sync_weekly(&self, start_date: NaiveDate) -> Result<WeekSyncResult, AppError> {
        let mut token = self.source.get_auth_token().await?;
        let mut week = WeekSyncResult::new(start_date);

        for date in week_dates(start_date, self.excluded_weekday) {
            match self.sync_date_with_refresh(&mut token, date).await {
                Ok(result) => week.record(DaySyncOutcome::Completed(result)),
                Err(e) => {
                    error!("Sync failed for {}: {}", date, e);
                    week.record(DaySyncOutcome::Failed {
                        date,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Weekly sync from {} finished: {:?}, {} errors",
            start_date,
            week.total_stats,
            week.errors.len()
        );
        Ok(week)
    }

    /// Marks every active routine inactive. Rows are never deleted.
    pub async fn deactivate_all(&self) -> Result<u64, AppError> {
        let count = repository::deactivate_all_active(&self.db).await?;
        info!("Marked inactive: {} routines", count);
        Ok(count)
    }

    async fn add_or_reactivate(&self, hash: &str, entry: &RoutineEntry) -> Result<AddOutcome, AppError> {
        if let Some(existing) = repository::find_routine_by_hash(&self.db, hash).await? {
            if existing.is_active {
                return Ok(AddOutcome::AlreadyActive);
            }
            repository::set_active(&self.db, &existing.id, true).await?;
            return Ok(AddOutcome::Reactivated);
        }

        let new_routine = NewRoutine::from_entry(entry, hash)
            .ok_or_else(|| AppError::Validation("incomplete routine entry".to_string()))?;
        repository::create_routine(&self.db, &new_routine).await?;
        Ok(AddOutcome::Added)
    }
}

/// Local routines keyed by stored hash. Rows without a hash are skipped.
fn index_local(local: &[Routine]) -> BTreeMap<&str, &Routine> {
    let mut by_hash = BTreeMap::new();
    let mut unhashed = 0;
    for routine in local {
        let Some(stored) = routine.hash.as_deref() else {
            unhashed += 1;
            continue;
        };
        if let Some(computed) = hash::hash_routine(routine) {
            if computed != stored {
                warn!(
                    "Stored hash {} of routine {} differs from its content hash {}",
                    short(stored),
                    routine.id,
                    short(&computed)
                );
            }
        }
        by_hash.insert(stored, routine);
    }
    if unhashed > 0 {
        debug!("Skipped {} local routines without a hash", unhashed);
    }
    by_hash
}
