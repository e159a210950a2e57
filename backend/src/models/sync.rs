use chrono::NaiveDate;
use serde::Serialize;

/// Outcome of one completed daily sync. Per-entry failures are listed in
/// `errors`; a failed batch is an `Err` and never produces this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub date: NaiveDate,
    pub day: String,
    pub added: usize,
    pub reactivated: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Upstream entries rejected by the validator.
    pub invalid: usize,
    pub errors: Vec<String>,
    pub success: bool,
}

impl SyncResult {
    pub fn new(date: NaiveDate, day: &str) -> Self {
        Self {
            date,
            day: day.to_string(),
            added: 0,
            reactivated: 0,
            removed: 0,
            unchanged: 0,
            invalid: 0,
            errors: Vec::new(),
            success: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncTotals {
    pub added: usize,
    pub reactivated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl SyncTotals {
    pub fn absorb(&mut self, day: &SyncResult) {
        self.added += day.added;
        self.reactivated += day.reactivated;
        self.removed += day.removed;
        self.unchanged += day.unchanged;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DaySyncOutcome {
    Completed(SyncResult),
    Failed { date: NaiveDate, error: String },
}

impl DaySyncOutcome {
    pub fn date(&self) -> NaiveDate {
        match self {
            DaySyncOutcome::Completed(result) => result.date,
            DaySyncOutcome::Failed { date, .. } => *date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSyncResult {
    pub start_date: NaiveDate,
    pub days: Vec<DaySyncOutcome>,
    pub total_stats: SyncTotals,
    /// Batch-level failures of individual dates plus every per-entry error, prefixed by date.
    pub errors: Vec<String>,
    /// `false` when at least one date failed at batch level.
    pub success: bool,
}

impl WeekSyncResult {
    pub fn new(start_date: NaiveDate) -> Self {
        Self {
            start_date,
            days: Vec::new(),
            total_stats: SyncTotals::default(),
            errors: Vec::new(),
            success: true,
        }
    }

    pub fn record(&mut self, outcome: DaySyncOutcome) {
        match &outcome {
            DaySyncOutcome::Completed(result) => {
                self.total_stats.absorb(result);
                self.errors
                    .extend(result.errors.iter().map(|e| format!("{}: {}", result.date, e)));
            }
            DaySyncOutcome::Failed { date, error } => {
                self.success = false;
                self.errors.push(format!("{}: {}", date, error));
            }
        }
        self.days.push(outcome);
    }
}
