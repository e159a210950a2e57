use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, Utc};
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::SyncResult;
use crate::services::sync_service::SyncService;
use crate::sync::{date_label, next_run_after};

/// Daily sync スケジューラー
/// 除外曜日以外の毎日、指定時刻 (UTC) に当日分の同期を実行
pub struct SyncScheduler {
    service: Arc<SyncService>,
    run_at: NaiveTime,
}

impl SyncScheduler {
    pub fn new(service: Arc<SyncService>, run_at: NaiveTime) -> Self {
        Self { service, run_at }
    }

    /// 次回実行までの待機時間
    pub fn delay_until_next_run(&self) -> Duration {
        let now = Utc::now().naive_utc();
        let next = next_run_after(now, self.run_at, self.service.excluded_weekday());
        (next - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// 同期を無限ループで定期実行
    pub async fn start(self) {
        info!(
            "Starting daily sync scheduler (at {} UTC, excluded: {:?})",
            self.run_at,
            self.service.excluded_weekday()
        );

        loop {
            let delay = self.delay_until_next_run();
            info!("Next routine sync in {:?}", delay);
            tokio::time::sleep(delay).await;

            // エラーが発生してもループは継続
            match self.run_sync().await {
                Ok(result) => {
                    info!(
                        "Daily routine sync completed for {} ({}) - added: {}, reactivated: {}, removed: {}, unchanged: {}, errors: {}",
                        result.date,
                        date_label(result.date),
                        result.added,
                        result.reactivated,
                        result.removed,
                        result.unchanged,
                        result.errors.len()
                    );
                }
                Err(e) => {
                    warn!("Daily routine sync failed: {}", e);
                }
            }
        }
    }

    /// 当日分の同期を実行
    pub async fn run_sync(&self) -> Result<SyncResult, AppError> {
        self.service.sync_today().await
    }
}
