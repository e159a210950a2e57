use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Weekday};
use routine_backend::{
    db::{self, repository},
    error::AppError,
    external::{
        RoutineEntry, ScheduleSource,
        dto::{CourseDto, GroupDto, ModuleDto, RoomDto, TeacherDto},
    },
    models::DaySyncOutcome,
    services::SyncService,
    sync::{hash_entry, hash_routine},
};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// 日付ごとに返すエントリを差し替えられる外部 API のフェイク
#[derive(Default)]
struct ScriptedSource {
    days: Mutex<HashMap<NaiveDate, Vec<Option<RoutineEntry>>>>,
    failing: Mutex<HashSet<NaiveDate>>,
    expired_responses: AtomicUsize,
    tokens_issued: AtomicUsize,
}

impl ScriptedSource {
    fn set(&self, date: NaiveDate, entries: Vec<RoutineEntry>) {
        self.set_raw(date, entries.into_iter().map(Some).collect());
    }

    fn set_raw(&self, date: NaiveDate, entries: Vec<Option<RoutineEntry>>) {
        self.days.lock().unwrap().insert(date, entries);
    }

    fn fail(&self, date: NaiveDate) {
        self.failing.lock().unwrap().insert(date);
    }
}

#[async_trait]
impl ScheduleSource for ScriptedSource {
    async fn get_auth_token(&self) -> Result<String, AppError> {
        let n = self.tokens_issued.fetch_add(1, Ordering::SeqCst);
        Ok(format!("token-{}", n))
    }

    async fn get_routines_of_date(
        &self,
        _token: &str,
        date: NaiveDate,
    ) -> Result<Vec<Option<RoutineEntry>>, AppError> {
        if self
            .expired_responses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::TokenExpired);
        }
        if self.failing.lock().unwrap().contains(&date) {
            return Err(AppError::ExternalService("routine request failed: request timed out".to_string()));
        }
        Ok(self.days.lock().unwrap().get(&date).cloned().unwrap_or_default())
    }
}

async fn setup() -> (Arc<SyncService>, Arc<ScriptedSource>, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create database");
    db::migrate(&pool).await.expect("Failed to run migrations");

    let source = Arc::new(ScriptedSource::default());
    let service = Arc::new(SyncService::new(pool.clone(), source.clone(), Some(Weekday::Sat)));
    (service, source, pool)
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 10).unwrap()
}

fn entry(day: &str, module_code: &str, start: &str, groups: &[&str]) -> RoutineEntry {
    RoutineEntry {
        id: None,
        day: Some(day.to_string()),
        start_time: Some(start.to_string()),
        end_time: Some("17:00".to_string()),
        class_type: Some("Lecture".to_string()),
        course_dto: Some(CourseDto {
            name: Some("BSc Computing".to_string()),
            description: None,
        }),
        module_dto: Some(ModuleDto {
            name: Some(format!("Module {}", module_code)),
            code: Some(module_code.to_string()),
        }),
        room_dto: Some(RoomDto {
            name: Some("Kalpana".to_string()),
            block: Some("A".to_string()),
        }),
        teacher_dto: Some(TeacherDto {
            name: Some("Ram Sharma".to_string()),
            email: None,
            contact_number: None,
        }),
        group_list: Some(groups.iter().map(|g| Some(GroupDto { name: Some(g.to_string()) })).collect()),
    }
}

fn a() -> RoutineEntry {
    entry("mon", "CS4001NI", "09:00", &["C1", "C2"])
}

fn b() -> RoutineEntry {
    entry("mon", "CS4002NI", "11:00", &["C1"])
}

fn c() -> RoutineEntry {
    entry("mon", "CS4003NI", "13:00", &["C3"])
}

async fn rows_with_hash(pool: &SqlitePool, hash: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM routines WHERE hash = ?1")
        .bind(hash)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_replaces_removed_and_adds_new_entries() {
    let (service, source, pool) = setup().await;

    source.set(monday(), vec![a(), b()]);
    let first = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!((first.added, first.removed, first.unchanged), (2, 0, 0));

    source.set(monday(), vec![b(), c()]);
    let second = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(second.added, 1);
    assert_eq!(second.removed, 1);
    assert_eq!(second.unchanged, 1);
    assert!(second.errors.is_empty());

    let hash_a = hash_entry(&a()).unwrap();
    let stored_a = repository::find_routine_by_hash(&pool, &hash_a).await.unwrap().unwrap();
    assert!(!stored_a.is_active);

    let active = repository::fetch_active_routines_for_day(&pool, "mon").await.unwrap();
    let mut codes: Vec<&str> = active.iter().map(|r| r.module_code.as_str()).collect();
    codes.sort();
    assert_eq!(codes, vec!["CS4002NI", "CS4003NI"]);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let (service, source, pool) = setup().await;
    source.set(monday(), vec![a(), b(), c()]);

    let first = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!((first.added, first.removed, first.unchanged), (3, 0, 0));

    let second = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!((second.added, second.removed, second.unchanged), (0, 0, 3));
    assert_eq!(repository::count_active_routines(&pool).await.unwrap(), 3);
}

#[tokio::test]
async fn test_group_order_upstream_does_not_create_duplicates() {
    let (service, source, _pool) = setup().await;
    source.set(monday(), vec![entry("mon", "CS4001NI", "09:00", &["C1", "C2"])]);
    service.sync_daily("t", monday()).await.unwrap();

    source.set(monday(), vec![entry("mon", "CS4001NI", "09:00", &["C2", "C1"])]);
    let result = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!((result.added, result.removed, result.unchanged), (0, 0, 1));
}

#[tokio::test]
async fn test_reappearing_routine_is_reactivated_not_duplicated() {
    let (service, source, pool) = setup().await;
    let hash_a = hash_entry(&a()).unwrap();

    source.set(monday(), vec![a()]);
    service.sync_daily("t", monday()).await.unwrap();

    source.set(monday(), vec![]);
    let gone = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(gone.removed, 1);

    source.set(monday(), vec![a()]);
    let back = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(back.reactivated, 1);
    assert_eq!(back.added, 0);
    assert_eq!(rows_with_hash(&pool, &hash_a).await, 1);

    let stored = repository::find_routine_by_hash(&pool, &hash_a).await.unwrap().unwrap();
    assert!(stored.is_active);
}

#[tokio::test]
async fn test_one_invalid_entry_does_not_block_the_rest() {
    let (service, source, _pool) = setup().await;
    let mut broken = c();
    broken.room_dto = None;
    source.set(monday(), vec![a(), broken, b()]);

    let result = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(result.added, 2);
    assert_eq!(result.invalid, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("room is missing"));
    assert!(result.success);
}

#[tokio::test]
async fn test_null_entries_are_rejected() {
    let (service, source, _pool) = setup().await;
    source.set_raw(monday(), vec![None, Some(a())]);

    let result = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(result.added, 1);
    assert_eq!(result.invalid, 1);
}

#[tokio::test]
async fn test_duplicate_upstream_entries_collapse() {
    let (service, source, pool) = setup().await;
    source.set(monday(), vec![a(), a()]);

    let result = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(result.added, 1);
    assert!(result.errors.is_empty());
    assert_eq!(repository::count_active_routines(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_superset_only_adds_and_subset_only_removes() {
    let (service, source, _pool) = setup().await;
    source.set(monday(), vec![a()]);
    service.sync_daily("t", monday()).await.unwrap();

    source.set(monday(), vec![a(), b(), c()]);
    let grown = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(grown.removed, 0);
    assert_eq!(grown.added, 2);

    source.set(monday(), vec![b()]);
    let shrunk = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(shrunk.added, 0);
    assert_eq!(shrunk.removed, 2);
    assert_eq!(shrunk.unchanged, 1);
}

#[tokio::test]
async fn test_other_days_are_left_alone() {
    let (service, source, pool) = setup().await;
    let tuesday = NaiveDate::from_ymd_opt(2025, 11, 11).unwrap();
    source.set(tuesday, vec![entry("tue", "CS4001NI", "09:00", &["C1"])]);
    service.sync_daily("t", tuesday).await.unwrap();

    // Monday upstream is empty: Tuesday's routine must survive
    let result = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(result.removed, 0);
    assert_eq!(repository::fetch_active_routines_for_day(&pool, "tue").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_upstream_failure_aborts_the_day_without_writes() {
    let (service, source, pool) = setup().await;
    source.set(monday(), vec![a()]);
    service.sync_daily("t", monday()).await.unwrap();

    source.fail(monday());
    let err = service.sync_daily("t", monday()).await.unwrap_err();
    assert!(matches!(err, AppError::ExternalService(_)));
    assert_eq!(repository::count_active_routines(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_expired_token_is_refreshed_once() {
    let (service, source, _pool) = setup().await;
    source.set(monday(), vec![a()]);
    source.expired_responses.store(1, Ordering::SeqCst);

    let result = service.sync_daily_now(monday()).await.unwrap();
    assert_eq!(result.added, 1);
    assert_eq!(source.tokens_issued.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_token_expiring_twice_fails_the_day() {
    let (service, source, _pool) = setup().await;
    source.expired_responses.store(2, Ordering::SeqCst);

    let err = service.sync_daily_now(monday()).await.unwrap_err();
    assert!(matches!(err, AppError::TokenExpired));
}

#[tokio::test]
async fn test_weekly_sync_aggregates_and_isolates_failures() {
    let (service, source, _pool) = setup().await;
    let tuesday = NaiveDate::from_ymd_opt(2025, 11, 11).unwrap();
    let wednesday = NaiveDate::from_ymd_opt(2025, 11, 12).unwrap();
    let saturday = NaiveDate::from_ymd_opt(2025, 11, 15).unwrap();

    source.set(monday(), vec![a(), b()]);
    source.fail(tuesday);
    source.set(wednesday, vec![entry("wed", "CS4001NI", "09:00", &["C1"])]);
    source.set(saturday, vec![entry("sat", "CS4009NI", "09:00", &["C1"])]);

    let week = service.sync_weekly(monday()).await.unwrap();

    // Saturday is excluded: 6 dates
    assert_eq!(week.days.len(), 6);
    assert!(week.days.iter().all(|d| d.date() != saturday));
    assert_eq!(week.total_stats.added, 3);
    let per_day_added: usize = week
        .days
        .iter()
        .map(|d| match d {
            DaySyncOutcome::Completed(r) => r.added,
            DaySyncOutcome::Failed { .. } => 0,
        })
        .sum();
    assert_eq!(week.total_stats.added, per_day_added);

    assert!(!week.success);
    assert_eq!(week.errors.len(), 1);
    assert!(week.errors[0].starts_with("2025-11-11"));
    assert!(matches!(week.days[1], DaySyncOutcome::Failed { date, .. } if date == tuesday));

    // one token for the whole week
    assert_eq!(source.tokens_issued.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_runs_for_the_same_date_do_not_duplicate() {
    let (service, source, pool) = setup().await;
    source.set(monday(), vec![a(), b(), c()]);

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.sync_daily("t", monday()).await })
    };
    let second = {
        let service = service.clone();
        tokio::spawn(async move { service.sync_daily("t", monday()).await })
    };
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first.added + second.added, 3);
    assert!(first.errors.is_empty() && second.errors.is_empty());
    assert_eq!(repository::count_active_routines(&pool).await.unwrap(), 3);
}

#[tokio::test]
async fn test_concurrent_runs_for_the_same_weekday_share_one_routine_set() {
    let (service, source, pool) = setup().await;
    let next_monday = NaiveDate::from_ymd_opt(2025, 11, 17).unwrap();
    source.set(monday(), vec![a(), b(), c()]);
    source.set(next_monday, vec![a(), b(), c()]);

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.sync_daily("t", monday()).await })
    };
    let second = {
        let service = service.clone();
        tokio::spawn(async move { service.sync_daily("t", next_monday).await })
    };
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert!(first.errors.is_empty(), "{:?}", first.errors);
    assert!(second.errors.is_empty(), "{:?}", second.errors);
    assert_eq!(first.added + second.added, 3);
    assert_eq!(first.unchanged + second.unchanged, 3);
    assert_eq!(repository::count_active_routines(&pool).await.unwrap(), 3);
}

#[tokio::test]
async fn test_repeated_group_names_keep_a_stable_hash() {
    let (service, source, pool) = setup().await;
    let repeated = entry("mon", "CS4001NI", "09:00", &["C1", "C1"]);
    source.set(monday(), vec![repeated.clone()]);

    let first = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(first.added, 1);

    let hash = hash_entry(&repeated).unwrap();
    let stored = repository::find_routine_by_hash(&pool, &hash).await.unwrap().unwrap();
    assert_eq!(stored.groups, vec!["C1".to_string()]);
    assert_eq!(hash_routine(&stored), Some(hash));

    let second = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.unchanged, 1);
    assert!(second.errors.is_empty());
}

#[tokio::test]
async fn test_one_failed_insert_does_not_block_the_rest() {
    let (service, source, pool) = setup().await;
    sqlx::query(
        "CREATE TRIGGER reject_cs4003 BEFORE INSERT ON routines \
         WHEN (SELECT module_code FROM modules WHERE id = NEW.module_id) = 'CS4003NI' \
         BEGIN SELECT RAISE(ABORT, 'module rejected'); END",
    )
    .execute(&pool)
    .await
    .unwrap();
    source.set(monday(), vec![a(), b(), c()]);

    let result = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(result.added, 2);
    assert_eq!(result.invalid, 0);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("module rejected"));
    assert!(result.success);
    assert_eq!(rows_with_hash(&pool, &hash_entry(&c()).unwrap()).await, 0);
}

#[tokio::test]
async fn test_one_failed_deactivation_does_not_block_the_rest() {
    let (service, source, pool) = setup().await;
    source.set(monday(), vec![a(), b(), c()]);
    service.sync_daily("t", monday()).await.unwrap();

    sqlx::query(
        "CREATE TRIGGER keep_cs4002 BEFORE UPDATE OF is_active ON routines \
         WHEN NEW.is_active = 0 AND (SELECT module_code FROM modules WHERE id = OLD.module_id) = 'CS4002NI' \
         BEGIN SELECT RAISE(ABORT, 'deactivation rejected'); END",
    )
    .execute(&pool)
    .await
    .unwrap();
    source.set(monday(), vec![]);

    let result = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(result.removed, 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("deactivation rejected"));
    assert!(result.success);
    assert_eq!(repository::count_active_routines(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_deactivate_all_keeps_rows() {
    let (service, source, pool) = setup().await;
    source.set(monday(), vec![a(), b()]);
    service.sync_daily("t", monday()).await.unwrap();

    assert_eq!(service.deactivate_all().await.unwrap(), 2);
    assert_eq!(repository::count_active_routines(&pool).await.unwrap(), 0);
    assert_eq!(rows_with_hash(&pool, &hash_entry(&a()).unwrap()).await, 1);

    // next sync brings them back as reactivations
    let result = service.sync_daily("t", monday()).await.unwrap();
    assert_eq!(result.reactivated, 2);
    assert_eq!(result.added, 0);
}
