use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::external::RoutineEntry;
use crate::models::{Course, DaySlot, Module, Room, Routine, StudentGroup, Teacher, WeekDay, WeekRoutine};
use crate::sync::calendar::WEEK_VIEW_DAYS;
use crate::sync::hash::{group_set, normalize_day};

const ROUTINE_SELECT: &str = r#"
    SELECT
        r.id, r.day, r.start_time, r.end_time, r.class_type, r.hash, r.is_active,
        r.room_id, rm.name AS room_name, rm.block AS room_block,
        r.module_id, m.module_code, m.name AS module_name,
        r.teacher_id, t.name AS teacher_name
    FROM routines r
    JOIN rooms rm ON rm.id = r.room_id
    JOIN modules m ON m.id = r.module_id
    JOIN teachers t ON t.id = r.teacher_id
"#;

/// Fields of a routine about to be inserted, taken from a validated upstream entry.
#[derive(Debug, Clone)]
pub struct NewRoutine<'a> {
    pub hash: &'a str,
    pub day: String,
    pub start_time: &'a str,
    pub end_time: &'a str,
    pub class_type: &'a str,
    pub course_name: &'a str,
    pub course_description: &'a str,
    pub module_name: &'a str,
    pub module_code: &'a str,
    pub room_name: &'a str,
    pub room_block: &'a str,
    pub teacher_name: &'a str,
    pub teacher_email: &'a str,
    pub teacher_contact: &'a str,
    pub groups: Vec<&'a str>,
}

impl<'a> NewRoutine<'a> {
    /// `None` when a required field is missing; validated entries always convert.
    /// Stored text is trimmed the same way the content hash trims it.
    pub fn from_entry(entry: &'a RoutineEntry, hash: &'a str) -> Option<Self> {
        let module = entry.module_dto.as_ref()?;
        let room = entry.room_dto.as_ref()?;
        let teacher = entry.teacher_dto.as_ref()?;
        let course = entry.course_dto.as_ref();
        let groups = entry
            .group_list
            .as_ref()?
            .iter()
            .map(|g| g.as_ref().and_then(|g| g.name.as_deref()).map(str::trim))
            .collect::<Option<Vec<&str>>>()?;

        Some(Self {
            hash,
            day: normalize_day(entry.day.as_deref()?),
            start_time: entry.start_time.as_deref()?.trim(),
            end_time: entry.end_time.as_deref()?.trim(),
            class_type: entry.class_type.as_deref()?.trim(),
            course_name: non_blank(course.and_then(|c| c.name.as_deref())).unwrap_or("Unknown Course"),
            course_description: course.and_then(|c| c.description.as_deref()).unwrap_or(""),
            module_name: module.name.as_deref()?.trim(),
            module_code: module.code.as_deref()?.trim(),
            room_name: room.name.as_deref()?.trim(),
            room_block: non_blank(room.block.as_deref()).unwrap_or("Main Block"),
            teacher_name: teacher.name.as_deref()?.trim(),
            teacher_email: teacher.email.as_deref().unwrap_or(""),
            teacher_contact: teacher.contact_number.as_deref().unwrap_or(""),
            groups: group_set(groups),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn attach_groups(db: &SqlitePool, routines: &mut [Routine]) -> Result<(), sqlx::Error> {
    if routines.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT rg.routine_id, g.name FROM routine_groups rg \
         JOIN student_groups g ON g.id = rg.group_id WHERE rg.routine_id IN (",
    );
    let mut ids = builder.separated(", ");
    for routine in routines.iter() {
        ids.push_bind(routine.id.clone());
    }
    ids.push_unseparated(") ORDER BY g.name");

    let rows: Vec<(String, String)> = builder.build_query_as().fetch_all(db).await?;

    let mut by_routine: HashMap<String, Vec<String>> = HashMap::new();
    for (routine_id, group_name) in rows {
        by_routine.entry(routine_id).or_default().push(group_name);
    }
    for routine in routines.iter_mut() {
        routine.groups = by_routine.remove(&routine.id).unwrap_or_default();
    }
    Ok(())
}

pub async fn fetch_active_routines_for_day(db: &SqlitePool, day: &str) -> Result<Vec<Routine>, sqlx::Error> {
    let sql = format!("{} WHERE r.day = ?1 AND r.is_active = 1 ORDER BY r.start_time", ROUTINE_SELECT);
    let mut routines = sqlx::query_as::<_, Routine>(&sql)
        .bind(day)
        .fetch_all(db)
        .await?;
    attach_groups(db, &mut routines).await?;
    Ok(routines)
}

/// Active routines, optionally restricted to one day label.
pub async fn fetch_routines(db: &SqlitePool, day: Option<&str>) -> Result<Vec<Routine>, sqlx::Error> {
    let mut routines = match day {
        Some(day) => {
            let sql = format!("{} WHERE r.is_active = 1 AND r.day = ?1 ORDER BY r.start_time", ROUTINE_SELECT);
            sqlx::query_as::<_, Routine>(&sql).bind(day).fetch_all(db).await?
        }
        None => {
            let sql = format!("{} WHERE r.is_active = 1 ORDER BY r.day, r.start_time", ROUTINE_SELECT);
            sqlx::query_as::<_, Routine>(&sql).fetch_all(db).await?
        }
    };
    attach_groups(db, &mut routines).await?;
    Ok(routines)
}

pub async fn find_routine_by_hash(db: &SqlitePool, hash: &str) -> Result<Option<Routine>, sqlx::Error> {
    let sql = format!("{} WHERE r.hash = ?1", ROUTINE_SELECT);
    let found = sqlx::query_as::<_, Routine>(&sql)
        .bind(hash)
        .fetch_optional(db)
        .await?;

    match found {
        Some(routine) => {
            let mut one = [routine];
            attach_groups(db, &mut one).await?;
            let [routine] = one;
            Ok(Some(routine))
        }
        None => Ok(None),
    }
}

pub async fn count_active_routines(db: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM routines WHERE is_active = 1")
        .fetch_one(db)
        .await
}

pub async fn set_active(db: &SqlitePool, id: &str, active: bool) -> Result<bool, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query("UPDATE routines SET is_active = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(active)
        .bind(now)
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

pub async fn deactivate_all_active(db: &SqlitePool) -> Result<u64, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query("UPDATE routines SET is_active = 0, updated_at = ?1 WHERE is_active = 1")
        .bind(now)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn upsert_course(conn: &mut SqliteConnection, name: &str, description: &str) -> Result<String, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "INSERT INTO courses (id, name, description) VALUES (?1, ?2, ?3) \
         ON CONFLICT(name) DO UPDATE SET name = excluded.name RETURNING id",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(description)
    .fetch_one(conn)
    .await
}

pub async fn upsert_module(conn: &mut SqliteConnection, code: &str, name: &str) -> Result<String, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "INSERT INTO modules (id, name, module_code) VALUES (?1, ?2, ?3) \
         ON CONFLICT(module_code) DO UPDATE SET name = excluded.name RETURNING id",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(code)
    .fetch_one(conn)
    .await
}

pub async fn upsert_room(conn: &mut SqliteConnection, name: &str, block: &str) -> Result<String, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "INSERT INTO rooms (id, name, block) VALUES (?1, ?2, ?3) \
         ON CONFLICT(name) DO UPDATE SET block = excluded.block RETURNING id",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(block)
    .fetch_one(conn)
    .await
}

pub async fn upsert_teacher(
    conn: &mut SqliteConnection,
    name: &str,
    email: &str,
    contact_number: &str,
) -> Result<String, sqlx::Error> {
    // keep known contact details when upstream sends blanks
    sqlx::query_scalar::<_, String>(
        "INSERT INTO teachers (id, name, email, contact_number) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(name) DO UPDATE SET \
            email = CASE WHEN excluded.email = '' THEN teachers.email ELSE excluded.email END, \
            contact_number = CASE WHEN excluded.contact_number = '' THEN teachers.contact_number ELSE excluded.contact_number END \
         RETURNING id",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(email)
    .bind(contact_number)
    .fetch_one(conn)
    .await
}

pub async fn upsert_group(conn: &mut SqliteConnection, name: &str, course_id: &str) -> Result<String, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "INSERT INTO student_groups (id, name, course_id) VALUES (?1, ?2, ?3) \
         ON CONFLICT(name) DO UPDATE SET name = excluded.name RETURNING id",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(course_id)
    .fetch_one(conn)
    .await
}

/// Inserts a routine and its group links in one transaction, upserting the
/// referenced course, module, room, teacher and groups by natural key.
pub async fn create_routine(db: &SqlitePool, new: &NewRoutine<'_>) -> Result<String, sqlx::Error> {
    let mut tx = db.begin().await?;

    let course_id = upsert_course(&mut tx, new.course_name, new.course_description).await?;
    let module_id = upsert_module(&mut tx, new.module_code, new.module_name).await?;
    let room_id = upsert_room(&mut tx, new.room_name, new.room_block).await?;
    let teacher_id = upsert_teacher(&mut tx, new.teacher_name, new.teacher_email, new.teacher_contact).await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO routines
            (id, day, start_time, end_time, class_type, room_id, module_id, teacher_id,
            hash, is_active, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)
        "#,
    )
    .bind(&id)
    .bind(&new.day)
    .bind(new.start_time)
    .bind(new.end_time)
    .bind(new.class_type)
    .bind(&room_id)
    .bind(&module_id)
    .bind(&teacher_id)
    .bind(new.hash)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for group_name in &new.groups {
        let group_id = upsert_group(&mut tx, group_name, &course_id).await?;
        sqlx::query(
            "INSERT INTO routine_groups (id, routine_id, group_id) VALUES (?1, ?2, ?3) \
             ON CONFLICT(routine_id, group_id) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&id)
        .bind(&group_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(id)
}

pub async fn fetch_group_week(db: &SqlitePool, group_id: &str) -> Result<Option<WeekRoutine>, sqlx::Error> {
    let group: Option<(String, String, String)> = sqlx::query_as(
        "SELECT g.id, g.name, c.name FROM student_groups g JOIN courses c ON c.id = g.course_id WHERE g.id = ?1",
    )
    .bind(group_id)
    .fetch_optional(db)
    .await?;

    let Some((group_id, group_name, course_name)) = group else {
        return Ok(None);
    };

    let slots = sqlx::query_as::<_, DaySlot>(
        r#"
        SELECT
            r.day, r.start_time, r.end_time, m.module_code, m.name AS module_name,
            r.class_type, rm.name AS room, t.name AS teacher
        FROM routines r
        JOIN routine_groups rg ON rg.routine_id = r.id
        JOIN modules m ON m.id = r.module_id
        JOIN rooms rm ON rm.id = r.room_id
        JOIN teachers t ON t.id = r.teacher_id
        WHERE rg.group_id = ?1 AND r.is_active = 1
        ORDER BY r.start_time
        "#,
    )
    .bind(&group_id)
    .fetch_all(db)
    .await?;

    let week = WEEK_VIEW_DAYS
        .iter()
        .map(|day| WeekDay {
            day: day.to_string(),
            slots: slots.iter().filter(|s| s.day == *day).cloned().collect(),
        })
        .collect();

    Ok(Some(WeekRoutine {
        group_id,
        group_name,
        course_name,
        week,
    }))
}

pub async fn fetch_courses(db: &SqlitePool) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT id, name, description FROM courses ORDER BY name")
        .fetch_all(db)
        .await
}

pub async fn fetch_rooms(db: &SqlitePool) -> Result<Vec<Room>, sqlx::Error> {
    sqlx::query_as::<_, Room>("SELECT id, name, block FROM rooms ORDER BY name")
        .fetch_all(db)
        .await
}

pub async fn fetch_modules(db: &SqlitePool) -> Result<Vec<Module>, sqlx::Error> {
    sqlx::query_as::<_, Module>("SELECT id, name, module_code, description FROM modules ORDER BY module_code")
        .fetch_all(db)
        .await
}

pub async fn fetch_teachers(db: &SqlitePool) -> Result<Vec<Teacher>, sqlx::Error> {
    sqlx::query_as::<_, Teacher>("SELECT id, name, email, contact_number FROM teachers ORDER BY name")
        .fetch_all(db)
        .await
}

pub async fn fetch_groups(db: &SqlitePool) -> Result<Vec<StudentGroup>, sqlx::Error> {
    sqlx::query_as::<_, StudentGroup>("SELECT id, name, course_id FROM student_groups ORDER BY name")
        .fetch_all(db)
        .await
}
