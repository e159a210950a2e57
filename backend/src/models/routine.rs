use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted routine joined with the natural keys of its room, module and teacher.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub id: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub class_type: String,
    pub hash: Option<String>,
    pub is_active: bool,
    pub room_id: String,
    pub room_name: String,
    pub room_block: String,
    pub module_id: String,
    pub module_code: String,
    pub module_name: String,
    pub teacher_id: String,
    pub teacher_name: String,
    /// Filled from `routine_groups` after the row is loaded.
    #[sqlx(skip)]
    pub groups: Vec<String>,
}

/// A group's timetable, one entry per day of the week.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekRoutine {
    pub group_id: String,
    pub group_name: String,
    pub course_name: String,
    pub week: Vec<WeekDay>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekDay {
    pub day: String,
    pub slots: Vec<DaySlot>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DaySlot {
    #[serde(skip)]
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub module_code: String,
    pub module_name: String,
    pub class_type: String,
    pub room: String,
    pub teacher: String,
}
