use serde::{Deserialize, Serialize};

/// Body of the routine-of-date response. `list` is optional so a missing
/// list can be reported as a malformed response instead of a parse error.
#[derive(Debug, Deserialize)]
pub struct RoutineListResponse {
    #[serde(default)]
    pub list: Option<Vec<Option<RoutineEntry>>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineListRequest {
    pub teacher_dto: TeacherFilter,
    pub date_of: String,
}

#[derive(Debug, Serialize)]
pub struct TeacherFilter {
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
}

/// One class session as reported upstream. Every field is optional: the
/// upstream system routinely sends nulls and the validator decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutineEntry {
    pub id: Option<i64>,
    pub day: Option<String>,
    #[serde(rename = "startTimeResp")]
    pub start_time: Option<String>,
    #[serde(rename = "endTimeResp")]
    pub end_time: Option<String>,
    pub class_type: Option<String>,
    pub course_dto: Option<CourseDto>,
    pub module_dto: Option<ModuleDto>,
    pub room_dto: Option<RoomDto>,
    pub teacher_dto: Option<TeacherDto>,
    pub group_list: Option<Vec<Option<GroupDto>>>,
}

impl RoutineEntry {
    /// Label used in logs and error messages.
    pub fn display_name(&self) -> &str {
        self.module_dto
            .as_ref()
            .and_then(|m| m.name.as_deref())
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CourseDto {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModuleDto {
    pub name: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RoomDto {
    pub name: Option<String>,
    pub block: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeacherDto {
    pub name: Option<String>,
    pub email: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GroupDto {
    pub name: Option<String>,
}
