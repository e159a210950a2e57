//! Content hash identifying a scheduled class independently of storage ids.
//!
//! Both sides of a sync (upstream entries and persisted routines) are reduced
//! to the same [`RoutineFingerprint`], serialized as compact JSON with a fixed
//! key order and hashed with SHA-256. Identifying fields are trimmed and group
//! names are sorted and deduplicated, so whitespace, list order and repeated
//! groups never affect the hash.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::external::RoutineEntry;
use crate::models::Routine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineFingerprint<'a> {
    module: &'a str,
    day: String,
    start_time: &'a str,
    end_time: &'a str,
    room: &'a str,
    class_type: &'a str,
    teacher: &'a str,
    groups: Vec<&'a str>,
}

/// Groups form a set: order and repeats never change the hash.
pub fn group_set(mut groups: Vec<&str>) -> Vec<&str> {
    groups.sort_unstable();
    groups.dedup();
    groups
}

/// Upstream day codes are compared case-insensitively.
pub fn normalize_day(day: &str) -> String {
    day.trim().to_lowercase()
}

impl<'a> RoutineFingerprint<'a> {
    /// `None` when any identifying field is absent. Fields are trimmed.
    pub fn from_entry(entry: &'a RoutineEntry) -> Option<Self> {
        let groups = entry
            .group_list
            .as_ref()?
            .iter()
            .map(|g| g.as_ref().and_then(|g| g.name.as_deref()).map(str::trim))
            .collect::<Option<Vec<&str>>>()?;

        Some(Self {
            module: entry.module_dto.as_ref()?.code.as_deref()?.trim(),
            day: normalize_day(entry.day.as_deref()?),
            start_time: entry.start_time.as_deref()?.trim(),
            end_time: entry.end_time.as_deref()?.trim(),
            room: entry.room_dto.as_ref()?.name.as_deref()?.trim(),
            class_type: entry.class_type.as_deref()?.trim(),
            teacher: entry.teacher_dto.as_ref()?.name.as_deref()?.trim(),
            groups: group_set(groups),
        })
    }

    pub fn from_routine(routine: &'a Routine) -> Self {
        Self {
            module: routine.module_code.trim(),
            day: normalize_day(&routine.day),
            start_time: routine.start_time.trim(),
            end_time: routine.end_time.trim(),
            room: routine.room_name.trim(),
            class_type: routine.class_type.trim(),
            teacher: routine.teacher_name.trim(),
            groups: group_set(routine.groups.iter().map(|g| g.trim()).collect()),
        }
    }

    /// Lowercase hex SHA-256 of the canonical JSON form.
    pub fn digest(&self) -> Option<String> {
        let canonical = serde_json::to_vec(self).ok()?;
        Some(hex::encode(Sha256::digest(&canonical)))
    }
}

pub fn hash_entry(entry: &RoutineEntry) -> Option<String> {
    RoutineFingerprint::from_entry(entry)?.digest()
}

pub fn hash_routine(routine: &Routine) -> Option<String> {
    RoutineFingerprint::from_routine(routine).digest()
}

/// First eight hex characters, for logs.
pub fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}
