use thiserror::Error;
use tracing::debug;

use crate::external::RoutineEntry;

/// Why an upstream entry was rejected. Reported in logs and sync results only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidReason {
    #[error("entry is null")]
    MissingEntry,
    #[error("missing start/end time")]
    MissingTimes,
    #[error("module data is incomplete")]
    IncompleteModule,
    #[error("teacher is missing")]
    MissingTeacher,
    #[error("room is missing")]
    MissingRoom,
    #[error("no groups")]
    NoGroups,
    #[error("group list contains an unnamed group")]
    UnnamedGroup,
    #[error("missing day or class type")]
    MissingDayOrClassType,
}

fn present(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Checks that `entry` carries everything hashing and persistence need.
pub fn check_routine_validity(entry: Option<&RoutineEntry>) -> Result<(), InvalidReason> {
    let Some(entry) = entry else {
        return Err(InvalidReason::MissingEntry);
    };

    if !present(entry.start_time.as_ref()) || !present(entry.end_time.as_ref()) {
        return Err(InvalidReason::MissingTimes);
    }

    match &entry.module_dto {
        Some(module) if present(module.name.as_ref()) && present(module.code.as_ref()) => {}
        _ => return Err(InvalidReason::IncompleteModule),
    }

    if !entry.teacher_dto.as_ref().is_some_and(|t| present(t.name.as_ref())) {
        return Err(InvalidReason::MissingTeacher);
    }

    if !entry.room_dto.as_ref().is_some_and(|r| present(r.name.as_ref())) {
        return Err(InvalidReason::MissingRoom);
    }

    let groups = match &entry.group_list {
        Some(groups) if !groups.is_empty() => groups,
        _ => return Err(InvalidReason::NoGroups),
    };
    if groups
        .iter()
        .any(|g| !g.as_ref().is_some_and(|g| present(g.name.as_ref())))
    {
        return Err(InvalidReason::UnnamedGroup);
    }

    if !present(entry.day.as_ref()) || !present(entry.class_type.as_ref()) {
        return Err(InvalidReason::MissingDayOrClassType);
    }

    Ok(())
}

pub fn is_valid(entry: Option<&RoutineEntry>) -> bool {
    match check_routine_validity(entry) {
        Ok(()) => true,
        Err(reason) => {
            debug!(
                "Invalid routine entry ({}): {}",
                entry.map(RoutineEntry::display_name).unwrap_or("Unknown"),
                reason
            );
            false
        }
    }
}
