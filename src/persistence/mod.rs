use crate::attendance::{AttendanceRecord, ClassSection};
use crate::calendar::{AcademicCalendarEvent, Holiday, Scope};
use crate::pattern::SchedulePattern;
use crate::resource::{ResourceRef, ResourceSchedule, Term, TimetablePeriod};
use crate::time_range::DateRange;
use crate::validation::ValidationError;
use polars::prelude::PolarsError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("dataframe conversion error: {0}")]
    DataFrame(#[from] PolarsError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<ValidationError> for PersistenceError {
    fn from(value: ValidationError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Read access to the stored entities the engine computes over.
///
/// Range and scope arguments are hints: implementations may return a superset
/// and the engine filters again.
pub trait ScheduleSource {
    fn find_schedule_pattern(&self, id: i32) -> PersistenceResult<Option<SchedulePattern>>;
    fn find_holidays(&self, range: &DateRange, scope: &Scope) -> PersistenceResult<Vec<Holiday>>;
    fn find_academic_events(
        &self,
        range: &DateRange,
        scope: &Scope,
    ) -> PersistenceResult<Vec<AcademicCalendarEvent>>;
    fn find_resource_schedules(
        &self,
        resource: ResourceRef,
        term_id: i32,
    ) -> PersistenceResult<Vec<ResourceSchedule>>;
    fn find_class_timetable(&self, class_id: i32) -> PersistenceResult<Vec<TimetablePeriod>>;
    fn find_attendance_records(
        &self,
        class_id: i32,
        range: &DateRange,
    ) -> PersistenceResult<Vec<AttendanceRecord>>;
    fn find_class(&self, class_id: i32) -> PersistenceResult<Option<ClassSection>>;
    fn find_term(&self, term_id: i32) -> PersistenceResult<Option<Term>>;
    fn resource_exists(&self, resource: ResourceRef) -> PersistenceResult<bool>;
}

impl<S: ScheduleSource + ?Sized> ScheduleSource for &S {
    fn find_schedule_pattern(&self, id: i32) -> PersistenceResult<Option<SchedulePattern>> {
        (**self).find_schedule_pattern(id)
    }

    fn find_holidays(&self, range: &DateRange, scope: &Scope) -> PersistenceResult<Vec<Holiday>> {
        (**self).find_holidays(range, scope)
    }

    fn find_academic_events(
        &self,
        range: &DateRange,
        scope: &Scope,
    ) -> PersistenceResult<Vec<AcademicCalendarEvent>> {
        (**self).find_academic_events(range, scope)
    }

    fn find_resource_schedules(
        &self,
        resource: ResourceRef,
        term_id: i32,
    ) -> PersistenceResult<Vec<ResourceSchedule>> {
        (**self).find_resource_schedules(resource, term_id)
    }

    fn find_class_timetable(&self, class_id: i32) -> PersistenceResult<Vec<TimetablePeriod>> {
        (**self).find_class_timetable(class_id)
    }

    fn find_attendance_records(
        &self,
        class_id: i32,
        range: &DateRange,
    ) -> PersistenceResult<Vec<AttendanceRecord>> {
        (**self).find_attendance_records(class_id, range)
    }

    fn find_class(&self, class_id: i32) -> PersistenceResult<Option<ClassSection>> {
        (**self).find_class(class_id)
    }

    fn find_term(&self, term_id: i32) -> PersistenceResult<Option<Term>> {
        (**self).find_term(term_id)
    }

    fn resource_exists(&self, resource: ResourceRef) -> PersistenceResult<bool> {
        (**self).resource_exists(resource)
    }
}

pub mod file;
pub mod snapshot;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{
    load_attendance_from_csv, load_holidays_from_csv, load_snapshot_from_json,
    save_attendance_to_csv, save_holidays_to_csv, save_snapshot_to_json,
};
pub use snapshot::CalendarSnapshot;
