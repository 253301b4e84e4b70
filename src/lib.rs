pub mod attendance;
pub mod calendar;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
#[cfg(feature = "http_api")]
pub mod http_api;
pub mod logging;
pub mod pattern;
pub mod persistence;
pub mod resource;
pub mod time_range;
pub mod validation;

pub use attendance::{
    AttendanceCalculator, AttendancePolicy, AttendanceRecord, AttendanceReport, AttendanceStatus,
    ClassSection, StatusCounts, StudentAttendance,
};
pub use calendar::{
    AcademicCalendarEvent, CancellingPolicy, EventCategory, ExclusionReason, ExclusionResolver,
    Exclusions, Holiday, HolidayCategory, Scope, get_exclusions,
};
pub use config::EngineConfig;
pub use conflict::{ConflictCheck, ConflictDetector, ExcludeTarget, ResourceConflict, schedule_overlaps};
pub use engine::{AvailabilityRequest, SchedulingEngine};
pub use error::{EngineError, EngineResult, StateViolation};
pub use pattern::{
    ExceptionMetadata, Occurrence, Occurrences, Recurrence, ScheduleException, SchedulePattern,
    generate_occurrences,
};
#[cfg(feature = "sqlite")]
pub use persistence::sqlite::SqliteScheduleStore;
pub use persistence::{
    CalendarSnapshot, PersistenceError, PersistenceResult, ScheduleSource, load_attendance_from_csv,
    load_holidays_from_csv, load_snapshot_from_json, save_attendance_to_csv, save_holidays_to_csv,
    save_snapshot_to_json,
};
pub use resource::{
    CandidatePeriod, Resource, ResourceKind, ResourceRef, ResourceSchedule, SchedulePeriod, Term,
    TimetablePeriod,
};
pub use time_range::{DateRange, TimeRange};
pub use validation::ValidationError;
