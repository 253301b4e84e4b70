use super::{PersistenceError, PersistenceResult, ScheduleSource};
use crate::attendance::{AttendanceRecord, ClassSection};
use crate::calendar::{AcademicCalendarEvent, Holiday, Scope};
use crate::pattern::SchedulePattern;
use crate::resource::{Resource, ResourceRef, ResourceSchedule, Term, TimetablePeriod};
use crate::time_range::DateRange;
use crate::validation;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Every entity the engine reads, held in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarSnapshot {
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub classes: Vec<ClassSection>,
    #[serde(default)]
    pub timetable: Vec<TimetablePeriod>,
    #[serde(default)]
    pub patterns: Vec<SchedulePattern>,
    #[serde(default)]
    pub holidays: Vec<Holiday>,
    #[serde(default)]
    pub events: Vec<AcademicCalendarEvent>,
    #[serde(default)]
    pub schedules: Vec<ResourceSchedule>,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
}

fn ensure_unique_ids<T>(
    what: &str,
    items: &[T],
    id: impl Fn(&T) -> i32,
) -> PersistenceResult<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        let id = id(item);
        if !seen.insert(id) {
            return Err(PersistenceError::InvalidData(format!("duplicate {what} id {id}")));
        }
    }
    Ok(())
}

impl CalendarSnapshot {
    pub fn validate(&self) -> PersistenceResult<()> {
        ensure_unique_ids("term", &self.terms, |t| t.id)?;
        ensure_unique_ids("class", &self.classes, |c| c.id)?;
        ensure_unique_ids("timetable period", &self.timetable, |p| p.id)?;
        ensure_unique_ids("holiday", &self.holidays, |h| h.id)?;
        ensure_unique_ids("event", &self.events, |e| e.id)?;

        let mut resources = HashSet::with_capacity(self.resources.len());
        for resource in &self.resources {
            if !resources.insert(resource.reference()) {
                return Err(PersistenceError::InvalidData(format!(
                    "duplicate resource {}",
                    resource.reference()
                )));
            }
        }

        for term in &self.terms {
            validation::validate_term(term)?;
        }
        let class_ids: HashSet<i32> = self.classes.iter().map(|c| c.id).collect();
        for period in &self.timetable {
            validation::validate_timetable_period(period)?;
            if !class_ids.contains(&period.class_id) {
                return Err(PersistenceError::InvalidData(format!(
                    "timetable period {} references unknown class {}",
                    period.id, period.class_id
                )));
            }
        }
        validation::validate_patterns(&self.patterns)?;
        for holiday in &self.holidays {
            validation::validate_holiday(holiday)?;
        }
        for event in &self.events {
            validation::validate_event(event)?;
        }
        validation::validate_schedules(&self.schedules)?;
        Ok(())
    }

    /// Replaces the stored schedule with the same id, or appends it.
    pub fn upsert_schedule(&mut self, schedule: ResourceSchedule) {
        match self.schedules.iter_mut().find(|s| s.id == schedule.id) {
            Some(existing) => *existing = schedule,
            None => self.schedules.push(schedule),
        }
    }

    pub fn add_attendance(&mut self, record: AttendanceRecord) {
        self.attendance.push(record);
    }
}

impl ScheduleSource for CalendarSnapshot {
    fn find_schedule_pattern(&self, id: i32) -> PersistenceResult<Option<SchedulePattern>> {
        Ok(self.patterns.iter().find(|p| p.id == id).cloned())
    }

    fn find_holidays(&self, range: &DateRange, scope: &Scope) -> PersistenceResult<Vec<Holiday>> {
        Ok(self
            .holidays
            .iter()
            .filter(|h| h.range().intersects(range) && h.applies_to(scope))
            .cloned()
            .collect())
    }

    fn find_academic_events(
        &self,
        range: &DateRange,
        scope: &Scope,
    ) -> PersistenceResult<Vec<AcademicCalendarEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|e| e.range().intersects(range) && e.applies_to(scope))
            .cloned()
            .collect())
    }

    fn find_resource_schedules(
        &self,
        resource: ResourceRef,
        term_id: i32,
    ) -> PersistenceResult<Vec<ResourceSchedule>> {
        Ok(self
            .schedules
            .iter()
            .filter(|s| s.resource == resource && s.term_id == term_id)
            .cloned()
            .collect())
    }

    fn find_class_timetable(&self, class_id: i32) -> PersistenceResult<Vec<TimetablePeriod>> {
        Ok(self
            .timetable
            .iter()
            .filter(|p| p.class_id == class_id)
            .copied()
            .collect())
    }

    fn find_attendance_records(
        &self,
        class_id: i32,
        range: &DateRange,
    ) -> PersistenceResult<Vec<AttendanceRecord>> {
        Ok(self
            .attendance
            .iter()
            .filter(|r| r.class_id == class_id && range.contains(r.date))
            .copied()
            .collect())
    }

    fn find_class(&self, class_id: i32) -> PersistenceResult<Option<ClassSection>> {
        Ok(self.classes.iter().find(|c| c.id == class_id).cloned())
    }

    fn find_term(&self, term_id: i32) -> PersistenceResult<Option<Term>> {
        Ok(self.terms.iter().find(|t| t.id == term_id).cloned())
    }

    fn resource_exists(&self, resource: ResourceRef) -> PersistenceResult<bool> {
        Ok(self.resources.iter().any(|r| r.reference() == resource))
    }
}
