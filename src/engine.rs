use crate::attendance::{AttendanceCalculator, AttendanceReport, ClassSection};
use crate::calendar::{ExclusionReason, ExclusionResolver, Exclusions, Scope};
use crate::config::EngineConfig;
use crate::conflict::{
    ConflictCheck, ConflictDetector, ExcludeTarget, ResourceConflict, schedule_overlaps,
};
use crate::error::{EngineError, EngineResult, StateViolation};
use crate::pattern::Occurrence;
use crate::persistence::{CalendarSnapshot, ScheduleSource};
use crate::resource::{CandidatePeriod, ResourceRef, ResourceSchedule, SchedulePeriod, TimetablePeriod};
use crate::time_range::{DateRange, TimeRange};
use crate::validation;
use chrono::{NaiveDate, NaiveTime, Weekday};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

/// One availability question, for batch checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub resource: ResourceRef,
    pub term_id: i32,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<ExcludeTarget>,
}

/// The computations exposed to request layers, over any [`ScheduleSource`].
///
/// Every call reads what it needs from the source, validates the request at
/// the boundary (range order and size cap, referenced entities exist) and
/// returns a value. Nothing is cached between calls.
pub struct SchedulingEngine<S> {
    source: S,
    config: EngineConfig,
}

impl<S: ScheduleSource> SchedulingEngine<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, EngineConfig::default())
    }

    pub fn with_config(source: S, config: EngineConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Orders-and-caps a requested window.
    pub fn checked_range(&self, start: NaiveDate, end: NaiveDate) -> EngineResult<DateRange> {
        let range = DateRange::new(start, end)?;
        let days = range.len_days();
        if days > self.config.max_range_days {
            return Err(EngineError::RangeTooLarge {
                days,
                max_days: self.config.max_range_days,
            });
        }
        Ok(range)
    }

    fn checked_times(start: NaiveTime, end: NaiveTime) -> EngineResult<TimeRange> {
        let range = TimeRange::new(start, end);
        if !range.is_valid() {
            return Err(EngineError::InvalidInput(format!(
                "start time {} must precede end time {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(range)
    }

    fn ensure_term(&self, term_id: i32) -> EngineResult<()> {
        match self.source.find_term(term_id)? {
            Some(_) => Ok(()),
            None => Err(EngineError::not_found("term", term_id)),
        }
    }

    fn ensure_resource(&self, resource: ResourceRef) -> EngineResult<()> {
        if self.source.resource_exists(resource)? {
            Ok(())
        } else {
            Err(EngineError::not_found(resource.kind.as_str(), resource.id))
        }
    }

    fn load_class(&self, class_id: i32) -> EngineResult<ClassSection> {
        self.source
            .find_class(class_id)?
            .ok_or_else(|| EngineError::not_found("class", class_id))
    }

    fn resolver(&self, range: DateRange, scope: Scope) -> EngineResult<ExclusionResolver> {
        let holidays = self.source.find_holidays(&range, &scope)?;
        let events = self.source.find_academic_events(&range, &scope)?;
        Ok(ExclusionResolver::new(
            &holidays,
            &events,
            &self.config.cancelling_categories,
            range,
            scope,
        ))
    }

    #[instrument(skip(self))]
    pub fn generate_occurrences(
        &self,
        pattern_id: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<Occurrence>> {
        let range = self.checked_range(start, end)?;
        let pattern = self
            .source
            .find_schedule_pattern(pattern_id)?
            .ok_or_else(|| EngineError::not_found("pattern", pattern_id))?;
        validation::validate_pattern(&pattern)
            .map_err(|err| EngineError::computation(err.to_string()))?;

        let occurrences: Vec<Occurrence> = pattern.occurrences(range)?.collect();
        tracing::debug!(count = occurrences.len(), "generated occurrences");
        Ok(occurrences)
    }

    #[instrument(skip(self))]
    pub fn check_resource_availability(
        &self,
        resource: ResourceRef,
        term_id: i32,
        weekday: Weekday,
        start: NaiveTime,
        end: NaiveTime,
        exclude: Option<ExcludeTarget>,
    ) -> EngineResult<ConflictCheck> {
        let range = Self::checked_times(start, end)?;
        self.ensure_resource(resource)?;
        self.ensure_term(term_id)?;
        let schedules = self.source.find_resource_schedules(resource, term_id)?;
        let check = ConflictDetector::new(&schedules).check(resource, term_id, weekday, range, exclude);
        tracing::debug!(available = check.available, conflicts = check.conflicts.len());
        Ok(check)
    }

    /// Conflicts for every resource the candidate names.
    #[instrument(skip(self))]
    pub fn check_schedule_conflicts(
        &self,
        candidate: &CandidatePeriod,
        exclude: Option<ExcludeTarget>,
    ) -> EngineResult<Vec<ResourceConflict>> {
        validation::validate_candidate(candidate)
            .map_err(|err| EngineError::InvalidInput(err.to_string()))?;
        self.ensure_term(candidate.term_id)?;
        let range = candidate.time_range();

        let mut conflicts = Vec::new();
        for resource in candidate.resources() {
            self.ensure_resource(resource)?;
            let schedules = self.source.find_resource_schedules(resource, candidate.term_id)?;
            conflicts.extend(ConflictDetector::new(&schedules).find_conflicts(
                resource,
                candidate.term_id,
                candidate.weekday,
                &range,
                exclude,
            ));
        }
        tracing::debug!(conflicts = conflicts.len());
        Ok(conflicts)
    }

    /// Checks a schedule before it is written: its resource and term exist,
    /// its links are well formed and, when active, no two of them overlap.
    #[instrument(skip(self, schedule), fields(schedule_id = schedule.id))]
    pub fn validate_schedule(&self, schedule: &ResourceSchedule) -> EngineResult<()> {
        self.ensure_resource(schedule.resource)?;
        self.ensure_term(schedule.term_id)?;
        if schedule.active {
            if let Some((first, second)) = schedule_overlaps(schedule).into_iter().next() {
                return Err(EngineError::InvalidState(StateViolation::OverlappingPeriods {
                    first,
                    second,
                }));
            }
        }
        validation::validate_schedule(schedule)
            .map_err(|err| EngineError::InvalidInput(err.to_string()))
    }

    /// Returns `schedule` with `period` linked into it, or the conflicts that
    /// prevent it. Re-adding a timetable period already in the schedule
    /// checks it against everything but itself.
    #[instrument(skip(self, schedule), fields(schedule_id = schedule.id))]
    pub fn add_period_checked(
        &self,
        schedule: &ResourceSchedule,
        period: TimetablePeriod,
    ) -> EngineResult<ResourceSchedule> {
        self.validate_schedule(schedule)?;
        validation::validate_timetable_period(&period)
            .map_err(|err| EngineError::InvalidInput(err.to_string()))?;
        if !period.resources().contains(&schedule.resource) {
            return Err(EngineError::InvalidInput(format!(
                "timetable period {} is not assigned to {}",
                period.id, schedule.resource
            )));
        }

        let mut schedules = self
            .source
            .find_resource_schedules(schedule.resource, schedule.term_id)?;
        match schedules.iter_mut().find(|s| s.id == schedule.id) {
            Some(stored) => *stored = schedule.clone(),
            None => schedules.push(schedule.clone()),
        }

        let conflicts = ConflictDetector::new(&schedules).find_conflicts(
            schedule.resource,
            schedule.term_id,
            period.weekday,
            &period.time_range(),
            Some(ExcludeTarget::TimetablePeriod(period.id)),
        );
        if !conflicts.is_empty() {
            return Err(EngineError::InvalidState(StateViolation::Conflict { conflicts }));
        }

        let mut updated = schedule.clone();
        updated.periods.retain(|link| link.period.id != period.id);
        updated.periods.push(SchedulePeriod {
            id: schedule.next_period_id(),
            schedule_id: schedule.id,
            period,
            active: true,
        });
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub fn get_exclusions(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        scope: Scope,
    ) -> EngineResult<Exclusions> {
        let range = self.checked_range(start, end)?;
        Ok(self.resolver(range, scope)?.into_exclusions())
    }

    #[instrument(skip(self))]
    pub fn is_excluded_date(&self, date: NaiveDate, scope: Scope) -> EngineResult<bool> {
        Ok(self.resolver(DateRange::single(date), scope)?.is_excluded(date))
    }

    /// Excluded dates in the window with why each one is excluded.
    #[instrument(skip(self))]
    pub fn excluded_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        scope: Scope,
    ) -> EngineResult<BTreeMap<NaiveDate, Vec<ExclusionReason>>> {
        let range = self.checked_range(start, end)?;
        Ok(self.resolver(range, scope)?.excluded_dates())
    }

    #[instrument(skip(self))]
    pub fn compute_effective_days(
        &self,
        class_id: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<NaiveDate>> {
        let range = self.checked_range(start, end)?;
        let class = self.load_class(class_id)?;
        let timetable = self.source.find_class_timetable(class_id)?;
        let resolver = self.resolver(range, class.scope())?;
        let days = AttendanceCalculator::new(&resolver, self.config.attendance_policy())
            .effective_days(&timetable);
        tracing::debug!(effective_days = days.len());
        Ok(days)
    }

    #[instrument(skip(self))]
    pub fn compute_attendance_stats(
        &self,
        class_id: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<AttendanceReport> {
        let range = self.checked_range(start, end)?;
        let class = self.load_class(class_id)?;
        let timetable = self.source.find_class_timetable(class_id)?;
        let records = self.source.find_attendance_records(class_id, &range)?;
        let resolver = self.resolver(range, class.scope())?;
        let calculator = AttendanceCalculator::new(&resolver, self.config.attendance_policy());
        let days = calculator.effective_days(&timetable);
        Ok(calculator.report(&class, &days, &records))
    }

    /// Refuses an attendance write for a date that is not an instructional day
    /// in the class's scope.
    #[instrument(skip(self))]
    pub fn ensure_attendance_markable(&self, class_id: i32, date: NaiveDate) -> EngineResult<()> {
        let class = self.load_class(class_id)?;
        let reasons = self
            .resolver(DateRange::single(date), class.scope())?
            .reasons_for(date);
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidState(StateViolation::ExcludedDate {
                date,
                reasons,
            }))
        }
    }
}

impl SchedulingEngine<CalendarSnapshot> {
    /// Links `period` into stored schedule `schedule_id` and keeps the result.
    #[instrument(skip(self, period), fields(period_id = period.id))]
    pub fn link_period(
        &mut self,
        schedule_id: i32,
        period: TimetablePeriod,
    ) -> EngineResult<ResourceSchedule> {
        let schedule = self
            .source
            .schedules
            .iter()
            .find(|s| s.id == schedule_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("schedule", schedule_id))?;
        let updated = self.add_period_checked(&schedule, period)?;
        self.source.upsert_schedule(updated.clone());
        tracing::info!(schedule_id, periods = updated.periods.len(), "linked period");
        Ok(updated)
    }
}

impl<S: ScheduleSource + Sync> SchedulingEngine<S> {
    /// Independent availability checks run in parallel; results keep input order.
    pub fn check_many_availability(
        &self,
        requests: &[AvailabilityRequest],
    ) -> Vec<EngineResult<ConflictCheck>> {
        requests
            .par_iter()
            .map(|request| {
                self.check_resource_availability(
                    request.resource,
                    request.term_id,
                    request.weekday,
                    request.start_time,
                    request.end_time,
                    request.exclude,
                )
            })
            .collect()
    }

    pub fn compute_attendance_for_classes(
        &self,
        class_ids: &[i32],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<EngineResult<AttendanceReport>> {
        class_ids
            .par_iter()
            .map(|class_id| self.compute_attendance_stats(*class_id, start, end))
            .collect()
    }
}
