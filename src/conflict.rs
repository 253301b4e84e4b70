use crate::resource::{ResourceRef, ResourceSchedule, SchedulePeriod};
use crate::time_range::TimeRange;
use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Something to leave out of a conflict scan, typically the entry being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "target", content = "id", rename_all = "snake_case")]
pub enum ExcludeTarget {
    Schedule(i32),
    SchedulePeriod(i32),
    TimetablePeriod(i32),
}

impl ExcludeTarget {
    fn skips_schedule(&self, schedule: &ResourceSchedule) -> bool {
        matches!(self, ExcludeTarget::Schedule(id) if *id == schedule.id)
    }

    fn skips_period(&self, link: &SchedulePeriod) -> bool {
        match self {
            ExcludeTarget::Schedule(_) => false,
            ExcludeTarget::SchedulePeriod(id) => *id == link.id,
            ExcludeTarget::TimetablePeriod(id) => *id == link.period.id,
        }
    }
}

/// An existing scheduled period that collides with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConflict {
    pub resource: ResourceRef,
    pub schedule_id: i32,
    pub period: SchedulePeriod,
}

/// Result of an availability question for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictCheck {
    pub resource: ResourceRef,
    pub term_id: i32,
    pub weekday: Weekday,
    pub range: TimeRange,
    pub available: bool,
    pub conflicts: Vec<ResourceConflict>,
}

impl ConflictCheck {
    pub fn has_conflict(&self) -> bool {
        !self.available
    }
}

/// Scans already-materialised resource schedules for weekday/time collisions.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector<'a> {
    schedules: &'a [ResourceSchedule],
}

impl<'a> ConflictDetector<'a> {
    pub fn new(schedules: &'a [ResourceSchedule]) -> Self {
        Self { schedules }
    }

    fn active_schedules(
        &self,
        resource: ResourceRef,
        term_id: i32,
    ) -> impl Iterator<Item = &'a ResourceSchedule> + use<'a> {
        let schedules = self.schedules;
        schedules.iter().filter(move |schedule| {
            schedule.active && schedule.resource == resource && schedule.term_id == term_id
        })
    }

    pub fn find_conflicts(
        &self,
        resource: ResourceRef,
        term_id: i32,
        weekday: Weekday,
        range: &TimeRange,
        exclude: Option<ExcludeTarget>,
    ) -> Vec<ResourceConflict> {
        let mut conflicts = Vec::new();
        let mut active_count = 0usize;
        for schedule in self.active_schedules(resource, term_id) {
            active_count += 1;
            if exclude.is_some_and(|target| target.skips_schedule(schedule)) {
                continue;
            }
            for link in schedule.active_periods() {
                if exclude.is_some_and(|target| target.skips_period(link)) {
                    continue;
                }
                if link.period.conflicts_with(weekday, range) {
                    conflicts.push(ResourceConflict {
                        resource,
                        schedule_id: schedule.id,
                        period: *link,
                    });
                }
            }
        }
        if active_count > 1 {
            tracing::warn!(
                %resource,
                term_id,
                active_count,
                "more than one active schedule for resource and term"
            );
        }
        conflicts
    }

    pub fn has_conflict(
        &self,
        resource: ResourceRef,
        term_id: i32,
        weekday: Weekday,
        range: &TimeRange,
        exclude: Option<ExcludeTarget>,
    ) -> bool {
        !self
            .find_conflicts(resource, term_id, weekday, range, exclude)
            .is_empty()
    }

    pub fn check(
        &self,
        resource: ResourceRef,
        term_id: i32,
        weekday: Weekday,
        range: TimeRange,
        exclude: Option<ExcludeTarget>,
    ) -> ConflictCheck {
        let conflicts = self.find_conflicts(resource, term_id, weekday, &range, exclude);
        ConflictCheck {
            resource,
            term_id,
            weekday,
            range,
            available: conflicts.is_empty(),
            conflicts,
        }
    }
}

/// Pairs of active periods inside one schedule that overlap each other.
pub fn schedule_overlaps(schedule: &ResourceSchedule) -> Vec<(SchedulePeriod, SchedulePeriod)> {
    let mut periods: Vec<&SchedulePeriod> = schedule.active_periods().collect();
    periods.sort_by_key(|link| {
        (
            link.period.weekday.num_days_from_monday(),
            link.period.start_time,
        )
    });

    let mut overlaps = Vec::new();
    for (idx, first) in periods.iter().enumerate() {
        for second in &periods[idx + 1..] {
            if second.period.weekday != first.period.weekday
                || second.period.start_time >= first.period.end_time
            {
                break;
            }
            overlaps.push((**first, **second));
        }
    }
    overlaps
}
