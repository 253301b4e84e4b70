use crate::calendar::{AcademicCalendarEvent, Holiday};
use crate::conflict::schedule_overlaps;
use crate::pattern::SchedulePattern;
use crate::resource::{CandidatePeriod, ResourceRef, ResourceSchedule, Term, TimetablePeriod};
use chrono::NaiveTime;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

fn check_times(what: &str, id: i32, start: NaiveTime, end: NaiveTime) -> Result<(), ValidationError> {
    if start >= end {
        return Err(ValidationError::new(format!(
            "{what} {id} start time {} must precede end time {}",
            start.format("%H:%M"),
            end.format("%H:%M")
        )));
    }
    Ok(())
}

/// Longest `CUSTOM` repeat accepted, in weeks (about five years).
pub const MAX_INTERVAL_WEEKS: u32 = 261;

pub fn validate_pattern(pattern: &SchedulePattern) -> Result<(), ValidationError> {
    check_times("pattern", pattern.id, pattern.start_time, pattern.end_time)?;

    if let Some(end) = pattern.end_date {
        if end < pattern.start_date {
            return Err(ValidationError::new(format!(
                "pattern {} end date {} is before start date {}",
                pattern.id, end, pattern.start_date
            )));
        }
    }

    if pattern.days_of_week.is_empty() && !pattern.recurrence.allows_empty_weekdays() {
        return Err(ValidationError::new(format!(
            "pattern {} recurrence={} requires at least one weekday",
            pattern.id, pattern.recurrence
        )));
    }

    if pattern.interval_weeks == 0 || pattern.interval_weeks > MAX_INTERVAL_WEEKS {
        return Err(ValidationError::new(format!(
            "pattern {} interval_weeks {} must be between 1 and {MAX_INTERVAL_WEEKS}",
            pattern.id, pattern.interval_weeks
        )));
    }

    let mut dates = HashSet::with_capacity(pattern.exceptions.len());
    for exception in &pattern.exceptions {
        if exception.pattern_id != pattern.id {
            return Err(ValidationError::new(format!(
                "exception {} belongs to pattern {} but is attached to pattern {}",
                exception.id, exception.pattern_id, pattern.id
            )));
        }
        if !dates.insert(exception.exception_date) {
            return Err(ValidationError::new(format!(
                "pattern {} has more than one exception on {}",
                pattern.id, exception.exception_date
            )));
        }
        if exception.is_cancellation() {
            if exception.alternative_start.is_some() || exception.alternative_end.is_some() {
                return Err(ValidationError::new(format!(
                    "exception {} has alternative times without an alternative date",
                    exception.id
                )));
            }
        } else {
            let start = exception.alternative_start.unwrap_or(pattern.start_time);
            let end = exception.alternative_end.unwrap_or(pattern.end_time);
            check_times("exception", exception.id, start, end)?;
        }
    }

    Ok(())
}

pub fn validate_patterns(patterns: &[SchedulePattern]) -> Result<(), ValidationError> {
    let mut seen_ids = HashSet::with_capacity(patterns.len());
    let mut exception_ids = HashSet::new();
    for pattern in patterns {
        if !seen_ids.insert(pattern.id) {
            return Err(ValidationError::new(format!("duplicate pattern id {}", pattern.id)));
        }
        for exception in &pattern.exceptions {
            if !exception_ids.insert(exception.id) {
                return Err(ValidationError::new(format!(
                    "duplicate exception id {}",
                    exception.id
                )));
            }
        }
        validate_pattern(pattern)?;
    }
    Ok(())
}

pub fn validate_holiday(holiday: &Holiday) -> Result<(), ValidationError> {
    if holiday.end_date < holiday.start_date {
        return Err(ValidationError::new(format!(
            "holiday {} '{}' ends {} before it starts {}",
            holiday.id, holiday.name, holiday.end_date, holiday.start_date
        )));
    }
    Ok(())
}

pub fn validate_event(event: &AcademicCalendarEvent) -> Result<(), ValidationError> {
    if event.end_date < event.start_date {
        return Err(ValidationError::new(format!(
            "event {} '{}' ends {} before it starts {}",
            event.id, event.title, event.end_date, event.start_date
        )));
    }
    Ok(())
}

pub fn validate_term(term: &Term) -> Result<(), ValidationError> {
    if term.end_date < term.start_date {
        return Err(ValidationError::new(format!(
            "term {} '{}' ends {} before it starts {}",
            term.id, term.name, term.end_date, term.start_date
        )));
    }
    Ok(())
}

pub fn validate_timetable_period(period: &TimetablePeriod) -> Result<(), ValidationError> {
    check_times("timetable period", period.id, period.start_time, period.end_time)
}

pub fn validate_candidate(candidate: &CandidatePeriod) -> Result<(), ValidationError> {
    if candidate.start_time >= candidate.end_time {
        return Err(ValidationError::new(format!(
            "candidate start time {} must precede end time {}",
            candidate.start_time.format("%H:%M"),
            candidate.end_time.format("%H:%M")
        )));
    }
    if candidate.facility_id.is_none() && candidate.teacher_id.is_none() {
        return Err(ValidationError::new(
            "candidate names neither a facility nor a teacher",
        ));
    }
    Ok(())
}

pub fn validate_schedule(schedule: &ResourceSchedule) -> Result<(), ValidationError> {
    let mut link_ids = HashSet::with_capacity(schedule.periods.len());
    for link in &schedule.periods {
        if link.schedule_id != schedule.id {
            return Err(ValidationError::new(format!(
                "schedule period {} references schedule {} but is attached to schedule {}",
                link.id, link.schedule_id, schedule.id
            )));
        }
        if !link_ids.insert(link.id) {
            return Err(ValidationError::new(format!(
                "schedule {} has duplicate period link id {}",
                schedule.id, link.id
            )));
        }
        validate_timetable_period(&link.period)?;
    }

    if schedule.active {
        if let Some((first, second)) = schedule_overlaps(schedule).into_iter().next() {
            return Err(ValidationError::new(format!(
                "schedule {} ({}) has overlapping periods {} and {} on {}",
                schedule.id, schedule.resource, first.id, second.id, first.period.weekday
            )));
        }
    }
    Ok(())
}

/// Per-schedule checks plus "at most one active schedule per (resource, term)".
pub fn validate_schedules(schedules: &[ResourceSchedule]) -> Result<(), ValidationError> {
    let mut seen_ids = HashSet::with_capacity(schedules.len());
    let mut active: HashMap<(ResourceRef, i32), i32> = HashMap::new();
    for schedule in schedules {
        if !seen_ids.insert(schedule.id) {
            return Err(ValidationError::new(format!(
                "duplicate schedule id {}",
                schedule.id
            )));
        }
        validate_schedule(schedule)?;
        if schedule.active {
            if let Some(other) = active.insert((schedule.resource, schedule.term_id), schedule.id) {
                return Err(ValidationError::new(format!(
                    "{} has two active schedules ({} and {}) in term {}",
                    schedule.resource, other, schedule.id, schedule.term_id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::HolidayCategory;
    use crate::pattern::{Recurrence, ScheduleException};
    use crate::resource::SchedulePeriod;
    use chrono::{NaiveDate, Weekday};

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn pattern() -> SchedulePattern {
        SchedulePattern::new(
            1,
            Recurrence::Weekly,
            [Weekday::Mon],
            t(9, 0),
            t(10, 0),
            d(2024, 1, 1),
        )
    }

    fn link(id: i32, weekday: Weekday, start: NaiveTime, end: NaiveTime) -> SchedulePeriod {
        SchedulePeriod {
            id,
            schedule_id: 1,
            period: TimetablePeriod {
                id,
                class_id: 1,
                weekday,
                start_time: start,
                end_time: end,
                facility_id: Some(1),
                teacher_id: None,
            },
            active: true,
        }
    }

    #[test]
    fn rejects_inverted_pattern_times_and_dates() {
        let mut p = pattern();
        p.end_time = t(9, 0);
        assert!(validate_pattern(&p).is_err());

        let p = pattern().with_end_date(d(2023, 12, 31));
        assert!(validate_pattern(&p).is_err());
        assert!(validate_pattern(&pattern().with_end_date(d(2024, 1, 1))).is_ok());
    }

    #[test]
    fn weekly_pattern_needs_weekdays_but_daily_does_not() {
        let mut p = pattern();
        p.days_of_week.clear();
        assert!(validate_pattern(&p).is_err());
        p.recurrence = Recurrence::Daily;
        assert!(validate_pattern(&p).is_ok());
    }

    #[test]
    fn custom_interval_is_bounded() {
        let mut p = pattern();
        p.recurrence = Recurrence::Custom;
        assert!(validate_pattern(&p.clone().with_interval_weeks(0)).is_err());
        assert!(validate_pattern(&p.clone().with_interval_weeks(MAX_INTERVAL_WEEKS)).is_ok());
        let err = validate_pattern(&p.with_interval_weeks(u32::MAX)).unwrap_err();
        assert!(err.to_string().contains("interval_weeks"));
    }

    #[test]
    fn exception_rules() {
        let foreign = pattern().with_exception(ScheduleException::cancellation(1, 2, d(2024, 1, 8)));
        assert!(validate_pattern(&foreign).is_err());

        let duplicate = pattern()
            .with_exception(ScheduleException::cancellation(1, 1, d(2024, 1, 8)))
            .with_exception(ScheduleException::cancellation(2, 1, d(2024, 1, 8)));
        assert!(validate_pattern(&duplicate).is_err());

        let inverted = pattern().with_exception(ScheduleException::reschedule(
            1,
            1,
            d(2024, 1, 8),
            d(2024, 1, 9),
            Some(t(11, 0)),
            None,
        ));
        let err = validate_pattern(&inverted).unwrap_err();
        assert!(err.to_string().contains("exception 1"));

        let mut timed_cancel = ScheduleException::cancellation(1, 1, d(2024, 1, 8));
        timed_cancel.alternative_start = Some(t(10, 0));
        let err = validate_pattern(&pattern().with_exception(timed_cancel)).unwrap_err();
        assert!(err.to_string().contains("without an alternative date"));
    }

    #[test]
    fn duplicate_pattern_ids_are_rejected() {
        assert!(validate_patterns(&[pattern(), pattern()]).is_err());
    }

    #[test]
    fn holiday_interval_must_not_be_inverted() {
        let holiday = Holiday {
            id: 1,
            name: "Break".into(),
            start_date: d(2024, 1, 16),
            end_date: d(2024, 1, 15),
            category: HolidayCategory::School,
            affects_all: true,
            scope_ids: vec![],
        };
        assert!(validate_holiday(&holiday).is_err());
    }

    #[test]
    fn overlapping_periods_in_active_schedule_are_rejected() {
        let mut schedule = ResourceSchedule::new(1, ResourceRef::facility(1), 1);
        schedule.periods = vec![
            link(1, Weekday::Mon, t(9, 0), t(10, 0)),
            link(2, Weekday::Mon, t(10, 0), t(11, 0)),
        ];
        assert!(validate_schedule(&schedule).is_ok());
        schedule.periods.push(link(3, Weekday::Mon, t(10, 30), t(11, 30)));
        assert!(validate_schedule(&schedule).is_err());
        schedule.active = false;
        assert!(validate_schedule(&schedule).is_ok());
    }

    #[test]
    fn one_active_schedule_per_resource_and_term() {
        let first = ResourceSchedule::new(1, ResourceRef::teacher(4), 1);
        let second = ResourceSchedule::new(2, ResourceRef::teacher(4), 1);
        assert!(validate_schedules(&[first.clone(), second.clone()]).is_err());

        let mut retired = second;
        retired.active = false;
        assert!(validate_schedules(&[first, retired]).is_ok());
    }

    #[test]
    fn candidate_needs_a_resource() {
        let candidate = CandidatePeriod {
            term_id: 1,
            weekday: Weekday::Mon,
            start_time: t(9, 0),
            end_time: t(10, 0),
            facility_id: None,
            teacher_id: None,
        };
        assert!(validate_candidate(&candidate).is_err());
    }
}
