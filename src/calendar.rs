use crate::time_range::DateRange;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Campus and academic period a calendar question is asked for. `None` means
/// the caller does not restrict on that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campus_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_period_id: Option<i32>,
}

impl Scope {
    pub fn campus(campus_id: i32) -> Self {
        Self {
            campus_id: Some(campus_id),
            academic_period_id: None,
        }
    }

    pub fn with_academic_period(mut self, academic_period_id: i32) -> Self {
        self.academic_period_id = Some(academic_period_id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayCategory {
    National,
    Religious,
    School,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub id: i32,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub category: HolidayCategory,
    #[serde(default)]
    pub affects_all: bool,
    /// Campus ids the holiday applies to when `affects_all` is false.
    #[serde(default)]
    pub scope_ids: Vec<i32>,
}

impl Holiday {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn applies_to(&self, scope: &Scope) -> bool {
        self.affects_all
            || scope
                .campus_id
                .is_some_and(|campus| self.scope_ids.contains(&campus))
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.range().contains(date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Examination,
    Orientation,
    Graduation,
    Registration,
    Deadline,
    Meeting,
    Other,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Examination => "examination",
            EventCategory::Orientation => "orientation",
            EventCategory::Graduation => "graduation",
            EventCategory::Registration => "registration",
            EventCategory::Deadline => "deadline",
            EventCategory::Meeting => "meeting",
            EventCategory::Other => "other",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "examination" => Ok(EventCategory::Examination),
            "orientation" => Ok(EventCategory::Orientation),
            "graduation" => Ok(EventCategory::Graduation),
            "registration" => Ok(EventCategory::Registration),
            "deadline" => Ok(EventCategory::Deadline),
            "meeting" => Ok(EventCategory::Meeting),
            "other" => Ok(EventCategory::Other),
            other => Err(format!("unknown event category '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicCalendarEvent {
    pub id: i32,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub category: EventCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_period_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campus_id: Option<i32>,
}

impl AcademicCalendarEvent {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// An event without a campus or period applies to every campus or period.
    pub fn applies_to(&self, scope: &Scope) -> bool {
        fn axis_matches(event: Option<i32>, requested: Option<i32>) -> bool {
            match (event, requested) {
                (Some(event), Some(requested)) => event == requested,
                _ => true,
            }
        }
        axis_matches(self.academic_period_id, scope.academic_period_id)
            && axis_matches(self.campus_id, scope.campus_id)
    }
}

/// Event categories that remove instructional days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CancellingPolicy(BTreeSet<EventCategory>);

impl Default for CancellingPolicy {
    fn default() -> Self {
        Self::new([
            EventCategory::Examination,
            EventCategory::Orientation,
            EventCategory::Graduation,
        ])
    }
}

impl CancellingPolicy {
    pub fn new(categories: impl IntoIterator<Item = EventCategory>) -> Self {
        Self(categories.into_iter().collect())
    }

    pub fn cancels(&self, category: EventCategory) -> bool {
        self.0.contains(&category)
    }

    pub fn categories(&self) -> impl Iterator<Item = EventCategory> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why a date is not an instructional day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ExclusionReason {
    Holiday { id: i32, name: String },
    Event { id: i32, title: String, category: EventCategory },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Holiday { name, .. } => write!(f, "holiday: {name}"),
            ExclusionReason::Event { title, category, .. } => write!(f, "{category}: {title}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Exclusions {
    pub holidays: Vec<Holiday>,
    pub cancelling_events: Vec<AcademicCalendarEvent>,
}

impl Exclusions {
    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty() && self.cancelling_events.is_empty()
    }
}

/// Holidays and cancelling events that fall inside `range` for `scope`.
///
/// Inputs may be broader than the range or scope; this applies both filters
/// and the cancelling policy itself.
pub fn get_exclusions(
    holidays: &[Holiday],
    events: &[AcademicCalendarEvent],
    policy: &CancellingPolicy,
    range: &DateRange,
    scope: &Scope,
) -> Exclusions {
    let holidays = holidays
        .iter()
        .filter(|holiday| holiday.range().intersects(range) && holiday.applies_to(scope))
        .cloned()
        .collect();
    let cancelling_events = events
        .iter()
        .filter(|event| {
            policy.cancels(event.category)
                && event.range().intersects(range)
                && event.applies_to(scope)
        })
        .cloned()
        .collect();
    Exclusions {
        holidays,
        cancelling_events,
    }
}

/// Answers "is this an instructional day?" for one scope over one range.
#[derive(Debug, Clone)]
pub struct ExclusionResolver {
    range: DateRange,
    scope: Scope,
    exclusions: Exclusions,
}

impl ExclusionResolver {
    pub fn new(
        holidays: &[Holiday],
        events: &[AcademicCalendarEvent],
        policy: &CancellingPolicy,
        range: DateRange,
        scope: Scope,
    ) -> Self {
        let exclusions = get_exclusions(holidays, events, policy, &range, &scope);
        tracing::debug!(
            %range,
            holidays = exclusions.holidays.len(),
            cancelling_events = exclusions.cancelling_events.len(),
            "resolved calendar exclusions"
        );
        Self {
            range,
            scope,
            exclusions,
        }
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    pub fn into_exclusions(self) -> Exclusions {
        self.exclusions
    }

    pub fn is_excluded(&self, date: NaiveDate) -> bool {
        self.exclusions
            .holidays
            .iter()
            .any(|holiday| holiday.covers(date))
            || self
                .exclusions
                .cancelling_events
                .iter()
                .any(|event| event.range().contains(date))
    }

    pub fn reasons_for(&self, date: NaiveDate) -> Vec<ExclusionReason> {
        let holidays = self
            .exclusions
            .holidays
            .iter()
            .filter(|holiday| holiday.covers(date))
            .map(|holiday| ExclusionReason::Holiday {
                id: holiday.id,
                name: holiday.name.clone(),
            });
        let events = self
            .exclusions
            .cancelling_events
            .iter()
            .filter(|event| event.range().contains(date))
            .map(|event| ExclusionReason::Event {
                id: event.id,
                title: event.title.clone(),
                category: event.category,
            });
        holidays.chain(events).collect()
    }

    /// Every excluded date in the resolver's range with the reasons it is excluded.
    pub fn excluded_dates(&self) -> BTreeMap<NaiveDate, Vec<ExclusionReason>> {
        self.range
            .days()
            .filter_map(|date| {
                let reasons = self.reasons_for(date);
                (!reasons.is_empty()).then_some((date, reasons))
            })
            .collect()
    }

    /// Dates in range that fall on one of `weekdays` and are not excluded.
    pub fn instructional_days(&self, weekdays: &[Weekday]) -> Vec<NaiveDate> {
        self.range
            .days()
            .filter(|date| weekdays.contains(&date.weekday()) && !self.is_excluded(*date))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn holiday(id: i32, start: NaiveDate, end: NaiveDate, affects_all: bool, scope_ids: Vec<i32>) -> Holiday {
        Holiday {
            id,
            name: format!("holiday {id}"),
            start_date: start,
            end_date: end,
            category: HolidayCategory::School,
            affects_all,
            scope_ids,
        }
    }

    fn event(id: i32, start: NaiveDate, end: NaiveDate, category: EventCategory) -> AcademicCalendarEvent {
        AcademicCalendarEvent {
            id,
            title: format!("event {id}"),
            start_date: start,
            end_date: end,
            category,
            academic_period_id: None,
            campus_id: None,
        }
    }

    fn january() -> DateRange {
        DateRange::new(d(2024, 1, 1), d(2024, 1, 31)).unwrap()
    }

    #[test]
    fn holiday_excludes_interior_and_both_endpoints_only() {
        let holidays = vec![holiday(1, d(2024, 1, 15), d(2024, 1, 17), true, vec![])];
        let resolver = ExclusionResolver::new(
            &holidays,
            &[],
            &CancellingPolicy::default(),
            january(),
            Scope::campus(1),
        );
        assert!(resolver.is_excluded(d(2024, 1, 15)));
        assert!(resolver.is_excluded(d(2024, 1, 16)));
        assert!(resolver.is_excluded(d(2024, 1, 17)));
        assert!(!resolver.is_excluded(d(2024, 1, 14)));
        assert!(!resolver.is_excluded(d(2024, 1, 18)));
    }

    #[test]
    fn scoped_holiday_only_affects_its_campuses() {
        let holidays = vec![holiday(1, d(2024, 1, 10), d(2024, 1, 10), false, vec![2, 3])];
        let policy = CancellingPolicy::default();
        let own = ExclusionResolver::new(&holidays, &[], &policy, january(), Scope::campus(3));
        let other = ExclusionResolver::new(&holidays, &[], &policy, january(), Scope::campus(1));
        let unscoped = ExclusionResolver::new(&holidays, &[], &policy, january(), Scope::default());
        assert!(own.is_excluded(d(2024, 1, 10)));
        assert!(!other.is_excluded(d(2024, 1, 10)));
        assert!(!unscoped.is_excluded(d(2024, 1, 10)));
    }

    #[test]
    fn informational_events_do_not_remove_days() {
        let events = vec![
            event(1, d(2024, 1, 8), d(2024, 1, 9), EventCategory::Registration),
            event(2, d(2024, 1, 22), d(2024, 1, 26), EventCategory::Examination),
        ];
        let resolver = ExclusionResolver::new(
            &[],
            &events,
            &CancellingPolicy::default(),
            january(),
            Scope::default(),
        );
        assert!(!resolver.is_excluded(d(2024, 1, 8)));
        assert!(resolver.is_excluded(d(2024, 1, 22)));
        assert!(resolver.is_excluded(d(2024, 1, 26)));
        assert_eq!(resolver.exclusions().cancelling_events.len(), 1);
    }

    #[test]
    fn custom_policy_changes_which_events_cancel() {
        let events = vec![event(1, d(2024, 1, 8), d(2024, 1, 9), EventCategory::Registration)];
        let policy = CancellingPolicy::new([EventCategory::Registration]);
        let resolver = ExclusionResolver::new(&[], &events, &policy, january(), Scope::default());
        assert!(resolver.is_excluded(d(2024, 1, 9)));
    }

    #[test]
    fn events_filter_on_period_and_campus() {
        let mut exam = event(1, d(2024, 1, 22), d(2024, 1, 22), EventCategory::Examination);
        exam.academic_period_id = Some(5);
        exam.campus_id = Some(1);
        let events = vec![exam];
        let policy = CancellingPolicy::default();
        let matching = Scope::campus(1).with_academic_period(5);
        let wrong_period = Scope::campus(1).with_academic_period(6);
        assert!(ExclusionResolver::new(&[], &events, &policy, january(), matching).is_excluded(d(2024, 1, 22)));
        assert!(!ExclusionResolver::new(&[], &events, &policy, january(), wrong_period).is_excluded(d(2024, 1, 22)));
        assert!(ExclusionResolver::new(&[], &events, &policy, january(), Scope::default()).is_excluded(d(2024, 1, 22)));
    }

    #[test]
    fn out_of_range_entries_are_dropped() {
        let holidays = vec![holiday(1, d(2023, 12, 24), d(2023, 12, 26), true, vec![])];
        let exclusions = get_exclusions(
            &holidays,
            &[],
            &CancellingPolicy::default(),
            &january(),
            &Scope::default(),
        );
        assert!(exclusions.is_empty());
    }

    #[test]
    fn excluded_dates_lists_reasons_and_instructional_days_skip_them() {
        let holidays = vec![holiday(1, d(2024, 1, 15), d(2024, 1, 16), true, vec![])];
        let events = vec![event(2, d(2024, 1, 16), d(2024, 1, 16), EventCategory::Graduation)];
        let range = DateRange::new(d(2024, 1, 14), d(2024, 1, 17)).unwrap();
        let resolver = ExclusionResolver::new(
            &holidays,
            &events,
            &CancellingPolicy::default(),
            range,
            Scope::default(),
        );
        let excluded = resolver.excluded_dates();
        assert_eq!(excluded.len(), 2);
        assert_eq!(excluded[&d(2024, 1, 16)].len(), 2);
        let days = resolver.instructional_days(&[Weekday::Mon, Weekday::Wed]);
        assert_eq!(days, vec![d(2024, 1, 17)]);
    }
}
