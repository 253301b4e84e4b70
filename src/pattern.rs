use crate::error::{EngineError, EngineResult};
use crate::time_range::{DateRange, TimeRange};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recurrence {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Custom,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Daily => "DAILY",
            Recurrence::Weekly => "WEEKLY",
            Recurrence::Biweekly => "BIWEEKLY",
            Recurrence::Monthly => "MONTHLY",
            Recurrence::Custom => "CUSTOM",
        }
    }

    /// Kinds for which an empty weekday set means "any weekday".
    pub fn allows_empty_weekdays(&self) -> bool {
        matches!(self, Recurrence::Daily | Recurrence::Monthly)
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Recurrence::Daily),
            "WEEKLY" => Ok(Recurrence::Weekly),
            "BIWEEKLY" => Ok(Recurrence::Biweekly),
            "MONTHLY" => Ok(Recurrence::Monthly),
            "CUSTOM" => Ok(Recurrence::Custom),
            other => Err(format!("unknown recurrence '{other}'")),
        }
    }
}

/// Optional structured context attached to an exception by whoever recorded it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExceptionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A per-date override of a pattern. With an alternative date the occurrence
/// moves there; without one it is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleException {
    pub id: i32,
    pub pattern_id: i32,
    pub exception_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_start: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_end: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExceptionMetadata>,
}

impl ScheduleException {
    pub fn cancellation(id: i32, pattern_id: i32, exception_date: NaiveDate) -> Self {
        Self {
            id,
            pattern_id,
            exception_date,
            reason: None,
            alternative_date: None,
            alternative_start: None,
            alternative_end: None,
            metadata: None,
        }
    }

    pub fn reschedule(
        id: i32,
        pattern_id: i32,
        exception_date: NaiveDate,
        alternative_date: NaiveDate,
        alternative_start: Option<NaiveTime>,
        alternative_end: Option<NaiveTime>,
    ) -> Self {
        Self {
            alternative_date: Some(alternative_date),
            alternative_start,
            alternative_end,
            ..Self::cancellation(id, pattern_id, exception_date)
        }
    }

    pub fn is_cancellation(&self) -> bool {
        self.alternative_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePattern {
    pub id: i32,
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence: Recurrence,
    /// Week interval for `CUSTOM`; ignored by the other kinds.
    #[serde(default = "default_interval_weeks")]
    pub interval_weeks: u32,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub exceptions: Vec<ScheduleException>,
}

fn default_interval_weeks() -> u32 {
    1
}

/// One concrete dated instance of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescheduled_from: Option<NaiveDate>,
}

impl Occurrence {
    pub fn is_rescheduled(&self) -> bool {
        self.rescheduled_from.is_some()
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

impl SchedulePattern {
    pub fn new(
        id: i32,
        recurrence: Recurrence,
        days_of_week: impl IntoIterator<Item = Weekday>,
        start_time: NaiveTime,
        end_time: NaiveTime,
        start_date: NaiveDate,
    ) -> Self {
        let mut days: Vec<Weekday> = days_of_week.into_iter().collect();
        days.sort_by_key(|wd| wd.num_days_from_monday());
        days.dedup_by(|a, b| a.num_days_from_monday() == b.num_days_from_monday());
        Self {
            id,
            days_of_week: days,
            start_time,
            end_time,
            recurrence,
            interval_weeks: 1,
            start_date,
            end_date: None,
            exceptions: Vec::new(),
        }
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_interval_weeks(mut self, weeks: u32) -> Self {
        self.interval_weeks = weeks;
        self
    }

    pub fn with_exception(mut self, exception: ScheduleException) -> Self {
        self.exceptions.push(exception);
        self
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    /// `[rangeStart, rangeEnd] ∩ [startDate, endDate or +inf)`.
    pub fn window(&self, range: &DateRange) -> Option<DateRange> {
        let bounds = DateRange {
            start: self.start_date,
            end: self.end_date.unwrap_or(range.end),
        };
        range.intersection(&bounds)
    }

    fn week_interval(&self) -> u32 {
        match self.recurrence {
            Recurrence::Biweekly => 2,
            Recurrence::Custom => self.interval_weeks.max(1),
            _ => 1,
        }
    }

    fn matches_weekday(&self, date: NaiveDate) -> bool {
        if self.days_of_week.is_empty() {
            return self.recurrence.allows_empty_weekdays();
        }
        self.days_of_week.contains(&date.weekday())
    }

    /// Whole weeks between the Monday of the start date's week and the Monday of `date`'s week.
    fn week_index(&self, date: NaiveDate) -> i64 {
        (monday_of(date) - monday_of(self.start_date)).num_days().div_euclid(7)
    }

    /// First date at or after `date` that lies in an active week of a multi-week
    /// pattern, or `None` past the last representable date.
    fn align_to_active_week(&self, date: NaiveDate) -> Option<NaiveDate> {
        let interval = i64::from(self.week_interval());
        let offset = self.week_index(date).rem_euclid(interval);
        if offset == 0 {
            Some(date)
        } else {
            monday_of(date).checked_add_signed(Duration::try_weeks(interval - offset)?)
        }
    }

    fn month_offset(&self, date: NaiveDate) -> i64 {
        i64::from(date.year() - self.start_date.year()) * 12 + i64::from(date.month())
            - i64::from(self.start_date.month())
    }

    /// The start date's day of month, `months` later, clamped to the month's last day.
    fn monthly_anchor(&self, months: u32) -> Option<NaiveDate> {
        self.start_date.checked_add_months(Months::new(months))
    }

    /// Whether the recurrence itself (ignoring exceptions) schedules `date`.
    pub fn is_scheduled_on(&self, date: NaiveDate) -> bool {
        if date < self.start_date || self.end_date.is_some_and(|end| date > end) {
            return false;
        }
        if !self.matches_weekday(date) {
            return false;
        }
        match self.recurrence {
            Recurrence::Daily | Recurrence::Weekly => true,
            Recurrence::Biweekly | Recurrence::Custom => {
                self.week_index(date).rem_euclid(i64::from(self.week_interval())) == 0
            }
            Recurrence::Monthly => u32::try_from(self.month_offset(date))
                .ok()
                .and_then(|months| self.monthly_anchor(months))
                == Some(date),
        }
    }

    /// Lazily expands the pattern with its own exceptions over `range`.
    pub fn occurrences(&self, range: DateRange) -> EngineResult<Occurrences<'_>> {
        generate_occurrences(self, &self.exceptions, range)
    }
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date.checked_sub_signed(Duration::days(i64::from(date.weekday().num_days_from_monday())))
        .unwrap_or(NaiveDate::MIN)
}

/// Expands `pattern` over `range`, applying `exceptions` as cancellations or moves.
///
/// An exception that names another pattern, or two exceptions on the same
/// date, indicate corrupted stored data and are reported as
/// [`EngineError::Computation`].
pub fn generate_occurrences<'a>(
    pattern: &'a SchedulePattern,
    exceptions: &'a [ScheduleException],
    range: DateRange,
) -> EngineResult<Occurrences<'a>> {
    let mut by_date: HashMap<NaiveDate, &'a ScheduleException> =
        HashMap::with_capacity(exceptions.len());
    for exception in exceptions {
        if exception.pattern_id != pattern.id {
            return Err(EngineError::computation(format!(
                "exception {} references pattern {} but is attached to pattern {}",
                exception.id, exception.pattern_id, pattern.id
            )));
        }
        if by_date.insert(exception.exception_date, exception).is_some() {
            return Err(EngineError::computation(format!(
                "pattern {} has more than one exception on {}",
                pattern.id, exception.exception_date
            )));
        }
    }
    Ok(Occurrences::new(pattern, by_date, range))
}

/// Ordered, finite, restartable (via `Clone`) occurrence stream.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    pattern: &'a SchedulePattern,
    exceptions: HashMap<NaiveDate, &'a ScheduleException>,
    window_end: NaiveDate,
    cursor: Option<NaiveDate>,
    month_index: u32,
    lookahead: Option<Occurrence>,
    moved: BinaryHeap<Reverse<Occurrence>>,
}

impl<'a> Occurrences<'a> {
    fn new(
        pattern: &'a SchedulePattern,
        exceptions: HashMap<NaiveDate, &'a ScheduleException>,
        range: DateRange,
    ) -> Self {
        let mut occurrences = Self {
            pattern,
            exceptions,
            window_end: range.end,
            cursor: None,
            month_index: 0,
            lookahead: None,
            moved: BinaryHeap::new(),
        };

        let Some(window) = pattern.window(&range) else {
            return occurrences;
        };
        occurrences.window_end = window.end;
        occurrences.cursor = occurrences.first_candidate(window.start);

        for exception in occurrences.exceptions.values() {
            let Some(alternative) = exception.alternative_date else {
                continue;
            };
            if !window.contains(exception.exception_date)
                || !pattern.is_scheduled_on(exception.exception_date)
                || !range.contains(alternative)
            {
                continue;
            }
            occurrences.moved.push(Reverse(Occurrence {
                date: alternative,
                start_time: exception.alternative_start.unwrap_or(pattern.start_time),
                end_time: exception.alternative_end.unwrap_or(pattern.end_time),
                rescheduled_from: Some(exception.exception_date),
            }));
        }
        occurrences
    }

    fn first_candidate(&mut self, from: NaiveDate) -> Option<NaiveDate> {
        match self.pattern.recurrence {
            Recurrence::Daily | Recurrence::Weekly => Some(from),
            Recurrence::Biweekly | Recurrence::Custom => self.pattern.align_to_active_week(from),
            Recurrence::Monthly => {
                let mut months = u32::try_from(self.pattern.month_offset(from)).unwrap_or(0);
                let mut anchor = self.pattern.monthly_anchor(months)?;
                if anchor < from {
                    months += 1;
                    anchor = self.pattern.monthly_anchor(months)?;
                }
                self.month_index = months;
                Some(anchor)
            }
        }
    }

    fn advance(&mut self, date: NaiveDate) -> Option<NaiveDate> {
        match self.pattern.recurrence {
            Recurrence::Daily | Recurrence::Weekly => date.succ_opt(),
            Recurrence::Biweekly | Recurrence::Custom => {
                let next = date.succ_opt()?;
                if next.weekday() == Weekday::Mon {
                    self.pattern.align_to_active_week(next)
                } else {
                    Some(next)
                }
            }
            Recurrence::Monthly => {
                self.month_index = self.month_index.checked_add(1)?;
                self.pattern.monthly_anchor(self.month_index)
            }
        }
    }

    fn next_regular(&mut self) -> Option<Occurrence> {
        loop {
            let date = self.cursor?;
            if date > self.window_end {
                self.cursor = None;
                return None;
            }
            self.cursor = self.advance(date);
            if !self.pattern.matches_weekday(date) || self.exceptions.contains_key(&date) {
                continue;
            }
            return Some(Occurrence {
                date,
                start_time: self.pattern.start_time,
                end_time: self.pattern.end_time,
                rescheduled_from: None,
            });
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        if self.lookahead.is_none() {
            self.lookahead = self.next_regular();
        }
        let take_moved = match (&self.lookahead, self.moved.peek()) {
            (Some(regular), Some(Reverse(moved))) => moved < regular,
            (None, Some(_)) => true,
            _ => false,
        };
        if take_moved {
            self.moved.pop().map(|Reverse(occurrence)| occurrence)
        } else {
            self.lookahead.take()
        }
    }
}
