use crate::calendar::{ExclusionResolver, Scope};
use crate::resource::TimetablePeriod;
use crate::time_range::DateRange;
use chrono::{NaiveDate, Weekday};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
    Leave,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
            AttendanceStatus::Leave => "leave",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "excused" => Ok(AttendanceStatus::Excused),
            "leave" => Ok(AttendanceStatus::Leave),
            other => Err(format!("unknown attendance status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: i32,
    pub class_id: i32,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

/// A class with the scope its calendar is resolved in and its enrolment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSection {
    pub id: i32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campus_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_period_id: Option<i32>,
    #[serde(default)]
    pub student_ids: Vec<i32>,
}

impl ClassSection {
    pub fn scope(&self) -> Scope {
        Scope {
            campus_id: self.campus_id,
            academic_period_id: self.academic_period_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    pub leave: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Excused => self.excused += 1,
            AttendanceStatus::Leave => self.leave += 1,
        }
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        self.present += other.present;
        self.absent += other.absent;
        self.late += other.late;
        self.excused += other.excused;
        self.leave += other.leave;
    }

    pub fn total(&self) -> usize {
        self.present + self.absent + self.late + self.excused + self.leave
    }

    /// Count used as the numerator of attendance percentages.
    pub fn attended(&self, late_counts_as_present: bool) -> usize {
        if late_counts_as_present {
            self.present + self.late
        } else {
            self.present
        }
    }
}

/// How raw counts are turned into percentages and flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttendancePolicy {
    pub late_counts_as_present: bool,
    pub low_attendance_threshold: f64,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            late_counts_as_present: false,
            low_attendance_threshold: 75.0,
        }
    }
}

/// `numerator / denominator * 100`, or 0 when there is nothing to divide by.
pub fn attendance_percentage(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAttendance {
    pub student_id: i32,
    pub counts: StatusCounts,
    pub attendance_percentage: f64,
    pub below_threshold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub class_id: i32,
    pub range: DateRange,
    pub effective_days: usize,
    pub student_count: usize,
    pub students: Vec<StudentAttendance>,
    pub totals: StatusCounts,
    pub average_attendance: f64,
    pub low_attendance_threshold: f64,
}

impl AttendanceReport {
    pub fn student(&self, student_id: i32) -> Option<&StudentAttendance> {
        self.students.iter().find(|s| s.student_id == student_id)
    }

    /// Students whose percentage is strictly below the configured threshold.
    pub fn below_threshold(&self) -> Vec<&StudentAttendance> {
        self.students.iter().filter(|s| s.below_threshold).collect()
    }

    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let students = &self.students;
        let ids: Vec<i32> = students.iter().map(|s| s.student_id).collect();
        let count_column = |name: &'static str, pick: fn(&StatusCounts) -> usize| {
            let values: Vec<i64> = students.iter().map(|s| pick(&s.counts) as i64).collect();
            Series::new(PlSmallStr::from_static(name), values).into_column()
        };
        let percentages: Vec<f64> = students.iter().map(|s| s.attendance_percentage).collect();
        let flags: Vec<bool> = students.iter().map(|s| s.below_threshold).collect();

        DataFrame::new(vec![
            Series::new(PlSmallStr::from_static("student_id"), ids).into_column(),
            count_column("present", |c| c.present),
            count_column("absent", |c| c.absent),
            count_column("late", |c| c.late),
            count_column("excused", |c| c.excused),
            count_column("leave", |c| c.leave),
            Series::new(PlSmallStr::from_static("attendance_pct"), percentages).into_column(),
            Series::new(PlSmallStr::from_static("below_threshold"), flags).into_column(),
        ])
    }
}

/// Weekdays on which a timetable has at least one period, Monday first.
pub fn timetable_weekdays(timetable: &[TimetablePeriod]) -> Vec<Weekday> {
    let mut weekdays: Vec<Weekday> = timetable.iter().map(|p| p.weekday).collect();
    weekdays.sort_by_key(|wd| wd.num_days_from_monday());
    weekdays.dedup();
    weekdays
}

/// Turns a timetable and raw attendance rows into effective days and statistics.
pub struct AttendanceCalculator<'a> {
    resolver: &'a ExclusionResolver,
    policy: AttendancePolicy,
}

impl<'a> AttendanceCalculator<'a> {
    pub fn new(resolver: &'a ExclusionResolver, policy: AttendancePolicy) -> Self {
        Self { resolver, policy }
    }

    /// Ordered dates in the resolver's range on which the timetable meets and
    /// no holiday or cancelling event applies.
    pub fn effective_days(&self, timetable: &[TimetablePeriod]) -> Vec<NaiveDate> {
        let weekdays = timetable_weekdays(timetable);
        self.resolver.instructional_days(&weekdays)
    }

    pub fn report(
        &self,
        class: &ClassSection,
        effective_days: &[NaiveDate],
        records: &[AttendanceRecord],
    ) -> AttendanceReport {
        let days: HashSet<NaiveDate> = effective_days.iter().copied().collect();
        let enrolled: HashSet<i32> = class.student_ids.iter().copied().collect();

        let mut latest: BTreeMap<(i32, NaiveDate), AttendanceStatus> = BTreeMap::new();
        for record in records {
            if record.class_id != class.id
                || !enrolled.contains(&record.student_id)
                || !days.contains(&record.date)
            {
                continue;
            }
            if latest
                .insert((record.student_id, record.date), record.status)
                .is_some()
            {
                tracing::warn!(
                    class_id = class.id,
                    student_id = record.student_id,
                    date = %record.date,
                    "duplicate attendance record; keeping the later row"
                );
            }
        }

        let mut per_student: BTreeMap<i32, StatusCounts> = class
            .student_ids
            .iter()
            .map(|id| (*id, StatusCounts::default()))
            .collect();
        for ((student_id, _), status) in &latest {
            if let Some(counts) = per_student.get_mut(student_id) {
                counts.record(*status);
            }
        }

        let day_count = effective_days.len();
        let threshold = self.policy.low_attendance_threshold;
        let late_counts = self.policy.late_counts_as_present;
        let mut totals = StatusCounts::default();
        let students: Vec<StudentAttendance> = per_student
            .into_iter()
            .map(|(student_id, counts)| {
                totals.merge(&counts);
                let attendance_percentage =
                    attendance_percentage(counts.attended(late_counts), day_count);
                StudentAttendance {
                    student_id,
                    counts,
                    attendance_percentage,
                    below_threshold: attendance_percentage < threshold,
                }
            })
            .collect();

        let student_count = students.len();
        let average_attendance =
            attendance_percentage(totals.attended(late_counts), student_count * day_count);

        tracing::debug!(
            class_id = class.id,
            effective_days = day_count,
            student_count,
            average_attendance,
            "computed attendance report"
        );

        AttendanceReport {
            class_id: class.id,
            range: self.resolver.range(),
            effective_days: day_count,
            student_count,
            students,
            totals,
            average_attendance,
            low_attendance_threshold: threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{CancellingPolicy, Holiday, HolidayCategory};
    use chrono::NaiveTime;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn period(id: i32, weekday: Weekday) -> TimetablePeriod {
        TimetablePeriod {
            id,
            class_id: 1,
            weekday,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            facility_id: None,
            teacher_id: None,
        }
    }

    fn class() -> ClassSection {
        ClassSection {
            id: 1,
            name: "7A".into(),
            campus_id: Some(1),
            academic_period_id: None,
            student_ids: vec![10, 11],
        }
    }

    fn record(student_id: i32, date: NaiveDate, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            student_id,
            class_id: 1,
            date,
            status,
        }
    }

    fn resolver(range: DateRange, holidays: &[Holiday]) -> ExclusionResolver {
        ExclusionResolver::new(holidays, &[], &CancellingPolicy::default(), range, Scope::campus(1))
    }

    #[test]
    fn effective_days_follow_timetable_and_skip_holidays() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 17)).unwrap();
        let holidays = vec![Holiday {
            id: 1,
            name: "Winter break".into(),
            start_date: d(2024, 1, 15),
            end_date: d(2024, 1, 16),
            category: HolidayCategory::School,
            affects_all: true,
            scope_ids: vec![],
        }];
        let resolver = resolver(range, &holidays);
        let calc = AttendanceCalculator::new(&resolver, AttendancePolicy::default());
        let timetable = vec![period(1, Weekday::Mon), period(2, Weekday::Wed), period(3, Weekday::Mon)];
        assert_eq!(
            calc.effective_days(&timetable),
            vec![d(2024, 1, 1), d(2024, 1, 3), d(2024, 1, 8), d(2024, 1, 10), d(2024, 1, 17)]
        );
    }

    #[test]
    fn report_counts_statuses_on_effective_days_only() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 10)).unwrap();
        let resolver = resolver(range, &[]);
        let calc = AttendanceCalculator::new(&resolver, AttendancePolicy::default());
        let days = calc.effective_days(&[period(1, Weekday::Mon), period(2, Weekday::Wed)]);
        assert_eq!(days.len(), 4);

        let records = vec![
            record(10, d(2024, 1, 1), AttendanceStatus::Present),
            record(10, d(2024, 1, 3), AttendanceStatus::Present),
            record(10, d(2024, 1, 8), AttendanceStatus::Late),
            record(10, d(2024, 1, 10), AttendanceStatus::Present),
            // Tuesday is not a class day
            record(10, d(2024, 1, 2), AttendanceStatus::Present),
            record(11, d(2024, 1, 1), AttendanceStatus::Absent),
            record(11, d(2024, 1, 3), AttendanceStatus::Excused),
            // not enrolled
            record(99, d(2024, 1, 3), AttendanceStatus::Present),
        ];
        let report = calc.report(&class(), &days, &records);
        let first = report.student(10).unwrap();
        assert_eq!(first.counts.present, 3);
        assert_eq!(first.counts.late, 1);
        assert_eq!(first.attendance_percentage, 75.0);
        assert!(!first.below_threshold);

        let second = report.student(11).unwrap();
        assert_eq!(second.counts.total(), 2);
        assert_eq!(second.attendance_percentage, 0.0);
        assert!(second.below_threshold);

        assert_eq!(report.totals.present, 3);
        assert_eq!(report.average_attendance, 3.0 / 8.0 * 100.0);
        assert_eq!(report.below_threshold().len(), 1);
    }

    #[test]
    fn late_can_count_as_present() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 3)).unwrap();
        let resolver = resolver(range, &[]);
        let policy = AttendancePolicy {
            late_counts_as_present: true,
            ..AttendancePolicy::default()
        };
        let calc = AttendanceCalculator::new(&resolver, policy);
        let days = calc.effective_days(&[period(1, Weekday::Mon), period(2, Weekday::Wed)]);
        let records = vec![
            record(10, d(2024, 1, 1), AttendanceStatus::Late),
            record(10, d(2024, 1, 3), AttendanceStatus::Present),
        ];
        let report = calc.report(&class(), &days, &records);
        assert_eq!(report.student(10).unwrap().attendance_percentage, 100.0);
    }

    #[test]
    fn no_effective_days_yields_zero_not_nan() {
        let range = DateRange::new(d(2024, 1, 2), d(2024, 1, 2)).unwrap();
        let resolver = resolver(range, &[]);
        let calc = AttendanceCalculator::new(&resolver, AttendancePolicy::default());
        let days = calc.effective_days(&[period(1, Weekday::Mon)]);
        assert!(days.is_empty());
        let report = calc.report(&class(), &days, &[]);
        assert_eq!(report.effective_days, 0);
        for student in &report.students {
            assert_eq!(student.attendance_percentage, 0.0);
        }
        assert_eq!(report.average_attendance, 0.0);
    }

    #[test]
    fn duplicate_rows_count_once() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 1)).unwrap();
        let resolver = resolver(range, &[]);
        let calc = AttendanceCalculator::new(&resolver, AttendancePolicy::default());
        let days = calc.effective_days(&[period(1, Weekday::Mon)]);
        let records = vec![
            record(10, d(2024, 1, 1), AttendanceStatus::Absent),
            record(10, d(2024, 1, 1), AttendanceStatus::Present),
        ];
        let report = calc.report(&class(), &days, &records);
        let student = report.student(10).unwrap();
        assert_eq!(student.counts.total(), 1);
        assert_eq!(student.counts.present, 1);
        assert_eq!(student.attendance_percentage, 100.0);
    }

    #[test]
    fn report_exports_to_dataframe() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 1)).unwrap();
        let resolver = resolver(range, &[]);
        let calc = AttendanceCalculator::new(&resolver, AttendancePolicy::default());
        let days = calc.effective_days(&[period(1, Weekday::Mon)]);
        let report = calc.report(&class(), &days, &[record(11, d(2024, 1, 1), AttendanceStatus::Present)]);
        let df = report.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 8);
        let pct = df.column("attendance_pct").unwrap().f64().unwrap();
        assert_eq!(pct.get(1), Some(100.0));
    }

    #[test]
    fn status_parses_from_str() {
        assert_eq!("Leave".parse::<AttendanceStatus>(), Ok(AttendanceStatus::Leave));
        assert!("sick".parse::<AttendanceStatus>().is_err());
    }
}
