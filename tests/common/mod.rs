#![allow(dead_code)]

use campus_calendar::{
    AcademicCalendarEvent, AttendanceRecord, AttendanceStatus, CalendarSnapshot, ClassSection,
    EventCategory, ExceptionMetadata, Holiday, HolidayCategory, Recurrence, Resource, ResourceKind, ResourceRef,
    ResourceSchedule, ScheduleException, SchedulePattern, SchedulePeriod, Term, TimetablePeriod,
};
use chrono::{NaiveDate, NaiveTime, Weekday};

pub fn d(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn period(id: i32, weekday: Weekday, start: NaiveTime, end: NaiveTime) -> TimetablePeriod {
    TimetablePeriod {
        id,
        class_id: 1,
        weekday,
        start_time: start,
        end_time: end,
        facility_id: Some(5),
        teacher_id: Some(9),
    }
}

fn linked(schedule_id: i32, periods: &[TimetablePeriod]) -> Vec<SchedulePeriod> {
    periods
        .iter()
        .enumerate()
        .map(|(idx, p)| SchedulePeriod {
            id: idx as i32 + 1,
            schedule_id,
            period: *p,
            active: true,
        })
        .collect()
}

/// Mon/Wed 09:00-10:00 weekly from 2024-01-01; 01-08 moved to 01-10 09:30-10:30.
pub fn scenario_pattern() -> SchedulePattern {
    SchedulePattern::new(
        1,
        Recurrence::Weekly,
        [Weekday::Mon, Weekday::Wed],
        t(9, 0),
        t(10, 0),
        d(2024, 1, 1),
    )
    .with_exception(ScheduleException::reschedule(
        1,
        1,
        d(2024, 1, 8),
        d(2024, 1, 10),
        Some(t(9, 30)),
        Some(t(10, 30)),
    ))
}

/// Who moved the 01-08 lesson and why, as recorded on the scenario exception.
pub fn annotated_move() -> ExceptionMetadata {
    ExceptionMetadata {
        created_by: Some("registrar".into()),
        note: Some("room 5 closed for inspection".into()),
    }
}

/// Class 7A (campus 1, academic period 3) meeting Mon and Wed in room 5 with
/// teacher 9, plus the calendar around it in January 2024.
pub fn scenario_snapshot() -> CalendarSnapshot {
    let timetable = vec![
        period(1, Weekday::Mon, t(9, 0), t(10, 0)),
        period(2, Weekday::Wed, t(9, 0), t(10, 0)),
    ];
    let mut room = ResourceSchedule::new(1, ResourceRef::facility(5), 1);
    room.periods = linked(1, &timetable);
    let mut teacher = ResourceSchedule::new(2, ResourceRef::teacher(9), 1);
    teacher.periods = linked(2, &timetable);

    let mut attendance = Vec::new();
    for date in [d(2024, 1, 1), d(2024, 1, 3), d(2024, 1, 8), d(2024, 1, 10)] {
        attendance.push(AttendanceRecord {
            student_id: 100,
            class_id: 1,
            date,
            status: AttendanceStatus::Present,
        });
        attendance.push(AttendanceRecord {
            student_id: 101,
            class_id: 1,
            date,
            status: if date == d(2024, 1, 1) {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Absent
            },
        });
    }

    CalendarSnapshot {
        terms: vec![Term {
            id: 1,
            name: "Spring 2024".into(),
            start_date: d(2024, 1, 1),
            end_date: d(2024, 6, 30),
        }],
        resources: vec![
            Resource {
                kind: ResourceKind::Facility,
                id: 5,
                name: "Room 5".into(),
            },
            Resource {
                kind: ResourceKind::Facility,
                id: 6,
                name: "Lab".into(),
            },
            Resource {
                kind: ResourceKind::Teacher,
                id: 9,
                name: "Ms. Ade".into(),
            },
        ],
        classes: vec![ClassSection {
            id: 1,
            name: "7A".into(),
            campus_id: Some(1),
            academic_period_id: Some(3),
            student_ids: vec![100, 101, 102],
        }],
        timetable,
        patterns: vec![scenario_pattern()],
        holidays: vec![
            Holiday {
                id: 1,
                name: "Mid-winter break".into(),
                start_date: d(2024, 1, 15),
                end_date: d(2024, 1, 16),
                category: HolidayCategory::School,
                affects_all: true,
                scope_ids: vec![],
            },
            Holiday {
                id: 2,
                name: "North campus day".into(),
                start_date: d(2024, 1, 22),
                end_date: d(2024, 1, 22),
                category: HolidayCategory::Other,
                affects_all: false,
                scope_ids: vec![2],
            },
        ],
        events: vec![
            AcademicCalendarEvent {
                id: 1,
                title: "Term exams".into(),
                start_date: d(2024, 1, 24),
                end_date: d(2024, 1, 24),
                category: EventCategory::Examination,
                academic_period_id: Some(3),
                campus_id: None,
            },
            AcademicCalendarEvent {
                id: 2,
                title: "Late registration".into(),
                start_date: d(2024, 1, 29),
                end_date: d(2024, 1, 29),
                category: EventCategory::Registration,
                academic_period_id: None,
                campus_id: None,
            },
        ],
        schedules: vec![room, teacher],
        attendance,
    }
}
