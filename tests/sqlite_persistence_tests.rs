#![cfg(feature = "sqlite")]

mod common;

use campus_calendar::{
    AttendanceRecord, AttendanceStatus, DateRange, PersistenceError, ResourceRef,
    ResourceSchedule, SchedulePeriod, ScheduleSource, SchedulingEngine, Scope,
    SqliteScheduleStore,
};
use chrono::Weekday;
use common::{annotated_move, d, period, scenario_snapshot, t};
use tempfile::NamedTempFile;

fn seeded_store() -> SqliteScheduleStore {
    let store = SqliteScheduleStore::in_memory().unwrap();
    store.save_snapshot(&scenario_snapshot()).unwrap();
    store
}

fn friday_schedule(id: i32) -> ResourceSchedule {
    let mut schedule = ResourceSchedule::new(id, ResourceRef::facility(5), 1);
    schedule.periods.push(SchedulePeriod {
        id: 1,
        schedule_id: id,
        period: period(9, Weekday::Fri, t(9, 0), t(10, 0)),
        active: true,
    });
    schedule
}

#[test]
fn sqlite_store_round_trip_snapshot() {
    let file = NamedTempFile::new().unwrap();
    let snapshot = scenario_snapshot();
    {
        let store = SqliteScheduleStore::new(file.path()).unwrap();
        store.save_snapshot(&snapshot).unwrap();
    }

    let reopened = SqliteScheduleStore::new(file.path()).unwrap();
    assert_eq!(reopened.load_snapshot().unwrap(), snapshot);
}

#[test]
fn exception_metadata_survives_sqlite() {
    let store = SqliteScheduleStore::in_memory().unwrap();
    let mut snapshot = scenario_snapshot();
    snapshot.patterns[0].exceptions[0].metadata = Some(annotated_move());
    store.save_snapshot(&snapshot).unwrap();

    let pattern = store.find_schedule_pattern(1).unwrap().unwrap();
    assert_eq!(pattern.exceptions[0].metadata, Some(annotated_move()));
    assert_eq!(store.load_snapshot().unwrap(), snapshot);
}

#[test]
fn saving_a_snapshot_replaces_previous_contents() {
    let store = seeded_store();
    let mut smaller = scenario_snapshot();
    smaller.holidays.truncate(1);
    smaller.attendance.clear();
    store.save_snapshot(&smaller).unwrap();

    let loaded = store.load_snapshot().unwrap();
    assert_eq!(loaded.holidays.len(), 1);
    assert!(loaded.attendance.is_empty());
}

#[test]
fn store_answers_scoped_calendar_queries() {
    let store = seeded_store();
    let late_january = DateRange::new(d(2024, 1, 20), d(2024, 1, 31)).unwrap();

    assert!(store.find_holidays(&late_january, &Scope::campus(1)).unwrap().is_empty());
    let north = store.find_holidays(&late_january, &Scope::campus(2)).unwrap();
    assert_eq!(north.len(), 1);
    assert_eq!(north[0].id, 2);

    let own_period = store
        .find_academic_events(&late_january, &Scope::campus(1).with_academic_period(3))
        .unwrap();
    assert_eq!(own_period.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
    let other_period = store
        .find_academic_events(&late_january, &Scope::campus(1).with_academic_period(4))
        .unwrap();
    assert_eq!(other_period.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2]);

    let first_week = DateRange::new(d(2024, 1, 1), d(2024, 1, 7)).unwrap();
    assert_eq!(store.find_attendance_records(1, &first_week).unwrap().len(), 4);
    assert_eq!(store.find_class_timetable(1).unwrap().len(), 2);
    assert!(store.find_schedule_pattern(1).unwrap().is_some());
    assert!(store.find_term(2).unwrap().is_none());
    assert!(store.resource_exists(ResourceRef::teacher(9)).unwrap());
    assert!(!store.resource_exists(ResourceRef::teacher(5)).unwrap());
}

#[test]
fn engine_over_sqlite_matches_in_memory() {
    let in_memory = SchedulingEngine::new(scenario_snapshot());
    let stored = SchedulingEngine::new(seeded_store());

    let expected = in_memory
        .compute_attendance_stats(1, d(2024, 1, 1), d(2024, 1, 31))
        .unwrap();
    let actual = stored
        .compute_attendance_stats(1, d(2024, 1, 1), d(2024, 1, 31))
        .unwrap();
    assert_eq!(actual, expected);

    let check = stored
        .check_resource_availability(ResourceRef::facility(5), 1, Weekday::Mon, t(9, 30), t(9, 45), None)
        .unwrap();
    assert!(!check.available);
    assert_eq!(
        stored
            .generate_occurrences(1, d(2024, 1, 1), d(2024, 1, 31))
            .unwrap(),
        in_memory
            .generate_occurrences(1, d(2024, 1, 1), d(2024, 1, 31))
            .unwrap()
    );
}

#[test]
fn second_active_schedule_is_refused() {
    let store = seeded_store();
    let err = store.save_schedule(&friday_schedule(3)).unwrap_err();
    assert!(matches!(err, PersistenceError::Sqlite(_)));

    let mut inactive = friday_schedule(3);
    inactive.active = false;
    store.save_schedule(&inactive).unwrap();

    let schedules = store
        .find_resource_schedules(ResourceRef::facility(5), 1)
        .unwrap();
    assert_eq!(schedules.len(), 2);
    assert_eq!(schedules.iter().filter(|s| s.active).count(), 1);
}

#[test]
fn updating_a_schedule_in_place_is_allowed() {
    let store = seeded_store();
    let mut room = store
        .find_resource_schedules(ResourceRef::facility(5), 1)
        .unwrap()
        .remove(0);
    room.periods.retain(|link| link.period.weekday == Weekday::Mon);
    store.save_schedule(&room).unwrap();

    let reloaded = store
        .find_resource_schedules(ResourceRef::facility(5), 1)
        .unwrap();
    assert_eq!(reloaded, vec![room]);
}

#[test]
fn attendance_rows_are_upserted() {
    let store = seeded_store();
    store
        .record_attendance(&AttendanceRecord {
            student_id: 101,
            class_id: 1,
            date: d(2024, 1, 3),
            status: AttendanceStatus::Excused,
        })
        .unwrap();

    let january = DateRange::new(d(2024, 1, 1), d(2024, 1, 31)).unwrap();
    let records = store.find_attendance_records(1, &january).unwrap();
    assert_eq!(records.len(), 8);
    let corrected = records
        .iter()
        .find(|r| r.student_id == 101 && r.date == d(2024, 1, 3))
        .unwrap();
    assert_eq!(corrected.status, AttendanceStatus::Excused);
}
