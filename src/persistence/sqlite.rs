use super::{CalendarSnapshot, PersistenceError, PersistenceResult, ScheduleSource};
use crate::attendance::{AttendanceRecord, AttendanceStatus, ClassSection};
use crate::calendar::{AcademicCalendarEvent, Holiday, Scope};
use crate::pattern::SchedulePattern;
use crate::resource::{Resource, ResourceRef, ResourceSchedule, Term, TimetablePeriod};
use crate::time_range::DateRange;
use crate::validation;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::de::DeserializeOwned;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed store. Entities are kept as JSON next to the columns the
/// lookups filter on.
pub struct SqliteScheduleStore {
    connection: Mutex<Connection>,
}

impl SqliteScheduleStore {
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> PersistenceResult<Self> {
        let connection = Connection::open(path.as_ref())?;
        Self::initialize_schema(&connection)?;
        tracing::info!(path = %path.as_ref().display(), "opened sqlite schedule store");
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub fn in_memory() -> PersistenceResult<Self> {
        let connection = Connection::open_in_memory()?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS terms (
                id INTEGER PRIMARY KEY,
                term_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS resources (
                kind TEXT NOT NULL,
                id INTEGER NOT NULL,
                resource_json TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );
            CREATE TABLE IF NOT EXISTS classes (
                id INTEGER PRIMARY KEY,
                class_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS timetable_periods (
                id INTEGER PRIMARY KEY,
                class_id INTEGER NOT NULL,
                period_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_timetable_class ON timetable_periods (class_id);
            CREATE TABLE IF NOT EXISTS patterns (
                id INTEGER PRIMARY KEY,
                pattern_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS holidays (
                id INTEGER PRIMARY KEY,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                holiday_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS academic_events (
                id INTEGER PRIMARY KEY,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                campus_id INTEGER,
                academic_period_id INTEGER,
                event_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS resource_schedules (
                id INTEGER PRIMARY KEY,
                resource_kind TEXT NOT NULL,
                resource_id INTEGER NOT NULL,
                term_id INTEGER NOT NULL,
                active INTEGER NOT NULL,
                schedule_json TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_one_active_schedule
                ON resource_schedules (resource_kind, resource_id, term_id)
                WHERE active = 1;
            CREATE TABLE IF NOT EXISTS attendance (
                student_id INTEGER NOT NULL,
                class_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                status TEXT NOT NULL,
                PRIMARY KEY (student_id, class_id, date)
            );
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    fn lock(&self) -> PersistenceResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| PersistenceError::InvalidData("sqlite connection mutex poisoned".into()))
    }

    /// Replaces the whole store with `snapshot` in one transaction.
    pub fn save_snapshot(&self, snapshot: &CalendarSnapshot) -> PersistenceResult<()> {
        snapshot.validate()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for table in [
            "terms",
            "resources",
            "classes",
            "timetable_periods",
            "patterns",
            "holidays",
            "academic_events",
            "resource_schedules",
            "attendance",
        ] {
            tx.execute(&format!("DELETE FROM {table}"), [])?;
        }

        {
            let mut stmt = tx.prepare("INSERT INTO terms (id, term_json) VALUES (?1, ?2)")?;
            for term in &snapshot.terms {
                stmt.execute(params![term.id, serde_json::to_string(term)?])?;
            }
            let mut stmt = tx
                .prepare("INSERT INTO resources (kind, id, resource_json) VALUES (?1, ?2, ?3)")?;
            for resource in &snapshot.resources {
                stmt.execute(params![
                    resource.kind.as_str(),
                    resource.id,
                    serde_json::to_string(resource)?
                ])?;
            }
            let mut stmt = tx.prepare("INSERT INTO classes (id, class_json) VALUES (?1, ?2)")?;
            for class in &snapshot.classes {
                stmt.execute(params![class.id, serde_json::to_string(class)?])?;
            }
            let mut stmt = tx.prepare(
                "INSERT INTO timetable_periods (id, class_id, period_json) VALUES (?1, ?2, ?3)",
            )?;
            for period in &snapshot.timetable {
                stmt.execute(params![period.id, period.class_id, serde_json::to_string(period)?])?;
            }
            let mut stmt =
                tx.prepare("INSERT INTO patterns (id, pattern_json) VALUES (?1, ?2)")?;
            for pattern in &snapshot.patterns {
                stmt.execute(params![pattern.id, serde_json::to_string(pattern)?])?;
            }
            let mut stmt = tx.prepare(
                "INSERT INTO holidays (id, start_date, end_date, holiday_json) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for holiday in &snapshot.holidays {
                stmt.execute(params![
                    holiday.id,
                    format_date(holiday.start_date),
                    format_date(holiday.end_date),
                    serde_json::to_string(holiday)?
                ])?;
            }
            let mut stmt = tx.prepare(
                "INSERT INTO academic_events
                    (id, start_date, end_date, campus_id, academic_period_id, event_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for event in &snapshot.events {
                stmt.execute(params![
                    event.id,
                    format_date(event.start_date),
                    format_date(event.end_date),
                    event.campus_id,
                    event.academic_period_id,
                    serde_json::to_string(event)?
                ])?;
            }
        }

        for schedule in &snapshot.schedules {
            Self::write_schedule(&tx, schedule)?;
        }
        for record in &snapshot.attendance {
            Self::write_attendance(&tx, record)?;
        }
        tx.commit()?;
        tracing::debug!(
            patterns = snapshot.patterns.len(),
            schedules = snapshot.schedules.len(),
            "saved calendar snapshot to sqlite"
        );
        Ok(())
    }

    fn write_schedule(tx: &Transaction, schedule: &ResourceSchedule) -> PersistenceResult<()> {
        tx.execute(
            "INSERT INTO resource_schedules
                (id, resource_kind, resource_id, term_id, active, schedule_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (id) DO UPDATE SET
                resource_kind = excluded.resource_kind,
                resource_id = excluded.resource_id,
                term_id = excluded.term_id,
                active = excluded.active,
                schedule_json = excluded.schedule_json",
            params![
                schedule.id,
                schedule.resource.kind.as_str(),
                schedule.resource.id,
                schedule.term_id,
                schedule.active,
                serde_json::to_string(schedule)?
            ],
        )?;
        Ok(())
    }

    fn write_attendance(tx: &Transaction, record: &AttendanceRecord) -> PersistenceResult<()> {
        tx.execute(
            "INSERT OR REPLACE INTO attendance (student_id, class_id, date, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.student_id,
                record.class_id,
                format_date(record.date),
                record.status.as_str()
            ],
        )?;
        Ok(())
    }

    /// Inserts or replaces one schedule. A second active schedule for the same
    /// resource and term is refused by the store's unique index.
    pub fn save_schedule(&self, schedule: &ResourceSchedule) -> PersistenceResult<()> {
        validation::validate_schedule(schedule)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::write_schedule(&tx, schedule)?;
        tx.commit()?;
        Ok(())
    }

    /// Upserts one attendance row keyed by (student, class, date).
    pub fn record_attendance(&self, record: &AttendanceRecord) -> PersistenceResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::write_attendance(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_snapshot(&self) -> PersistenceResult<CalendarSnapshot> {
        let conn = self.lock()?;
        let attendance = {
            let mut stmt = conn.prepare(
                "SELECT student_id, class_id, date, status FROM attendance
                 ORDER BY class_id, date, student_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            let mut records = Vec::new();
            for row in rows {
                let (student_id, class_id, date, status) = row?;
                records.push(attendance_from_columns(student_id, class_id, &date, &status)?);
            }
            records
        };

        let snapshot = CalendarSnapshot {
            terms: load_json_column(&conn, "SELECT term_json FROM terms ORDER BY id", [])?,
            resources: load_json_column::<Resource, _>(
                &conn,
                "SELECT resource_json FROM resources ORDER BY kind, id",
                [],
            )?,
            classes: load_json_column(&conn, "SELECT class_json FROM classes ORDER BY id", [])?,
            timetable: load_json_column(
                &conn,
                "SELECT period_json FROM timetable_periods ORDER BY id",
                [],
            )?,
            patterns: load_json_column(&conn, "SELECT pattern_json FROM patterns ORDER BY id", [])?,
            holidays: load_json_column(&conn, "SELECT holiday_json FROM holidays ORDER BY id", [])?,
            events: load_json_column(
                &conn,
                "SELECT event_json FROM academic_events ORDER BY id",
                [],
            )?,
            schedules: load_json_column(
                &conn,
                "SELECT schedule_json FROM resource_schedules ORDER BY id",
                [],
            )?,
            attendance,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }
}

fn load_json_column<T: DeserializeOwned, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> PersistenceResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    let mut items = Vec::new();
    for json in rows {
        items.push(serde_json::from_str(&json?)?);
    }
    Ok(items)
}

fn load_json_row<T: DeserializeOwned, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> PersistenceResult<Option<T>> {
    let json: Option<String> = conn
        .query_row(sql, params, |row| row.get(0))
        .optional()?;
    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn attendance_from_columns(
    student_id: i32,
    class_id: i32,
    date: &str,
    status: &str,
) -> PersistenceResult<AttendanceRecord> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| PersistenceError::InvalidData(format!("invalid date '{date}': {e}")))?;
    let status = status
        .parse::<AttendanceStatus>()
        .map_err(PersistenceError::InvalidData)?;
    Ok(AttendanceRecord {
        student_id,
        class_id,
        date,
        status,
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl ScheduleSource for SqliteScheduleStore {
    fn find_schedule_pattern(&self, id: i32) -> PersistenceResult<Option<SchedulePattern>> {
        let conn = self.lock()?;
        load_json_row(&conn, "SELECT pattern_json FROM patterns WHERE id = ?1", params![id])
    }

    fn find_holidays(&self, range: &DateRange, scope: &Scope) -> PersistenceResult<Vec<Holiday>> {
        let conn = self.lock()?;
        let holidays: Vec<Holiday> = load_json_column(
            &conn,
            "SELECT holiday_json FROM holidays
             WHERE start_date <= ?2 AND end_date >= ?1
             ORDER BY start_date, id",
            params![format_date(range.start), format_date(range.end)],
        )?;
        Ok(holidays.into_iter().filter(|h| h.applies_to(scope)).collect())
    }

    fn find_academic_events(
        &self,
        range: &DateRange,
        scope: &Scope,
    ) -> PersistenceResult<Vec<AcademicCalendarEvent>> {
        let conn = self.lock()?;
        load_json_column(
            &conn,
            "SELECT event_json FROM academic_events
             WHERE start_date <= ?2 AND end_date >= ?1
               AND (campus_id IS NULL OR ?3 IS NULL OR campus_id = ?3)
               AND (academic_period_id IS NULL OR ?4 IS NULL OR academic_period_id = ?4)
             ORDER BY start_date, id",
            params![
                format_date(range.start),
                format_date(range.end),
                scope.campus_id,
                scope.academic_period_id
            ],
        )
    }

    fn find_resource_schedules(
        &self,
        resource: ResourceRef,
        term_id: i32,
    ) -> PersistenceResult<Vec<ResourceSchedule>> {
        let conn = self.lock()?;
        load_json_column(
            &conn,
            "SELECT schedule_json FROM resource_schedules
             WHERE resource_kind = ?1 AND resource_id = ?2 AND term_id = ?3
             ORDER BY id",
            params![resource.kind.as_str(), resource.id, term_id],
        )
    }

    fn find_class_timetable(&self, class_id: i32) -> PersistenceResult<Vec<TimetablePeriod>> {
        let conn = self.lock()?;
        load_json_column(
            &conn,
            "SELECT period_json FROM timetable_periods WHERE class_id = ?1 ORDER BY id",
            params![class_id],
        )
    }

    fn find_attendance_records(
        &self,
        class_id: i32,
        range: &DateRange,
    ) -> PersistenceResult<Vec<AttendanceRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT student_id, class_id, date, status FROM attendance
             WHERE class_id = ?1 AND date BETWEEN ?2 AND ?3
             ORDER BY date, student_id",
        )?;
        let rows = stmt.query_map(
            params![class_id, format_date(range.start), format_date(range.end)],
            |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )?;
        let mut records = Vec::new();
        for row in rows {
            let (student_id, class_id, date, status) = row?;
            records.push(attendance_from_columns(student_id, class_id, &date, &status)?);
        }
        Ok(records)
    }

    fn find_class(&self, class_id: i32) -> PersistenceResult<Option<ClassSection>> {
        let conn = self.lock()?;
        load_json_row(&conn, "SELECT class_json FROM classes WHERE id = ?1", params![class_id])
    }

    fn find_term(&self, term_id: i32) -> PersistenceResult<Option<Term>> {
        let conn = self.lock()?;
        load_json_row(&conn, "SELECT term_json FROM terms WHERE id = ?1", params![term_id])
    }

    fn resource_exists(&self, resource: ResourceRef) -> PersistenceResult<bool> {
        let conn = self.lock()?;
        let found: Option<i32> = conn
            .query_row(
                "SELECT 1 FROM resources WHERE kind = ?1 AND id = ?2",
                params![resource.kind.as_str(), resource.id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
