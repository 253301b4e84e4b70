use super::{CalendarSnapshot, PersistenceError, PersistenceResult};
use crate::attendance::{AttendanceRecord, AttendanceStatus};
use crate::calendar::{Holiday, HolidayCategory};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

pub fn save_snapshot_to_json<P: AsRef<Path>>(
    snapshot: &CalendarSnapshot,
    path: P,
) -> PersistenceResult<()> {
    snapshot.validate()?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, snapshot)?;
    Ok(())
}

pub fn load_snapshot_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<CalendarSnapshot> {
    let file = File::open(path.as_ref())?;
    let snapshot: CalendarSnapshot = serde_json::from_reader(file)?;
    snapshot.validate()?;
    tracing::info!(
        path = %path.as_ref().display(),
        patterns = snapshot.patterns.len(),
        schedules = snapshot.schedules.len(),
        holidays = snapshot.holidays.len(),
        "loaded calendar snapshot"
    );
    Ok(snapshot)
}

#[derive(Default, Serialize, Deserialize)]
struct HolidayCsvRecord {
    id: i32,
    name: String,
    start_date: String,
    end_date: String,
    category: String,
    affects_all: String,
    #[serde(default)]
    scope_ids: String,
}

impl From<&Holiday> for HolidayCsvRecord {
    fn from(holiday: &Holiday) -> Self {
        Self {
            id: holiday.id,
            name: holiday.name.clone(),
            start_date: format_date(holiday.start_date),
            end_date: format_date(holiday.end_date),
            category: holiday_category_str(holiday.category).to_string(),
            affects_all: holiday.affects_all.to_string(),
            scope_ids: join_i32(&holiday.scope_ids),
        }
    }
}

impl HolidayCsvRecord {
    fn into_holiday(self) -> PersistenceResult<Holiday> {
        Ok(Holiday {
            id: self.id,
            start_date: parse_date(&self.start_date)?,
            end_date: parse_date(&self.end_date)?,
            category: parse_holiday_category(&self.category)?,
            affects_all: parse_bool(&self.affects_all)?,
            scope_ids: split_i32(&self.scope_ids)?,
            name: self.name,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct AttendanceCsvRecord {
    student_id: i32,
    class_id: i32,
    date: String,
    status: String,
}

impl From<&AttendanceRecord> for AttendanceCsvRecord {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            student_id: record.student_id,
            class_id: record.class_id,
            date: format_date(record.date),
            status: record.status.as_str().to_string(),
        }
    }
}

impl AttendanceCsvRecord {
    fn into_record(self) -> PersistenceResult<AttendanceRecord> {
        let status = self
            .status
            .parse::<AttendanceStatus>()
            .map_err(PersistenceError::InvalidData)?;
        Ok(AttendanceRecord {
            student_id: self.student_id,
            class_id: self.class_id,
            date: parse_date(&self.date)?,
            status,
        })
    }
}

pub fn save_holidays_to_csv<P: AsRef<Path>>(holidays: &[Holiday], path: P) -> PersistenceResult<()> {
    for holiday in holidays {
        crate::validation::validate_holiday(holiday)?;
    }
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for holiday in holidays {
        writer.serialize(HolidayCsvRecord::from(holiday))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_holidays_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<Vec<Holiday>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut holidays = Vec::new();
    for record in reader.deserialize::<HolidayCsvRecord>() {
        let holiday = record?.into_holiday()?;
        crate::validation::validate_holiday(&holiday)?;
        holidays.push(holiday);
    }
    Ok(holidays)
}

pub fn save_attendance_to_csv<P: AsRef<Path>>(
    records: &[AttendanceRecord],
    path: P,
) -> PersistenceResult<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for record in records {
        writer.serialize(AttendanceCsvRecord::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_attendance_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<Vec<AttendanceRecord>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut records = Vec::new();
    for record in reader.deserialize::<AttendanceCsvRecord>() {
        records.push(record?.into_record()?);
    }
    Ok(records)
}

fn holiday_category_str(category: HolidayCategory) -> &'static str {
    match category {
        HolidayCategory::National => "national",
        HolidayCategory::Religious => "religious",
        HolidayCategory::School => "school",
        HolidayCategory::Other => "other",
    }
}

fn parse_holiday_category(input: &str) -> PersistenceResult<HolidayCategory> {
    match input.trim().to_ascii_lowercase().as_str() {
        "national" => Ok(HolidayCategory::National),
        "religious" => Ok(HolidayCategory::Religious),
        "school" => Ok(HolidayCategory::School),
        "other" | "" => Ok(HolidayCategory::Other),
        other => Err(PersistenceError::InvalidData(format!(
            "invalid holiday category '{other}'"
        ))),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(input: &str) -> PersistenceResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| PersistenceError::InvalidData(format!("invalid date '{input}': {e}")))
}

fn parse_bool(input: &str) -> PersistenceResult<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        other => Err(PersistenceError::InvalidData(format!(
            "invalid boolean '{other}'"
        ))),
    }
}

fn join_i32(values: &[i32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

fn split_i32(input: &str) -> PersistenceResult<Vec<i32>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    input
        .split(';')
        .map(|part| {
            part.trim().parse::<i32>().map_err(|e| {
                PersistenceError::InvalidData(format!("invalid integer '{part}': {e}"))
            })
        })
        .collect()
}
