use crate::time_range::TimeRange;
use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which kind of resource a schedule belongs to. Facility and teacher
/// schedules share one representation and differ only in this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Facility,
    Teacher,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Facility => "facility",
            ResourceKind::Teacher => "teacher",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "facility" => Ok(ResourceKind::Facility),
            "teacher" => Ok(ResourceKind::Teacher),
            other => Err(format!("unknown resource kind '{other}'")),
        }
    }
}

/// Identifies one facility or one teacher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: i32,
}

impl ResourceRef {
    pub fn facility(id: i32) -> Self {
        Self {
            kind: ResourceKind::Facility,
            id,
        }
    }

    pub fn teacher(id: i32) -> Self {
        Self {
            kind: ResourceKind::Teacher,
            id,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// A registered facility or teacher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub id: i32,
    pub name: String,
}

impl Resource {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            kind: self.kind,
            id: self.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: i32,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// One slot of a class timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimetablePeriod {
    pub id: i32,
    pub class_id: i32,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<i32>,
}

impl TimetablePeriod {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    /// Same weekday and overlapping half-open time ranges.
    pub fn conflicts_with(&self, weekday: Weekday, range: &TimeRange) -> bool {
        self.weekday == weekday && self.time_range().overlaps(range)
    }

    /// Resources this period occupies.
    pub fn resources(&self) -> Vec<ResourceRef> {
        let mut resources = Vec::with_capacity(2);
        if let Some(id) = self.facility_id {
            resources.push(ResourceRef::facility(id));
        }
        if let Some(id) = self.teacher_id {
            resources.push(ResourceRef::teacher(id));
        }
        resources
    }
}

/// Links a timetable period into a resource schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchedulePeriod {
    pub id: i32,
    pub schedule_id: i32,
    pub period: TimetablePeriod,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// The recurring commitments of one facility or teacher within one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchedule {
    pub id: i32,
    pub resource: ResourceRef,
    pub term_id: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub periods: Vec<SchedulePeriod>,
}

impl ResourceSchedule {
    pub fn new(id: i32, resource: ResourceRef, term_id: i32) -> Self {
        Self {
            id,
            resource,
            term_id,
            active: true,
            periods: Vec::new(),
        }
    }

    pub fn active_periods(&self) -> impl Iterator<Item = &SchedulePeriod> {
        self.periods.iter().filter(|link| link.active)
    }

    pub fn next_period_id(&self) -> i32 {
        self.periods.iter().map(|p| p.id).max().map_or(1, |max| max + 1)
    }
}

/// A proposed timetable slot being checked before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePeriod {
    pub term_id: i32,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<i32>,
}

impl CandidatePeriod {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub fn resources(&self) -> Vec<ResourceRef> {
        let mut resources = Vec::with_capacity(2);
        if let Some(id) = self.facility_id {
            resources.push(ResourceRef::facility(id));
        }
        if let Some(id) = self.teacher_id {
            resources.push(ResourceRef::teacher(id));
        }
        resources
    }
}
