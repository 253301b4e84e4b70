use crate::attendance::AttendancePolicy;
use crate::calendar::CancellingPolicy;
use crate::persistence::{PersistenceError, PersistenceResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Environment variable naming a JSON config file for the binaries.
pub const CONFIG_ENV_VAR: &str = "CAMPUS_CALENDAR_CONFIG";

/// Tunables shared by every engine computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest inclusive window, in days, a single request may cover.
    pub max_range_days: i64,
    /// Academic event categories that remove instructional days.
    pub cancelling_categories: CancellingPolicy,
    /// Percentage below which a student is flagged in attendance reports.
    pub low_attendance_threshold: f64,
    pub late_counts_as_present: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_range_days: 1830,
            cancelling_categories: CancellingPolicy::default(),
            low_attendance_threshold: 75.0,
            late_counts_as_present: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> PersistenceResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> PersistenceResult<Self> {
        let file = File::open(path.as_ref())?;
        let config: EngineConfig = serde_json::from_reader(file)?;
        config.validate()?;
        tracing::info!(path = %path.as_ref().display(), "loaded engine config");
        Ok(config)
    }

    /// Loads from `CAMPUS_CALENDAR_CONFIG` when set, defaults otherwise.
    pub fn from_env() -> PersistenceResult<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_json_file(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> PersistenceResult<()> {
        if self.max_range_days < 1 {
            return Err(PersistenceError::InvalidData(format!(
                "max_range_days must be at least 1 (got {})",
                self.max_range_days
            )));
        }
        if !self.low_attendance_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.low_attendance_threshold)
        {
            return Err(PersistenceError::InvalidData(format!(
                "low_attendance_threshold must be between 0 and 100 (got {})",
                self.low_attendance_threshold
            )));
        }
        if self.cancelling_categories.is_empty() {
            tracing::warn!("no cancelling event categories configured; events never remove days");
        }
        Ok(())
    }

    pub fn attendance_policy(&self) -> AttendancePolicy {
        AttendancePolicy {
            late_counts_as_present: self.late_counts_as_present,
            low_attendance_threshold: self.low_attendance_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::EventCategory;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EngineConfig::from_json_str(r#"{"low_attendance_threshold": 80.0}"#).unwrap();
        assert_eq!(config.max_range_days, 1830);
        assert_eq!(config.low_attendance_threshold, 80.0);
        assert!(config.cancelling_categories.cancels(EventCategory::Examination));
        assert!(!config.late_counts_as_present);
    }

    #[test]
    fn cancelling_categories_replace_the_default_set() {
        let config =
            EngineConfig::from_json_str(r#"{"cancelling_categories": ["registration"]}"#).unwrap();
        assert!(config.cancelling_categories.cancels(EventCategory::Registration));
        assert!(!config.cancelling_categories.cancels(EventCategory::Examination));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(EngineConfig::from_json_str(r#"{"low_attendance_threshold": 120.0}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"max_range_days": 0}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"cancelling_categories": ["party"]}"#).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_range_days": 30, "late_counts_as_present": true}}"#).unwrap();
        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_range_days, 30);
        assert!(config.attendance_policy().late_counts_as_present);
    }
}
