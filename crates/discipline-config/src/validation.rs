//! Configuration and document validation

use crate::schema::RawConfig;
use chrono::NaiveDate;
use discipline_util::{parse_date, DaysOfWeek, PackageName, TimeOfDay};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Policy '{policy_id}': {message}")]
    PolicyError { policy_id: String, message: String },

    #[error("Group '{group_id}': {message}")]
    GroupError { group_id: String, message: String },

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid weekday number {0} (expected 1 = Sunday .. 7 = Saturday)")]
    InvalidWeekday(i64),

    #[error("Invalid date '{0}' (expected yyyy-MM-dd)")]
    InvalidDate(String),

    #[error("Invalid package name '{0}'")]
    InvalidPackage(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.schedule.interval_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "schedule.interval_seconds must be greater than 0".into(),
        ));
    }

    if let Some(prefix) = &config.executor.command_prefix
        && prefix.first().is_none_or(|p| p.trim().is_empty())
    {
        errors.push(ValidationError::GlobalError(
            "executor.command_prefix must name a program".into(),
        ));
    }

    if config.executor.timeout_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "executor.timeout_seconds must be greater than 0".into(),
        ));
    }

    if let Some(probe) = &config.executor.readiness_probe
        && probe.trim().is_empty()
    {
        errors.push(ValidationError::GlobalError(
            "executor.readiness_probe cannot be empty".into(),
        ));
    }

    let protected = [
        &config.executor.host_package,
        &config.safety.own_package,
        &config.safety.settings_package,
        &config.safety.installer_package,
    ];
    for name in protected.into_iter().flatten().chain(&config.safety.extra_packages) {
        if parse_package(name).is_err() {
            errors.push(ValidationError::InvalidPackage(name.clone()));
        }
    }

    errors
}

/// Parse `HH:mm`
pub fn parse_time(s: &str) -> Result<TimeOfDay, ValidationError> {
    s.parse::<TimeOfDay>()
        .map_err(|e| ValidationError::InvalidTimeFormat {
            value: s.to_string(),
            message: e.reason.to_string(),
        })
}

/// Parse a list of calendar weekday numbers (1 = Sunday .. 7 = Saturday)
pub fn parse_days(days: &[i64]) -> Result<DaysOfWeek, ValidationError> {
    let mut numbers = Vec::with_capacity(days.len());
    for &day in days {
        match u8::try_from(day) {
            Ok(n) if (1..=7).contains(&n) => numbers.push(n),
            _ => return Err(ValidationError::InvalidWeekday(day)),
        }
    }
    DaysOfWeek::from_numbers(numbers).map_err(|n| ValidationError::InvalidWeekday(n.into()))
}

/// Parse `yyyy-MM-dd`
pub fn parse_specific_date(s: &str) -> Result<NaiveDate, ValidationError> {
    parse_date(s.trim()).ok_or_else(|| ValidationError::InvalidDate(s.to_string()))
}

/// Parse and check a package name
pub fn parse_package(s: &str) -> Result<PackageName, ValidationError> {
    let name = PackageName::new(s.trim());
    if name.is_well_formed() {
        Ok(name)
    } else {
        Err(ValidationError::InvalidPackage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawExecutorConfig, RawSafetyConfig, RawScheduleConfig};

    fn raw() -> RawConfig {
        RawConfig {
            config_version: 1,
            daemon: Default::default(),
            schedule: RawScheduleConfig::default(),
            executor: RawExecutorConfig::default(),
            safety: RawSafetyConfig::default(),
        }
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("14:30").unwrap(), TimeOfDay::new(14, 30).unwrap());
        assert_eq!(parse_time("00:00").unwrap(), TimeOfDay::MIDNIGHT);
        assert_eq!(parse_time("23:59").unwrap(), TimeOfDay::new(23, 59).unwrap());

        assert!(parse_time("24:00").is_err());
        assert!(parse_time("12:60").is_err());
        assert!(parse_time("9:00").is_err());
        assert!(parse_time("invalid").is_err());
    }

    #[test]
    fn test_parse_days() {
        let weekdays = parse_days(&[2, 3, 4, 5, 6]).unwrap();
        assert_eq!(weekdays, DaysOfWeek::WEEKDAYS);
        assert_eq!(parse_days(&[1, 7]).unwrap(), DaysOfWeek::WEEKENDS);

        assert_eq!(parse_days(&[0]), Err(ValidationError::InvalidWeekday(0)));
        assert_eq!(parse_days(&[8]), Err(ValidationError::InvalidWeekday(8)));
        assert_eq!(parse_days(&[-1]), Err(ValidationError::InvalidWeekday(-1)));
        assert_eq!(parse_days(&[300]), Err(ValidationError::InvalidWeekday(300)));
    }

    #[test]
    fn test_parse_specific_date() {
        assert!(parse_specific_date("2025-03-01").is_ok());
        assert!(parse_specific_date("2025-02-30").is_err());
        assert!(parse_specific_date("01/03/2025").is_err());
    }

    #[test]
    fn test_parse_package() {
        assert!(parse_package("com.example.game").is_ok());
        assert!(parse_package("com.example.game; reboot").is_err());
        assert!(parse_package("").is_err());
    }

    #[test]
    fn test_config_errors_are_collected() {
        let mut config = raw();
        config.schedule.interval_seconds = Some(0);
        config.executor.command_prefix = Some(vec![]);
        config.safety.extra_packages = vec!["ok.pkg".into(), "bad pkg".into()];

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::InvalidPackage("bad pkg".into())));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&raw()).is_empty());
    }
}
