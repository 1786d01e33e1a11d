//! Validated restriction policies and groups
//!
//! Documents arrive from the store or from clients as loosely-typed
//! [`PolicyDocument`]/[`GroupDocument`] values. Converting them here is the
//! only way to obtain a [`Policy`] or [`Group`], so the evaluator and
//! reconciler never see a malformed time, weekday, date, or package name.

use crate::validation::{
    parse_days, parse_package, parse_specific_date, parse_time, ValidationError,
};
use chrono::NaiveDate;
use discipline_api::{BlockMode, GroupDocument, PolicyDocument, ScheduleType};
use discipline_util::{
    format_date, weekday_name, DailyWindow, DaysOfWeek, GroupId, PackageName, PolicyId,
};
use std::collections::BTreeSet;

/// Which days a policy's window applies on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Every day
    Daily,
    /// Only on these weekdays (never empty)
    Weekly(DaysOfWeek),
    /// Only on these calendar dates; empty means never
    SpecificDates(BTreeSet<NaiveDate>),
}

impl Schedule {
    /// Short human summary, e.g. `"Mon, Tue 09:00~17:00 hidden"`
    pub fn describe(&self, window: &DailyWindow, mode: BlockMode) -> String {
        let days = match self {
            Schedule::Daily => "every day".to_string(),
            Schedule::Weekly(days) if days.len() == 7 => "every day".to_string(),
            Schedule::Weekly(days) => days
                .numbers()
                .into_iter()
                .map(weekday_name)
                .collect::<Vec<_>>()
                .join(", "),
            Schedule::SpecificDates(dates) if dates.len() <= 2 => dates
                .iter()
                .map(|d| format_date(*d))
                .collect::<Vec<_>>()
                .join(", "),
            Schedule::SpecificDates(dates) => match dates.first() {
                Some(first) => format!("{} and {} more", format_date(*first), dates.len() - 1),
                None => String::new(),
            },
        };

        match mode {
            BlockMode::HideDuring => format!("{} {} hidden", days, window),
            BlockMode::ShowDuring => format!("only {} {} available", days, window),
        }
    }

    fn schedule_type(&self) -> ScheduleType {
        match self {
            Schedule::Daily => ScheduleType::Daily,
            Schedule::Weekly(_) => ScheduleType::Weekly,
            Schedule::SpecificDates(_) => ScheduleType::SpecificDates,
        }
    }
}

/// A validated restriction policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub id: PolicyId,
    pub label: String,
    pub targets: BTreeSet<PackageName>,
    pub group_refs: Vec<GroupId>,
    pub schedule: Schedule,
    pub window: DailyWindow,
    pub block_mode: BlockMode,
    pub enabled: bool,
    pub force_mode: bool,
    pub unlock_limit: u32,
    pub used_unlocks: u32,
}

impl Policy {
    /// Validate and convert a document, reporting every problem at once
    pub fn from_document(doc: &PolicyDocument) -> Result<Self, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let policy_err = |message: String| ValidationError::PolicyError {
            policy_id: doc.id.clone(),
            message,
        };

        let id = PolicyId::new(doc.id.trim());
        if id.is_empty() {
            errors.push(policy_err("id cannot be empty".into()));
        }

        let start = parse_time(&doc.start_time).map_err(|e| errors.push(e)).ok();
        let end = parse_time(&doc.end_time).map_err(|e| errors.push(e)).ok();

        let mut targets = BTreeSet::new();
        for raw in &doc.packages {
            match parse_package(raw) {
                Ok(name) => {
                    targets.insert(name);
                }
                Err(e) => errors.push(e),
            }
        }

        let mut group_refs = Vec::with_capacity(doc.group_ids.len());
        for raw in &doc.group_ids {
            let group_id = GroupId::new(raw.trim());
            if group_id.is_empty() {
                errors.push(policy_err("group reference cannot be empty".into()));
            } else if !group_refs.contains(&group_id) {
                group_refs.push(group_id);
            }
        }

        let schedule = match doc.schedule_type {
            ScheduleType::Daily => Some(Schedule::Daily),
            ScheduleType::Weekly => match parse_days(&doc.days_of_week) {
                Ok(days) if days.is_empty() => {
                    errors.push(policy_err("weekly schedule needs at least one day".into()));
                    None
                }
                Ok(days) => Some(Schedule::Weekly(days)),
                Err(e) => {
                    errors.push(e);
                    None
                }
            },
            ScheduleType::SpecificDates => {
                let mut dates = BTreeSet::new();
                for raw in &doc.specific_dates {
                    match parse_specific_date(raw) {
                        Ok(date) => {
                            dates.insert(date);
                        }
                        Err(e) => errors.push(e),
                    }
                }
                Some(Schedule::SpecificDates(dates))
            }
        };

        match (start, end, schedule) {
            (Some(start), Some(end), Some(schedule)) if errors.is_empty() => Ok(Self {
                id,
                label: doc.label.clone(),
                targets,
                group_refs,
                schedule,
                window: DailyWindow::new(start, end),
                block_mode: doc.block_mode,
                enabled: doc.is_enabled,
                force_mode: doc.is_force_mode,
                unlock_limit: doc.unlock_limit,
                used_unlocks: doc.used_unlocks,
            }),
            _ => Err(errors),
        }
    }

    /// Back to the persisted shape
    pub fn to_document(&self) -> PolicyDocument {
        let days_of_week = match &self.schedule {
            Schedule::Weekly(days) => days.numbers().into_iter().map(i64::from).collect(),
            _ => DaysOfWeek::ALL_DAYS.numbers().into_iter().map(i64::from).collect(),
        };
        let specific_dates = match &self.schedule {
            Schedule::SpecificDates(dates) => dates.iter().map(|d| format_date(*d)).collect(),
            _ => Vec::new(),
        };

        PolicyDocument {
            id: self.id.to_string(),
            label: self.label.clone(),
            packages: self.targets.iter().map(|p| p.to_string()).collect(),
            group_ids: self.group_refs.iter().map(|g| g.to_string()).collect(),
            days_of_week,
            start_time: self.window.start.to_string(),
            end_time: self.window.end.to_string(),
            is_enabled: self.enabled,
            is_force_mode: self.force_mode,
            unlock_limit: self.unlock_limit,
            used_unlocks: self.used_unlocks,
            schedule_type: self.schedule.schedule_type(),
            specific_dates,
            block_mode: self.block_mode,
        }
    }

    pub fn remaining_unlocks(&self) -> u32 {
        self.unlock_limit.saturating_sub(self.used_unlocks)
    }

    pub fn describe(&self) -> String {
        self.schedule.describe(&self.window, self.block_mode)
    }
}

/// A validated package group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: BTreeSet<PackageName>,
    pub color: i64,
}

impl Group {
    pub fn from_document(doc: &GroupDocument) -> Result<Self, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let id = GroupId::new(doc.id.trim());
        if id.is_empty() {
            errors.push(ValidationError::GroupError {
                group_id: doc.id.clone(),
                message: "id cannot be empty".into(),
            });
        }

        let mut members = BTreeSet::new();
        for raw in &doc.packages {
            match parse_package(raw) {
                Ok(name) => {
                    members.insert(name);
                }
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            id,
            name: doc.name.clone(),
            members,
            color: doc.color,
        })
    }

    pub fn to_document(&self) -> GroupDocument {
        GroupDocument {
            id: self.id.to_string(),
            name: self.name.clone(),
            packages: self.members.iter().map(|p| p.to_string()).collect(),
            color: self.color,
        }
    }
}

/// Validate a policy document without keeping the result
pub fn validate_policy_document(doc: &PolicyDocument) -> Vec<ValidationError> {
    Policy::from_document(doc).err().unwrap_or_default()
}

/// Validate a group document without keeping the result
pub fn validate_group_document(doc: &GroupDocument) -> Vec<ValidationError> {
    Group::from_document(doc).err().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use discipline_util::TimeOfDay;

    fn doc(id: &str) -> PolicyDocument {
        let mut doc = PolicyDocument::new("Work", "09:00", "17:00");
        doc.id = id.into();
        doc.packages = vec!["com.example.game".into(), "com.example.video".into()];
        doc
    }

    #[test]
    fn converts_valid_document() {
        let policy = Policy::from_document(&doc("p1")).unwrap();
        assert_eq!(policy.id.as_str(), "p1");
        assert_eq!(policy.targets.len(), 2);
        assert_eq!(policy.schedule, Schedule::Weekly(DaysOfWeek::ALL_DAYS));
        assert_eq!(policy.window.start, TimeOfDay::new(9, 0).unwrap());
        assert!(policy.enabled);
        assert_eq!(policy.remaining_unlocks(), 3);
    }

    #[test]
    fn collects_all_errors() {
        let mut bad = doc("p1");
        bad.start_time = "25:00".into();
        bad.end_time = "9am".into();
        bad.days_of_week = vec![0, 3];
        bad.packages.push("rm -rf /".into());

        let errors = Policy::from_document(&bad).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert_eq!(validate_policy_document(&bad).len(), 4);
    }

    #[test]
    fn missing_id_rejected() {
        let errors = validate_policy_document(&doc("  "));
        assert!(matches!(errors[0], ValidationError::PolicyError { .. }));
    }

    #[test]
    fn weekly_requires_a_day() {
        let mut empty = doc("p1");
        empty.days_of_week.clear();
        assert_eq!(validate_policy_document(&empty).len(), 1);

        // Other schedule kinds ignore the weekday list
        empty.schedule_type = ScheduleType::Daily;
        assert!(validate_policy_document(&empty).is_empty());
    }

    #[test]
    fn specific_dates_may_be_empty() {
        let mut d = doc("p1");
        d.schedule_type = ScheduleType::SpecificDates;
        let policy = Policy::from_document(&d).unwrap();
        assert_eq!(policy.schedule, Schedule::SpecificDates(BTreeSet::new()));
    }

    #[test]
    fn document_roundtrip_keeps_fields() {
        let mut d = doc("p1");
        d.group_ids = vec!["g1".into(), "g2".into()];
        d.days_of_week = vec![2, 3, 4, 5, 6];
        d.block_mode = BlockMode::ShowDuring;
        d.is_force_mode = true;
        d.used_unlocks = 5;

        let policy = Policy::from_document(&d).unwrap();
        assert_eq!(policy.remaining_unlocks(), 0);
        assert_eq!(policy.to_document(), d);
    }

    #[test]
    fn duplicate_group_refs_collapse() {
        let mut d = doc("p1");
        d.group_ids = vec!["g1".into(), "g1".into(), "g2".into()];
        let policy = Policy::from_document(&d).unwrap();
        assert_eq!(policy.group_refs, vec![GroupId::new("g1"), GroupId::new("g2")]);
    }

    #[test]
    fn describe_schedules() {
        let mut d = doc("p1");
        d.days_of_week = vec![2, 3];
        assert_eq!(
            Policy::from_document(&d).unwrap().describe(),
            "Mon, Tue 09:00~17:00 hidden"
        );

        d.schedule_type = ScheduleType::Daily;
        d.block_mode = BlockMode::ShowDuring;
        d.start_time = "08:00".into();
        d.end_time = "20:00".into();
        assert_eq!(
            Policy::from_document(&d).unwrap().describe(),
            "only every day 08:00~20:00 available"
        );

        d.schedule_type = ScheduleType::SpecificDates;
        d.block_mode = BlockMode::HideDuring;
        d.start_time = "10:00".into();
        d.end_time = "12:00".into();
        d.specific_dates = vec![
            "2024-05-03".into(),
            "2024-05-01".into(),
            "2024-05-02".into(),
            "2024-05-04".into(),
        ];
        assert_eq!(
            Policy::from_document(&d).unwrap().describe(),
            "2024-05-01 and 3 more 10:00~12:00 hidden"
        );
    }

    #[test]
    fn group_conversion() {
        let doc = GroupDocument {
            id: "g1".into(),
            name: "Games".into(),
            packages: vec!["a.b".into(), "c.d".into(), "a.b".into()],
            color: -16776961,
        };
        let group = Group::from_document(&doc).unwrap();
        assert_eq!(group.members.len(), 2);
        assert_eq!(group.color, -16776961);

        let bad = GroupDocument {
            packages: vec!["not a package".into()],
            ..doc
        };
        assert_eq!(validate_group_document(&bad).len(), 1);
    }
}
