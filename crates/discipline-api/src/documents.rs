//! Policy and group documents
//!
//! Field names and defaults match the persisted JSON layout, so a document
//! written by an older build (missing `scheduleType`, `blockMode`, ...)
//! still loads.

use serde::{Deserialize, Deserializer, Serialize};

/// How a policy's active days are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    /// Recurring on the listed weekdays
    #[default]
    Weekly,
    /// Only on the listed calendar dates
    SpecificDates,
    /// Every day
    Daily,
}

impl ScheduleType {
    fn from_lenient(s: &str) -> Self {
        match s {
            "DAILY" => Self::Daily,
            "SPECIFIC_DATES" => Self::SpecificDates,
            _ => Self::Weekly,
        }
    }
}

/// Whether the time window marks when apps are hidden or when they are shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockMode {
    /// Restrict while the window is active
    #[default]
    HideDuring,
    /// Restrict while the window is inactive
    ShowDuring,
}

impl BlockMode {
    fn from_lenient(s: &str) -> Self {
        match s {
            "SHOW_DURING" => Self::ShowDuring,
            _ => Self::HideDuring,
        }
    }
}

fn lenient_schedule_type<'de, D: Deserializer<'de>>(d: D) -> Result<ScheduleType, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.map(|s| ScheduleType::from_lenient(&s)).unwrap_or_default())
}

fn lenient_block_mode<'de, D: Deserializer<'de>>(d: D) -> Result<BlockMode, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.map(|s| BlockMode::from_lenient(&s)).unwrap_or_default())
}

fn all_days() -> Vec<i64> {
    vec![1, 2, 3, 4, 5, 6, 7]
}

fn default_true() -> bool {
    true
}

/// Default per-policy unlock quota
pub const DEFAULT_UNLOCK_LIMIT: u32 = 3;

fn default_unlock_limit() -> u32 {
    DEFAULT_UNLOCK_LIMIT
}

/// A restriction policy as stored and transmitted.
///
/// Unvalidated: times are raw `HH:mm` strings, weekdays raw numbers
/// (1 = Sunday .. 7 = Saturday), dates raw `yyyy-MM-dd` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    /// Empty on a create request; the daemon assigns one
    #[serde(default)]
    pub id: String,

    pub label: String,

    /// Explicit target package names
    #[serde(default)]
    pub packages: Vec<String>,

    /// Referenced group ids, in order
    #[serde(default)]
    pub group_ids: Vec<String>,

    #[serde(default = "all_days")]
    pub days_of_week: Vec<i64>,

    pub start_time: String,

    pub end_time: String,

    #[serde(default = "default_true")]
    pub is_enabled: bool,

    #[serde(default)]
    pub is_force_mode: bool,

    #[serde(default = "default_unlock_limit")]
    pub unlock_limit: u32,

    #[serde(default)]
    pub used_unlocks: u32,

    #[serde(default, deserialize_with = "lenient_schedule_type")]
    pub schedule_type: ScheduleType,

    #[serde(default)]
    pub specific_dates: Vec<String>,

    #[serde(default, deserialize_with = "lenient_block_mode")]
    pub block_mode: BlockMode,
}

impl PolicyDocument {
    /// A new weekly, hide-during policy over every day
    pub fn new(label: impl Into<String>, start_time: &str, end_time: &str) -> Self {
        Self {
            id: String::new(),
            label: label.into(),
            packages: Vec::new(),
            group_ids: Vec::new(),
            days_of_week: all_days(),
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            is_enabled: true,
            is_force_mode: false,
            unlock_limit: DEFAULT_UNLOCK_LIMIT,
            used_unlocks: 0,
            schedule_type: ScheduleType::Weekly,
            specific_dates: Vec::new(),
            block_mode: BlockMode::HideDuring,
        }
    }
}

/// A reusable bundle of packages as stored and transmitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDocument {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub packages: Vec<String>,

    /// ARGB display colour
    #[serde(default)]
    pub color: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_gets_defaults() {
        let json = r#"{
            "id": "p1",
            "label": "Bedtime",
            "packages": ["com.example.game"],
            "startTime": "22:00",
            "endTime": "07:00"
        }"#;

        let doc: PolicyDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.days_of_week, vec![1, 2, 3, 4, 5, 6, 7]);
        assert!(doc.is_enabled);
        assert!(!doc.is_force_mode);
        assert_eq!(doc.unlock_limit, 3);
        assert_eq!(doc.used_unlocks, 0);
        assert_eq!(doc.schedule_type, ScheduleType::Weekly);
        assert_eq!(doc.block_mode, BlockMode::HideDuring);
        assert!(doc.group_ids.is_empty());
    }

    #[test]
    fn unknown_enum_strings_fall_back() {
        let json = r#"{
            "id": "p1",
            "label": "x",
            "startTime": "09:00",
            "endTime": "10:00",
            "scheduleType": "FORTNIGHTLY",
            "blockMode": "SOMETIMES"
        }"#;

        let doc: PolicyDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.schedule_type, ScheduleType::Weekly);
        assert_eq!(doc.block_mode, BlockMode::HideDuring);
    }

    #[test]
    fn field_names_match_stored_layout() {
        let mut doc = PolicyDocument::new("School", "09:00", "17:00");
        doc.id = "abc".into();
        doc.schedule_type = ScheduleType::SpecificDates;
        doc.block_mode = BlockMode::ShowDuring;
        doc.specific_dates = vec!["2025-01-02".into()];

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["startTime"], "09:00");
        assert_eq!(value["groupIds"], serde_json::json!([]));
        assert_eq!(value["isForceMode"], false);
        assert_eq!(value["scheduleType"], "SPECIFIC_DATES");
        assert_eq!(value["blockMode"], "SHOW_DURING");

        let back: PolicyDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn group_document_defaults() {
        let group: GroupDocument =
            serde_json::from_str(r#"{"id":"g","name":"Games","packages":["a.b"]}"#).unwrap();
        assert_eq!(group.color, 0);
        assert_eq!(group.packages, vec!["a.b".to_string()]);
    }
}
