//! Global override settings
//!
//! Force mode and the daily unlock quota. The service owns a copy of the
//! persisted record; nothing is written until `save()` is called.

use chrono::NaiveDate;
use discipline_api::{SettingsUpdate, SettingsView};
use discipline_store::{SettingsRecord, Store, StoreResult};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SettingsService {
    record: SettingsRecord,
    store: Arc<dyn Store>,
}

impl SettingsService {
    /// Load the persisted record, or defaults if none was saved yet
    pub fn load(store: Arc<dyn Store>) -> StoreResult<Self> {
        let record = store.load_settings()?.unwrap_or_default();
        Ok(Self { record, store })
    }

    /// Like `load`, but an unreadable record falls back to defaults
    pub fn load_or_default(store: Arc<dyn Store>) -> Self {
        let record = match store.load_settings() {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Could not load settings, using defaults");
                SettingsRecord::default()
            }
        };
        Self { record, store }
    }

    pub fn save(&self) -> StoreResult<()> {
        self.store.save_settings(&self.record)
    }

    pub fn record(&self) -> &SettingsRecord {
        &self.record
    }

    /// Reset the daily counter when the last unlock was on another day.
    /// Returns true if anything changed.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        match self.record.last_unlock_date {
            Some(date) if date != today && self.record.unlocks_used_today > 0 => {
                debug!(last = %date, today = %today, "Resetting daily unlock counter");
                self.record.unlocks_used_today = 0;
                true
            }
            _ => false,
        }
    }

    pub fn remaining_unlocks(&self) -> u32 {
        self.record
            .unlock_limit
            .saturating_sub(self.record.unlocks_used_today)
    }

    /// Consume one unlock if any are left today
    pub fn try_use_unlock(&mut self, today: NaiveDate) -> bool {
        self.roll_over(today);
        if self.remaining_unlocks() == 0 {
            return false;
        }
        self.record.unlocks_used_today += 1;
        self.record.last_unlock_date = Some(today);
        true
    }

    /// Force mode may be switched off at most once per day
    pub fn can_disable_force_mode(&self, today: NaiveDate) -> bool {
        self.record.last_force_mode_disable_date != Some(today)
    }

    pub fn record_force_mode_disabled(&mut self, today: NaiveDate) {
        self.record.force_mode_enabled = false;
        self.record.last_force_mode_disable_date = Some(today);
    }

    pub fn set_force_mode(&mut self, enabled: bool) {
        self.record.force_mode_enabled = enabled;
    }

    pub fn set_unlock_limit(&mut self, limit: u32) {
        self.record.unlock_limit = limit;
    }

    pub fn set_force_mode_delay(&mut self, secs: u64) {
        self.record.force_mode_delay_secs = secs;
    }

    pub fn set_force_unlock_delay(&mut self, secs: u64) {
        self.record.force_unlock_delay_secs = secs;
    }

    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(limit) = update.unlock_limit {
            self.set_unlock_limit(limit);
        }
        if let Some(secs) = update.force_mode_delay_secs {
            self.set_force_mode_delay(secs);
        }
        if let Some(secs) = update.force_unlock_delay_secs {
            self.set_force_unlock_delay(secs);
        }
    }

    pub fn view(&self, today: NaiveDate) -> SettingsView {
        let used = match self.record.last_unlock_date {
            Some(date) if date != today => 0,
            _ => self.record.unlocks_used_today,
        };

        SettingsView {
            force_mode_enabled: self.record.force_mode_enabled,
            unlock_limit: self.record.unlock_limit,
            unlocks_used_today: used,
            remaining_unlocks: self.record.unlock_limit.saturating_sub(used),
            force_mode_delay_secs: self.record.force_mode_delay_secs,
            force_unlock_delay_secs: self.record.force_unlock_delay_secs,
            can_disable_force_mode: self.can_disable_force_mode(today),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discipline_store::SqliteStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn service() -> (Arc<SqliteStore>, SettingsService) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let service = SettingsService::load(store.clone()).unwrap();
        (store, service)
    }

    #[test]
    fn defaults_when_nothing_saved() {
        let (_, service) = service();
        assert_eq!(service.record(), &SettingsRecord::default());
        assert_eq!(service.remaining_unlocks(), 3);
    }

    #[test]
    fn unlocks_run_out_and_reset_next_day() {
        let (_, mut service) = service();

        assert!(service.try_use_unlock(day(1)));
        assert!(service.try_use_unlock(day(1)));
        assert!(service.try_use_unlock(day(1)));
        assert!(!service.try_use_unlock(day(1)));
        assert_eq!(service.remaining_unlocks(), 0);

        // The view already reflects the new day before any write
        assert_eq!(service.view(day(2)).remaining_unlocks, 3);

        assert!(service.try_use_unlock(day(2)));
        assert_eq!(service.remaining_unlocks(), 2);
    }

    #[test]
    fn zero_limit_never_unlocks() {
        let (_, mut service) = service();
        service.set_unlock_limit(0);
        assert!(!service.try_use_unlock(day(1)));
    }

    #[test]
    fn force_mode_disable_once_per_day() {
        let (_, mut service) = service();
        service.set_force_mode(true);
        assert!(service.can_disable_force_mode(day(5)));

        service.record_force_mode_disabled(day(5));
        assert!(!service.record().force_mode_enabled);
        assert!(!service.can_disable_force_mode(day(5)));
        assert!(service.can_disable_force_mode(day(6)));
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let (_, mut service) = service();
        service.set_force_mode_delay(30);
        service.apply(&SettingsUpdate {
            unlock_limit: Some(1),
            ..Default::default()
        });

        assert_eq!(service.record().unlock_limit, 1);
        assert_eq!(service.record().force_mode_delay_secs, 30);
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discipline.db");
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute(
                "INSERT OR REPLACE INTO kv (key, value_json) VALUES ('settings', '{broken')",
                [],
            )
            .unwrap();

        assert!(SettingsService::load(store.clone()).is_err());

        let mut service = SettingsService::load_or_default(store.clone());
        assert_eq!(service.record(), &SettingsRecord::default());

        service.set_unlock_limit(4);
        service.save().unwrap();
        assert_eq!(store.load_settings().unwrap().unwrap().unlock_limit, 4);
    }

    #[test]
    fn save_and_reload() {
        let (store, mut service) = service();
        service.set_force_mode(true);
        service.set_force_mode_delay(30);
        service.set_force_unlock_delay(10);
        service.try_use_unlock(day(1));
        service.save().unwrap();

        let reloaded = SettingsService::load(store).unwrap();
        assert_eq!(reloaded.record(), service.record());
        let view = reloaded.view(day(1));
        assert!(view.force_mode_enabled);
        assert_eq!(view.unlocks_used_today, 1);
        assert_eq!(view.force_mode_delay_secs, 30);
    }
}
