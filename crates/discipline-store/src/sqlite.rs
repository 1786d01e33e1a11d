//! SQLite-based store implementation

use chrono::{DateTime, Local};
use discipline_api::{GroupDocument, PolicyDocument};
use discipline_util::{GroupId, PackageName, PolicyId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, SettingsRecord, Store, StoreError, StoreResult};

const MANAGED_KEY: &str = "last_managed_packages";
const SETTINGS_KEY: &str = "settings";

/// Document tables; both share the same layout
#[derive(Debug, Clone, Copy)]
enum DocTable {
    Policies,
    Groups,
}

impl DocTable {
    fn name(self) -> &'static str {
        match self {
            DocTable::Policies => "policies",
            DocTable::Groups => "groups",
        }
    }
}

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Policy documents; seq keeps creation order across upserts
            CREATE TABLE IF NOT EXISTS policies (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                doc_json TEXT NOT NULL
            );

            -- Group documents
            CREATE TABLE IF NOT EXISTS groups (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                doc_json TEXT NOT NULL
            );

            -- Single-value state (management memory, settings)
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value_json TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn list_docs<T: DeserializeOwned>(&self, table: DocTable) -> StoreResult<Vec<T>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, doc_json FROM {} ORDER BY seq",
            table.name()
        ))?;

        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let json: String = row.get(1)?;
            Ok((id, json))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, json) = row?;
            match serde_json::from_str(&json) {
                Ok(doc) => docs.push(doc),
                Err(e) => {
                    warn!(table = table.name(), id = %id, error = %e, "Skipping unreadable record");
                }
            }
        }

        Ok(docs)
    }

    fn get_doc<T: DeserializeOwned>(&self, table: DocTable, id: &str) -> StoreResult<Option<T>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                &format!("SELECT doc_json FROM {} WHERE id = ?", table.name()),
                [id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn save_doc<T: Serialize>(&self, table: DocTable, id: &str, doc: &T) -> StoreResult<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(doc)?;

        conn.execute(
            &format!(
                r#"
                INSERT INTO {} (id, doc_json)
                VALUES (?, ?)
                ON CONFLICT(id)
                DO UPDATE SET doc_json = excluded.doc_json
                "#,
                table.name()
            ),
            params![id, json],
        )?;

        debug!(table = table.name(), id = %id, "Document saved");
        Ok(())
    }

    fn delete_doc(&self, table: DocTable, id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", table.name()),
            [id],
        )?;
        Ok(removed > 0)
    }

    fn get_value<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row("SELECT value_json FROM kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn set_value<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(value)?;

        conn.execute(
            r#"
            INSERT INTO kv (key, value_json)
            VALUES (?, ?)
            ON CONFLICT(key)
            DO UPDATE SET value_json = excluded.value_json
            "#,
            params![key, json],
        )?;

        Ok(())
    }
}

impl Store for SqliteStore {
    fn list_policies(&self) -> StoreResult<Vec<PolicyDocument>> {
        self.list_docs(DocTable::Policies)
    }

    fn get_policy(&self, id: &PolicyId) -> StoreResult<Option<PolicyDocument>> {
        self.get_doc(DocTable::Policies, id.as_str())
    }

    fn save_policy(&self, doc: &PolicyDocument) -> StoreResult<()> {
        self.save_doc(DocTable::Policies, &doc.id, doc)
    }

    fn delete_policy(&self, id: &PolicyId) -> StoreResult<bool> {
        self.delete_doc(DocTable::Policies, id.as_str())
    }

    fn list_groups(&self) -> StoreResult<Vec<GroupDocument>> {
        self.list_docs(DocTable::Groups)
    }

    fn get_group(&self, id: &GroupId) -> StoreResult<Option<GroupDocument>> {
        self.get_doc(DocTable::Groups, id.as_str())
    }

    fn save_group(&self, doc: &GroupDocument) -> StoreResult<()> {
        self.save_doc(DocTable::Groups, &doc.id, doc)
    }

    fn delete_group(&self, id: &GroupId) -> StoreResult<bool> {
        self.delete_doc(DocTable::Groups, id.as_str())
    }

    fn load_managed(&self) -> StoreResult<BTreeSet<PackageName>> {
        Ok(self.get_value(MANAGED_KEY)?.unwrap_or_default())
    }

    fn save_managed(&self, packages: &BTreeSet<PackageName>) -> StoreResult<()> {
        self.set_value(MANAGED_KEY, packages)?;
        debug!(count = packages.len(), "Management memory saved");
        Ok(())
    }

    fn load_settings(&self) -> StoreResult<Option<SettingsRecord>> {
        self.get_value(SETTINGS_KEY)
    }

    fn save_settings(&self, settings: &SettingsRecord) -> StoreResult<()> {
        self.set_value(SETTINGS_KEY, settings)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| discipline_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
