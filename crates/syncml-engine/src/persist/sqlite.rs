//! SQLite-backed persistence for anchors, UID mappings, pending changes
//! and authentication nonces.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::conflict::LocalChanges;
use crate::error::SyncError;
use crate::persist::{direction_tag, ChangeLogRecord, NonceStore, SyncStateStore};
use crate::target::UidMapping;
use syncml_wire::SyncDirection;

pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<SqliteStore, SyncError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<SqliteStore, SyncError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(connection: Connection) -> Result<SqliteStore, SyncError> {
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS nonces (
                issuer TEXT NOT NULL,
                target TEXT NOT NULL,
                nonce BLOB NOT NULL,
                PRIMARY KEY (issuer, target)
            );
            CREATE TABLE IF NOT EXISTS anchors (
                remote_device TEXT NOT NULL,
                source_db TEXT NOT NULL,
                direction TEXT NOT NULL,
                local_last TEXT NOT NULL,
                remote_last TEXT NOT NULL,
                PRIMARY KEY (remote_device, source_db, direction)
            );
            CREATE TABLE IF NOT EXISTS mappings (
                remote_device TEXT NOT NULL,
                source_db TEXT NOT NULL,
                direction TEXT NOT NULL,
                remote_uid TEXT NOT NULL,
                local_uid TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS mappings_by_target
                ON mappings (remote_device, source_db, direction);
            CREATE TABLE IF NOT EXISTS pending_changes (
                remote_device TEXT NOT NULL,
                source_db TEXT NOT NULL,
                direction TEXT NOT NULL,
                change_type TEXT NOT NULL,
                item_key TEXT NOT NULL
            );",
        )?;
        Ok(SqliteStore { connection: Mutex::new(connection) })
    }
}

impl NonceStore for SqliteStore {
    fn upsert_nonce(&mut self, issuer: &str, target: &str, nonce: &[u8]) -> Result<(), SyncError> {
        self.connection.lock().execute(
            "INSERT INTO nonces (issuer, target, nonce) VALUES (?1, ?2, ?3)
             ON CONFLICT (issuer, target) DO UPDATE SET nonce = excluded.nonce",
            params![issuer, target, nonce],
        )?;
        Ok(())
    }

    fn get_nonce(&self, issuer: &str, target: &str) -> Result<Option<Vec<u8>>, SyncError> {
        let connection = self.connection.lock();
        let nonce = connection
            .query_row(
                "SELECT nonce FROM nonces WHERE issuer = ?1 AND target = ?2",
                params![issuer, target],
                |row| row.get(0),
            )
            .optional()?;
        Ok(nonce)
    }

    fn clear_nonce(&mut self, issuer: &str, target: &str) -> Result<(), SyncError> {
        self.connection.lock().execute(
            "DELETE FROM nonces WHERE issuer = ?1 AND target = ?2",
            params![issuer, target],
        )?;
        Ok(())
    }
}

impl SyncStateStore for SqliteStore {
    fn load_changelog(
        &self,
        remote_device: &str,
        source_db: &str,
        direction: SyncDirection,
    ) -> Result<Option<ChangeLogRecord>, SyncError> {
        let connection = self.connection.lock();
        let direction = direction_tag(direction);

        let anchors: Option<(String, String)> = connection
            .query_row(
                "SELECT local_last, remote_last FROM anchors
                 WHERE remote_device = ?1 AND source_db = ?2 AND direction = ?3",
                params![remote_device, source_db, direction],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((local_last_anchor, remote_last_anchor)) = anchors else {
            return Ok(None);
        };

        let mut record = ChangeLogRecord {
            local_last_anchor,
            remote_last_anchor,
            mappings: Vec::new(),
            pending: LocalChanges::default(),
        };

        let mut statement = connection.prepare(
            "SELECT remote_uid, local_uid FROM mappings
             WHERE remote_device = ?1 AND source_db = ?2 AND direction = ?3",
        )?;
        let mappings = statement.query_map(params![remote_device, source_db, direction], |row| {
            Ok(UidMapping { remote_uid: row.get(0)?, local_uid: row.get(1)? })
        })?;
        for mapping in mappings {
            record.mappings.push(mapping?);
        }

        let mut statement = connection.prepare(
            "SELECT change_type, item_key FROM pending_changes
             WHERE remote_device = ?1 AND source_db = ?2 AND direction = ?3",
        )?;
        let pending = statement.query_map(params![remote_device, source_db, direction], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for change in pending {
            let (change_type, key) = change?;
            match change_type.as_str() {
                "added" => record.pending.added.push(key),
                "modified" => record.pending.modified.push(key),
                "removed" => record.pending.removed.push(key),
                other => {
                    return Err(SyncError::Database(format!("unknown change type {other}")));
                }
            }
        }

        Ok(Some(record))
    }

    fn save_changelog(
        &mut self,
        remote_device: &str,
        source_db: &str,
        direction: SyncDirection,
        record: &ChangeLogRecord,
    ) -> Result<(), SyncError> {
        let mut connection = self.connection.lock();
        let direction = direction_tag(direction);

        let tx = connection.transaction()?;

        tx.execute(
            "INSERT INTO anchors (remote_device, source_db, direction, local_last, remote_last)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (remote_device, source_db, direction)
             DO UPDATE SET local_last = excluded.local_last, remote_last = excluded.remote_last",
            params![
                remote_device,
                source_db,
                direction,
                record.local_last_anchor,
                record.remote_last_anchor
            ],
        )?;

        tx.execute(
            "DELETE FROM mappings WHERE remote_device = ?1 AND source_db = ?2 AND direction = ?3",
            params![remote_device, source_db, direction],
        )?;
        for mapping in &record.mappings {
            tx.execute(
                "INSERT INTO mappings
                 (remote_device, source_db, direction, remote_uid, local_uid)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![remote_device, source_db, direction, mapping.remote_uid, mapping.local_uid],
            )?;
        }

        tx.execute(
            "DELETE FROM pending_changes
             WHERE remote_device = ?1 AND source_db = ?2 AND direction = ?3",
            params![remote_device, source_db, direction],
        )?;
        for (change_type, keys) in [
            ("added", &record.pending.added),
            ("modified", &record.pending.modified),
            ("removed", &record.pending.removed),
        ] {
            for key in keys {
                tx.execute(
                    "INSERT INTO pending_changes
                     (remote_device, source_db, direction, change_type, item_key)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![remote_device, source_db, direction, change_type, key],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}
