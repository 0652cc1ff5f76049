//! SQLite-based directory storage
//!
//! Members are stored entity-attribute-value style: one `members` row per
//! member and one `member_fields` row per populated field. Field names come
//! from the configured mapping, so the schema does not change when the
//! mapping does.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::DirectoryStore;
use crate::models::{FieldPath, FieldValues, GroupFilter, LocalGroup, Member};
use crate::sync::{DeleteBatch, InsertBatch, UpdateBatch};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                is_remote INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE member_fields (
                member_id INTEGER NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (member_id, field),
                FOREIGN KEY (member_id) REFERENCES members(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_member_fields_lookup ON member_fields(field, value);

            -- Groups created from the remote directory
            CREATE TABLE remote_groups (
                remote_id TEXT PRIMARY KEY,
                remote_name TEXT NOT NULL,
                title TEXT NOT NULL
            );

            CREATE TABLE group_filters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                expected_value TEXT NOT NULL
            );
            "#,
        ),
        // Migration 2: Member sources
        M::up(
            r#"
            CREATE TABLE member_sources (
                group_id TEXT PRIMARY KEY,
                added_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        ),
    ])
}

/// SQLite-based directory storage
pub struct SqliteDirectoryStore {
    conn: Mutex<Connection>,
}

impl SqliteDirectoryStore {
    /// Open (or create) the database at `db_path` and migrate it
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets readers (the CLI listing commands) run during a sync;
        // foreign_keys is required for ON DELETE CASCADE
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        Self::from_connection(conn)
    }

    /// Create a store backed by a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("directory database lock poisoned"))
    }

    /// Ids of remote-origin members whose `field` equals `value`
    fn remote_member_ids(conn: &Connection, field: &str, value: &str) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare_cached(
            "SELECT f.member_id FROM member_fields f
             JOIN members m ON m.id = f.member_id
             WHERE m.is_remote = 1 AND f.field = ? AND f.value = ?",
        )?;
        let ids = stmt
            .query_map(params![field, value], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn load_fields(conn: &Connection, member_id: i64) -> Result<FieldValues> {
        let mut stmt =
            conn.prepare_cached("SELECT field, value FROM member_fields WHERE member_id = ?")?;
        let fields = stmt
            .query_map([member_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<FieldValues, _>>()?;
        Ok(fields)
    }

    fn insert_member(conn: &Connection, is_remote: bool, fields: &FieldValues) -> Result<()> {
        conn.execute("INSERT INTO members (is_remote) VALUES (?)", [is_remote])?;
        let member_id = conn.last_insert_rowid();

        let mut stmt = conn.prepare_cached(
            "INSERT INTO member_fields (member_id, field, value) VALUES (?, ?, ?)",
        )?;
        for (field, value) in fields {
            stmt.execute(params![member_id, field, value])?;
        }
        Ok(())
    }
}

impl DirectoryStore for SqliteDirectoryStore {
    fn remote_member_keys(&self, field: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT f.value FROM member_fields f
             JOIN members m ON m.id = f.member_id
             WHERE m.is_remote = 1 AND f.field = ? AND f.value != ''
             ORDER BY m.id",
        )?;
        let keys = stmt
            .query_map([field], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(keys)
    }

    fn insert_members(&self, batch: &InsertBatch) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for row in &batch.rows {
            Self::insert_member(&tx, true, row)?;
        }

        tx.commit()?;
        Ok(batch.rows.len())
    }

    fn update_members(&self, batch: &UpdateBatch) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        // Resolve every key before writing: the batch may rewrite the key field
        let mut targets: HashMap<&str, Vec<i64>> = HashMap::new();
        for key in &batch.keys {
            let ids = Self::remote_member_ids(&tx, &batch.key_field, key)?;
            if !ids.is_empty() {
                targets.insert(key.as_str(), ids);
            }
        }

        {
            // ON CONFLICT DO UPDATE leaves fields missing from the batch untouched
            let mut stmt = tx.prepare(
                "INSERT INTO member_fields (member_id, field, value) VALUES (?, ?, ?)
                 ON CONFLICT(member_id, field) DO UPDATE SET value = excluded.value",
            )?;
            for (field, values) in &batch.fields {
                for (key, value) in values {
                    let Some(ids) = targets.get(key.as_str()) else {
                        continue;
                    };
                    for id in ids {
                        stmt.execute(params![id, field, value])?;
                    }
                }
            }
        }

        let matched = targets.values().map(Vec::len).sum();
        tx.commit()?;
        Ok(matched)
    }

    fn delete_members(&self, batch: &DeleteBatch) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut deleted = 0;
        {
            let mut stmt = tx.prepare(
                "DELETE FROM members WHERE is_remote = 1 AND id IN (
                    SELECT member_id FROM member_fields WHERE field = ? AND value = ?
                 )",
            )?;
            for key in &batch.keys {
                deleted += stmt.execute(params![batch.key_field, key])?;
            }
        }

        tx.commit()?;
        Ok(deleted)
    }

    fn find_member(&self, field: &str, value: &str) -> Result<Option<Member>> {
        let conn = self.conn()?;

        let row: Option<(i64, bool)> = conn
            .query_row(
                "SELECT m.id, m.is_remote FROM member_fields f
                 JOIN members m ON m.id = f.member_id
                 WHERE f.field = ? AND f.value = ?
                 ORDER BY m.id LIMIT 1",
                params![field, value],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((member_id, is_remote)) = row else {
            return Ok(None);
        };

        Ok(Some(Member {
            is_remote,
            fields: Self::load_fields(&conn, member_id)?,
        }))
    }

    fn count_members(&self) -> Result<usize> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM members", [], |row| row.get(0))?;

        Ok(count as usize)
    }

    fn add_local_member(&self, member: Member) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::insert_member(&tx, false, &member.fields)?;
        tx.commit()?;
        Ok(())
    }

    fn remote_group_ids(&self) -> Result<BTreeSet<String>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT remote_id FROM remote_groups")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;

        Ok(ids)
    }

    fn has_remote_group(&self, remote_id: &str) -> Result<bool> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM remote_groups WHERE remote_id = ?",
            [remote_id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn create_group(&self, group: LocalGroup) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO remote_groups (remote_id, remote_name, title) VALUES (?, ?, ?)",
            params![group.remote_id, group.remote_name, group.title],
        )
        .with_context(|| format!("Failed to create group {}", group.remote_id))?;

        Ok(())
    }

    fn delete_groups(&self, remote_ids: &BTreeSet<String>) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM remote_groups WHERE remote_id = ?")?;
            for id in remote_ids {
                deleted += stmt.execute([id])?;
            }
        }

        tx.commit()?;
        Ok(deleted)
    }

    fn list_groups(&self) -> Result<Vec<LocalGroup>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT remote_id, remote_name, title FROM remote_groups ORDER BY remote_id")?;
        let groups = stmt
            .query_map([], |row| {
                Ok(LocalGroup {
                    remote_id: row.get(0)?,
                    remote_name: row.get(1)?,
                    title: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(groups)
    }

    fn group_filters(&self) -> Result<Vec<GroupFilter>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT path, expected_value FROM group_filters ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(path, expected_value)| {
                let path = FieldPath::parse(&path)
                    .with_context(|| format!("Invalid stored group filter path {path:?}"))?;
                Ok(GroupFilter::new(path, expected_value))
            })
            .collect()
    }

    fn add_group_filter(&self, filter: GroupFilter) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO group_filters (path, expected_value) VALUES (?, ?)",
            params![filter.path.to_string(), filter.expected_value],
        )?;

        Ok(())
    }

    fn member_sources(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT group_id FROM member_sources ORDER BY rowid")?;
        let sources = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(sources)
    }

    fn add_member_source(&self, group_id: &str) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO member_sources (group_id) VALUES (?) ON CONFLICT(group_id) DO NOTHING",
            [group_id],
        )?;

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            "DELETE FROM member_fields;
             DELETE FROM members;
             DELETE FROM remote_groups;
             DELETE FROM group_filters;
             DELETE FROM member_sources;",
        )?;

        Ok(())
    }
}
