//! 死信 DAO - dead_letters 表

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::storage::entities::{from_millis, to_millis, DeadLetter, SyncItem, SyncItemStatus};

pub struct DeadLetterDao<'a> {
    conn: &'a Connection,
}

impl<'a> DeadLetterDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, letter: &DeadLetter) -> Result<()> {
        let item = &letter.item;
        let sql = r#"
            INSERT INTO dead_letters
                (id, operation, entity_type, entity_id, data, enqueued_at, retry_count, last_error, failed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                retry_count = excluded.retry_count,
                last_error = excluded.last_error,
                failed_at = excluded.failed_at
        "#;
        self.conn.execute(
            sql,
            params![
                item.id,
                item.operation.as_str(),
                item.entity_type.as_str(),
                item.entity_id,
                serde_json::to_string(&item.data)?,
                to_millis(item.enqueued_at),
                item.retry_count,
                item.last_error,
                to_millis(letter.failed_at),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<DeadLetter>> {
        let sql = r#"
            SELECT id, operation, entity_type, entity_id, data, enqueued_at, retry_count, last_error, failed_at
            FROM dead_letters WHERE id = ?1
        "#;
        let raw = self.conn.query_row(sql, params![id], row_to_raw).optional()?;
        raw.map(RawDeadLetter::into_letter).transpose()
    }

    pub fn list(&self) -> Result<Vec<DeadLetter>> {
        let sql = r#"
            SELECT id, operation, entity_type, entity_id, data, enqueued_at, retry_count, last_error, failed_at
            FROM dead_letters
            ORDER BY failed_at ASC, rowid ASC
        "#;
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_raw)?;
        let mut letters = Vec::new();
        for raw in rows {
            letters.push(raw?.into_letter()?);
        }
        Ok(letters)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM dead_letters", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM dead_letters WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

struct RawDeadLetter {
    id: String,
    operation: String,
    entity_type: String,
    entity_id: String,
    data: String,
    enqueued_at: i64,
    retry_count: u32,
    last_error: Option<String>,
    failed_at: i64,
}

impl RawDeadLetter {
    fn into_letter(self) -> Result<DeadLetter> {
        Ok(DeadLetter {
            item: SyncItem {
                id: self.id,
                operation: self.operation.parse()?,
                entity_type: self.entity_type.parse()?,
                entity_id: self.entity_id,
                data: serde_json::from_str(&self.data)?,
                enqueued_at: from_millis(self.enqueued_at),
                retry_count: self.retry_count,
                last_error: self.last_error,
                // 死信不再参与队列状态机
                status: SyncItemStatus::Pending,
            },
            failed_at: from_millis(self.failed_at),
        })
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDeadLetter> {
    Ok(RawDeadLetter {
        id: row.get(0)?,
        operation: row.get(1)?,
        entity_type: row.get(2)?,
        entity_id: row.get(3)?,
        data: row.get(4)?,
        enqueued_at: row.get(5)?,
        retry_count: row.get(6)?,
        last_error: row.get(7)?,
        failed_at: row.get(8)?,
    })
}
