//! 同步队列 DAO - sync_queue 表

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::storage::entities::{from_millis, to_millis, SyncItem, SyncItemStatus};
use crate::storage::entity_kind::EntityKind;

const COLUMNS: &str =
    "id, operation, entity_type, entity_id, data, enqueued_at, retry_count, last_error, status";

pub struct SyncQueueDao<'a> {
    conn: &'a Connection,
}

impl<'a> SyncQueueDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, item: &SyncItem) -> Result<()> {
        let sql = r#"
            INSERT INTO sync_queue
                (id, operation, entity_type, entity_id, data, enqueued_at, retry_count, last_error, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
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
                item.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// 失败后回写重试信息；不改动 rowid，FIFO 次序保持不变
    pub fn update_retry_state(&self, item: &SyncItem) -> Result<bool> {
        let sql = r#"
            UPDATE sync_queue
            SET retry_count = ?2, last_error = ?3, status = ?4
            WHERE id = ?1
        "#;
        let changed = self.conn.execute(
            sql,
            params![item.id, item.retry_count, item.last_error, item.status.as_str()],
        )?;
        Ok(changed > 0)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn get(&self, id: &str) -> Result<Option<SyncItem>> {
        let sql = format!("SELECT {} FROM sync_queue WHERE id = ?1", COLUMNS);
        let raw = self.conn.query_row(&sql, params![id], row_to_raw).optional()?;
        raw.map(RawSyncItem::into_item).transpose()
    }

    /// 按入队时间升序（同一毫秒内按插入顺序）
    pub fn list(&self) -> Result<Vec<SyncItem>> {
        let sql = format!(
            "SELECT {} FROM sync_queue ORDER BY enqueued_at ASC, rowid ASC",
            COLUMNS
        );
        self.query(&sql, params![])
    }

    pub fn list_for_entity(&self, kind: EntityKind, entity_id: &str) -> Result<Vec<SyncItem>> {
        let sql = format!(
            "SELECT {} FROM sync_queue WHERE entity_type = ?1 AND entity_id = ?2 \
             ORDER BY enqueued_at ASC, rowid ASC",
            COLUMNS
        );
        self.query(&sql, params![kind.as_str(), entity_id])
    }

    pub fn list_by_status(&self, status: SyncItemStatus) -> Result<Vec<SyncItem>> {
        let sql = format!(
            "SELECT {} FROM sync_queue WHERE status = ?1 ORDER BY enqueued_at ASC, rowid ASC",
            COLUMNS
        );
        self.query(&sql, params![status.as_str()])
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM sync_queue", [])?)
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<SyncItem>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_raw)?;
        let mut items = Vec::new();
        for raw in rows {
            items.push(raw?.into_item()?);
        }
        Ok(items)
    }
}

/// 原始行：枚举和 JSON 的解析放到行回调之外，解析失败时能带上具体原因
pub(crate) struct RawSyncItem {
    id: String,
    operation: String,
    entity_type: String,
    entity_id: String,
    data: String,
    enqueued_at: i64,
    retry_count: u32,
    last_error: Option<String>,
    status: String,
}

impl RawSyncItem {
    pub(crate) fn into_item(self) -> Result<SyncItem> {
        Ok(SyncItem {
            id: self.id,
            operation: self.operation.parse()?,
            entity_type: self.entity_type.parse()?,
            entity_id: self.entity_id,
            data: serde_json::from_str(&self.data)?,
            enqueued_at: from_millis(self.enqueued_at),
            retry_count: self.retry_count,
            last_error: self.last_error,
            status: self.status.parse()?,
        })
    }
}

pub(crate) fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSyncItem> {
    Ok(RawSyncItem {
        id: row.get(0)?,
        operation: row.get(1)?,
        entity_type: row.get(2)?,
        entity_id: row.get(3)?,
        data: row.get(4)?,
        enqueued_at: row.get(5)?,
        retry_count: row.get(6)?,
        last_error: row.get(7)?,
        status: row.get(8)?,
    })
}
