//! 实体镜像 DAO - incidents / audits / risks / documents / compliance_items 表

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::storage::entities::{from_millis, to_millis, EntityRecord};
use crate::storage::entity_kind::EntityKind;

pub struct EntityDao<'a> {
    conn: &'a Connection,
    kind: EntityKind,
}

impl<'a> EntityDao<'a> {
    pub fn new(conn: &'a Connection, kind: EntityKind) -> Self {
        Self { conn, kind }
    }

    /// 按 id upsert，后写覆盖
    pub fn upsert(&self, record: &EntityRecord) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {table} (id, data, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            table = self.kind.table()
        );
        self.conn.execute(
            &sql,
            params![
                record.id,
                serde_json::to_string(&record.data)?,
                to_millis(record.updated_at)
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<EntityRecord>> {
        let sql = format!(
            "SELECT id, data, updated_at FROM {} WHERE id = ?1",
            self.kind.table()
        );
        let row = self
            .conn
            .query_row(&sql, params![id], row_to_tuple)
            .optional()?;
        row.map(tuple_to_record).transpose()
    }

    pub fn list(&self) -> Result<Vec<EntityRecord>> {
        let sql = format!(
            "SELECT id, data, updated_at FROM {} ORDER BY updated_at ASC, id ASC",
            self.kind.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_tuple)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(tuple_to_record(row?)?);
        }
        Ok(records)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.kind.table());
        Ok(self.conn.execute(&sql, params![id])? > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.kind.table());
        let n: i64 = self.conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn clear(&self) -> Result<usize> {
        let sql = format!("DELETE FROM {}", self.kind.table());
        Ok(self.conn.execute(&sql, [])?)
    }
}

fn row_to_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn tuple_to_record((id, data, updated_at): (String, String, i64)) -> Result<EntityRecord> {
    Ok(EntityRecord {
        id,
        data: serde_json::from_str(&data)?,
        updated_at: from_millis(updated_at),
    })
}
