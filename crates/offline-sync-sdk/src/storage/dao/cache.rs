//! 缓存 DAO - cache 表

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::storage::entities::{from_millis, to_millis, CacheItem};

pub struct CacheDao<'a> {
    conn: &'a Connection,
}

impl<'a> CacheDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, item: &CacheItem) -> Result<()> {
        let sql = r#"
            INSERT INTO cache (key, data, stored_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                data = excluded.data,
                stored_at = excluded.stored_at,
                expires_at = excluded.expires_at
        "#;
        self.conn.execute(
            sql,
            params![
                item.key,
                serde_json::to_string(&item.data)?,
                to_millis(item.stored_at),
                item.expires_at.map(to_millis),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<CacheItem>> {
        let row = self
            .conn
            .query_row(
                "SELECT key, data, stored_at, expires_at FROM cache WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((key, data, stored_at, expires_at)) => Ok(Some(CacheItem {
                key,
                data: serde_json::from_str(&data)?,
                stored_at: from_millis(stored_at),
                expires_at: expires_at.map(from_millis),
            })),
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM cache WHERE key = ?1", params![key])?;
        Ok(changed > 0)
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM cache", [])?)
    }

    /// 删除 expires_at < now_ms 的条目
    pub fn delete_expired(&self, now_ms: i64) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM cache WHERE expires_at IS NOT NULL AND expires_at < ?1",
            params![now_ms],
        )?)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}
