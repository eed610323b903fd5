//! 待上传 DAO - pending_uploads 表

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::storage::entities::{from_millis, to_millis, PendingUpload};

pub struct UploadDao<'a> {
    conn: &'a Connection,
}

impl<'a> UploadDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, upload: &PendingUpload) -> Result<()> {
        self.conn.execute(
            "INSERT INTO pending_uploads (id, blob, metadata, enqueued_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                upload.id,
                upload.blob,
                serde_json::to_string(&upload.metadata)?,
                to_millis(upload.enqueued_at)
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<PendingUpload>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, blob, metadata, enqueued_at FROM pending_uploads WHERE id = ?1",
                params![id],
                row_to_tuple,
            )
            .optional()?;
        row.map(tuple_to_upload).transpose()
    }

    pub fn list(&self) -> Result<Vec<PendingUpload>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, blob, metadata, enqueued_at FROM pending_uploads ORDER BY enqueued_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], row_to_tuple)?;
        let mut uploads = Vec::new();
        for row in rows {
            uploads.push(tuple_to_upload(row?)?);
        }
        Ok(uploads)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        Ok(self
            .conn
            .execute("DELETE FROM pending_uploads WHERE id = ?1", params![id])?
            > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pending_uploads", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

type UploadRow = (String, Vec<u8>, String, i64);

fn row_to_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<UploadRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn tuple_to_upload((id, blob, metadata, enqueued_at): UploadRow) -> Result<PendingUpload> {
    Ok(PendingUpload {
        id,
        blob,
        metadata: serde_json::from_str(&metadata)?,
        enqueued_at: from_millis(enqueued_at),
    })
}
