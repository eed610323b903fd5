//! 设置 DAO - user_settings 表

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::storage::entities::UserSetting;

pub struct SettingsDao<'a> {
    conn: &'a Connection,
}

impl<'a> SettingsDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, setting: &UserSetting) -> Result<()> {
        self.conn.execute(
            "INSERT INTO user_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![setting.key, serde_json::to_string(&setting.value)?],
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<UserSetting>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM user_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            Some(value) => Ok(Some(UserSetting {
                key: key.to_string(),
                value: serde_json::from_str(&value)?,
            })),
            None => Ok(None),
        }
    }

    pub fn list(&self) -> Result<Vec<UserSetting>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM user_settings ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut settings = Vec::new();
        for row in rows {
            let (key, value) = row?;
            settings.push(UserSetting {
                key,
                value: serde_json::from_str(&value)?,
            });
        }
        Ok(settings)
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .conn
            .execute("DELETE FROM user_settings WHERE key = ?1", params![key])?
            > 0)
    }
}
