//! 本地库初始化 - 由 refinery 管理 schema
//!
//! - Schema 版本 = migrations 文件顺序（V{n}__{name}.sql），编译期嵌入。
//! - 统一入口 `init_db`：pragmas → migrate → 版本校验。
//! - refinery 会跳过已执行的版本，重复打开是幂等的。

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{OfflineSyncError, Result};
use crate::version::SDK_DB_VERSION;

/// refinery 使用的 migration 历史表名
const REFINERY_TABLE: &str = "refinery_schema_history";

const STORE_PRAGMAS: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA foreign_keys=ON;
PRAGMA temp_store=MEMORY;
";

pub fn enable_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(STORE_PRAGMAS.trim())
        .map_err(|e| OfflineSyncError::Database(format!("设置 PRAGMA 失败: {}", e)))?;
    Ok(())
}

/// 执行内置 migrations（编译期嵌入，按版本顺序执行，已执行的跳过）
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| OfflineSyncError::Migration(format!("执行 migration 失败: {}", e)))?;

    let applied = report.applied_migrations();
    if applied.is_empty() {
        debug!("本地库 schema 已是最新，跳过 migration");
    } else {
        for migration in applied {
            info!("✅ 已执行 migration: V{}__{}", migration.version(), migration.name());
        }
    }
    Ok(())
}

/// 读取当前库的 schema 版本；无历史表或空表返回 None
pub fn get_db_migration_version(conn: &Connection) -> Result<Option<i64>> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            [REFINERY_TABLE],
            |row| row.get(0),
        )
        .map_err(|e| OfflineSyncError::Database(format!("查询 {} 失败: {}", REFINERY_TABLE, e)))?;

    if !exists {
        return Ok(None);
    }

    let version: Option<i64> = conn
        .query_row(
            &format!("SELECT MAX(version) FROM {}", REFINERY_TABLE),
            [],
            |row| row.get::<_, Option<i64>>(0),
        )
        .map_err(|e| OfflineSyncError::Database(format!("读取 schema 版本失败: {}", e)))?;

    Ok(version.filter(|&v| v > 0))
}

/// 若库版本高于当前 SDK 支持的最高版本则拒绝打开
fn check_db_version(conn: &Connection) -> Result<()> {
    let Some(v) = get_db_migration_version(conn)? else {
        return Ok(());
    };
    if v > SDK_DB_VERSION {
        return Err(OfflineSyncError::Database(format!(
            "本地库版本 {} 高于当前 SDK 支持的最高版本 {}，请升级后再打开",
            v, SDK_DB_VERSION
        )));
    }
    Ok(())
}

/// 统一初始化入口。版本校验放在 migrate 之前，避免在更新的库上执行旧脚本。
pub fn init_db(conn: &mut Connection) -> Result<()> {
    enable_pragmas(conn)?;
    check_db_version(conn)?;
    run_migrations(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_db_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();
        init_db(&mut conn).unwrap();

        assert_eq!(get_db_migration_version(&conn).unwrap(), Some(SDK_DB_VERSION));

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            let rows = stmt.query_map([], |row| row.get(0)).unwrap();
            rows.map(|r| r.unwrap()).collect()
        };
        for expected in [
            "sync_queue",
            "cache",
            "incidents",
            "audits",
            "risks",
            "documents",
            "compliance_items",
            "user_settings",
            "pending_uploads",
            "dead_letters",
        ] {
            assert!(tables.contains(&expected.to_string()), "缺少表 {}", expected);
        }
    }

    #[test]
    fn test_rejects_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (version, name, applied_on, checksum) VALUES (?1, 'future', '', '0')",
                REFINERY_TABLE
            ),
            [SDK_DB_VERSION + 1],
        )
        .unwrap();

        let err = init_db(&mut conn).unwrap_err();
        assert!(matches!(err, OfflineSyncError::Database(_)));
    }
}
