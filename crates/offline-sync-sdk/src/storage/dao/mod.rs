//! 数据访问层 (DAO) - 每个集合一个专门的操作模块
//!
//! DAO 只做同步的 SQL 读写，借用调用方持有的连接或事务；
//! 加锁、日志和业务规则在上层 manager 中处理。

pub mod cache;
pub mod dead_letter;
pub mod entity;
pub mod settings;
pub mod sync_queue;
pub mod upload;

pub use cache::CacheDao;
pub use dead_letter::DeadLetterDao;
pub use entity::EntityDao;
pub use settings::SettingsDao;
pub use sync_queue::SyncQueueDao;
pub use upload::UploadDao;

use rusqlite::Connection;

use crate::storage::entity_kind::EntityKind;

/// DAO 工厂 - 统一创建各种 DAO 实例
pub struct DaoFactory;

impl DaoFactory {
    pub fn sync_queue_dao(conn: &Connection) -> SyncQueueDao<'_> {
        SyncQueueDao::new(conn)
    }

    pub fn dead_letter_dao(conn: &Connection) -> DeadLetterDao<'_> {
        DeadLetterDao::new(conn)
    }

    pub fn cache_dao(conn: &Connection) -> CacheDao<'_> {
        CacheDao::new(conn)
    }

    pub fn entity_dao(conn: &Connection, kind: EntityKind) -> EntityDao<'_> {
        EntityDao::new(conn, kind)
    }

    pub fn settings_dao(conn: &Connection) -> SettingsDao<'_> {
        SettingsDao::new(conn)
    }

    pub fn upload_dao(conn: &Connection) -> UploadDao<'_> {
        UploadDao::new(conn)
    }
}
