pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;
pub mod traits;

use std::sync::Arc;

use anyhow::Result;
#[cfg(not(feature = "database"))]
use tracing::warn;

use crate::config::{CacheBackend, StorageConfig};

pub use memory::MemoryCalendarStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteCalendarStore;
pub use traits::{date_key, CalendarStore, RecordKind};

/// 按配置创建缓存存储
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn CalendarStore>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCalendarStore::new(config.memory_capacity))),
        #[cfg(feature = "database")]
        CacheBackend::Sqlite => Ok(Arc::new(SqliteCalendarStore::open(&config.db_path)?)),
        #[cfg(not(feature = "database"))]
        CacheBackend::Sqlite => {
            warn!("⚠️ 未启用 database 特性，改用内存缓存");
            Ok(Arc::new(MemoryCalendarStore::new(config.memory_capacity)))
        }
    }
}
