use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use moka::future::Cache;
use serde_json::Value;

use super::traits::{CalendarStore, RecordKind};

/// 进程内黄历缓存，进程退出即丢失
pub struct MemoryCalendarStore {
    cache: Cache<(RecordKind, NaiveDate), Value>,
}

impl MemoryCalendarStore {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).build(),
        }
    }
}

#[async_trait]
impl CalendarStore for MemoryCalendarStore {
    async fn get(&self, kind: RecordKind, date: NaiveDate) -> Result<Option<Value>> {
        Ok(self.cache.get(&(kind, date)).await)
    }

    async fn put(&self, kind: RecordKind, date: NaiveDate, data: &Value) -> Result<()> {
        self.cache.insert((kind, date), data.clone()).await;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
