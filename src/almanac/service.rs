use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use super::client::AlmanacSource;
use super::models::{AlmanacRecord, RecordSource};
use crate::storage::{date_key, CalendarStore, RecordKind};

/// 缓存优先的黄历查询
///
/// 缓存中日维度与时辰维度都存在时直接返回；否则只补拉缺失的维度。
/// `force_refresh` 跳过缓存读取，两个维度都重新拉取并覆盖缓存。
pub struct AlmanacService {
    source: Arc<dyn AlmanacSource>,
    store: Arc<dyn CalendarStore>,
}

impl AlmanacService {
    pub fn new(source: Arc<dyn AlmanacSource>, store: Arc<dyn CalendarStore>) -> Self {
        Self { source, store }
    }

    pub fn store(&self) -> &Arc<dyn CalendarStore> {
        &self.store
    }

    pub async fn lookup(&self, date: NaiveDate, force_refresh: bool) -> Result<AlmanacRecord> {
        let key = date_key(date);

        let (cached_day, cached_hour) = if force_refresh {
            info!("🔄 强制刷新，从API获取最新黄历信息: {}", key);
            (None, None)
        } else {
            (
                self.read_cache(RecordKind::Day, date).await,
                self.read_cache(RecordKind::Hour, date).await,
            )
        };

        if let (Some(day_info), Some(hour_info)) = (&cached_day, &cached_hour) {
            info!("💾 从数据库获取黄历信息: {}", key);
            return Ok(AlmanacRecord {
                date,
                day_info: day_info.clone(),
                hour_info: hour_info.clone(),
                source: RecordSource::Cache,
            });
        }

        if !force_refresh {
            info!("📡 数据库中没有完整数据，从API获取: {}", key);
        }
        let from_cache = cached_day.is_some() || cached_hour.is_some();

        let day_info = match cached_day {
            Some(value) => value,
            None => self.fetch_and_store(RecordKind::Day, date).await?,
        };
        let hour_info = match cached_hour {
            Some(value) => value,
            None => self.fetch_and_store(RecordKind::Hour, date).await?,
        };

        Ok(AlmanacRecord {
            date,
            day_info,
            hour_info,
            source: if from_cache { RecordSource::Mixed } else { RecordSource::Upstream },
        })
    }

    /// 读缓存失败按未命中处理
    async fn read_cache(&self, kind: RecordKind, date: NaiveDate) -> Option<Value> {
        match self.store.get(kind, date).await {
            Ok(value) => value,
            Err(e) => {
                warn!("⚠️ 查询{}黄历缓存失败，改为从API获取: {}", kind.label(), e);
                None
            }
        }
    }

    /// 拉取后写缓存；写缓存失败只记录日志
    async fn fetch_and_store(&self, kind: RecordKind, date: NaiveDate) -> Result<Value> {
        let data = match kind {
            RecordKind::Day => self.source.fetch_day(date).await?,
            RecordKind::Hour => self.source.fetch_hours(date).await?,
        };
        info!("{}-{}: {}", kind.label(), date_key(date), data);

        if let Err(e) = self.store.put(kind, date, &data).await {
            warn!("⚠️ 保存{}黄历信息失败: {}", kind.label(), e);
        }
        Ok(data)
    }
}
