use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

/// 黄历数据的维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// 日维度（宜忌、干支、方位等）
    Day,
    /// 时辰维度（十二时辰吉凶）
    Hour,
}

impl RecordKind {
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Day => "day_calendar",
            RecordKind::Hour => "hour_calendar",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Day => "日维度",
            RecordKind::Hour => "小时维度",
        }
    }
}

/// 缓存键使用的日期格式
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// 黄历缓存接口
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// 读取某日某维度的数据，不存在时返回 `None`
    async fn get(&self, kind: RecordKind, date: NaiveDate) -> Result<Option<Value>>;

    /// 写入（或覆盖）某日某维度的数据
    async fn put(&self, kind: RecordKind, date: NaiveDate, data: &Value) -> Result<()>;

    /// 检查存储是否健康
    async fn health_check(&self) -> Result<bool>;

    /// 存储名称，用于日志
    fn name(&self) -> &str;
}
