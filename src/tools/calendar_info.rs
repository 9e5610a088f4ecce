use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::base::{optional_bool, required_str, MCPTool, Schema, SchemaBoolean, SchemaObject, SchemaString};
use crate::almanac::AlmanacService;
use crate::dates::DateResolver;

/// 查询某一天的完整黄历（日维度 + 时辰维度）
pub struct GetCalendarInfoTool {
    resolver: Arc<DateResolver>,
    almanac: Arc<AlmanacService>,
}

impl GetCalendarInfoTool {
    pub fn new(resolver: Arc<DateResolver>, almanac: Arc<AlmanacService>) -> Self {
        Self { resolver, almanac }
    }
}

#[async_trait]
impl MCPTool for GetCalendarInfoTool {
    fn name(&self) -> &str {
        "get_calendar_info"
    }

    fn description(&self) -> &str {
        "获取指定日期的黄历信息，包括日维度（宜忌、干支、五行、冲煞、吉神方位等）和十二时辰的吉凶宜忌。\
         支持具体日期（如2025-12-01）和相对日期（今天、明天、后天、大后天等）。"
    }

    fn parameters_schema(&self) -> &Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            let mut properties = BTreeMap::new();
            properties.insert(
                "date".to_string(),
                Schema::String(SchemaString {
                    description: Some(
                        "要查询的日期，可以是具体日期（如2025-12-01）或相对日期（如今天、明天、后天）".to_string(),
                    ),
                    ..Default::default()
                }),
            );
            properties.insert(
                "force_refresh".to_string(),
                Schema::Boolean(SchemaBoolean {
                    description: Some("是否跳过缓存，强制从黄历接口获取最新数据".to_string()),
                    default: Some(false),
                }),
            );
            Schema::Object(SchemaObject {
                required: vec!["date".to_string()],
                properties,
                ..Default::default()
            })
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let expr = required_str(&params, "date")?;
        let force_refresh = optional_bool(&params, "force_refresh")?;

        let date = self.resolver.resolve_date(expr).await?;
        info!("📅 查询黄历: {} -> {}, force_refresh={}", expr, date, force_refresh);

        let record = self.almanac.lookup(date, force_refresh).await?;
        info!("📦 {} 黄历来源: {}", date, record.source.label());
        Ok(Value::String(record.to_json_pretty()))
    }
}
