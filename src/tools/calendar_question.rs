use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::base::{optional_bool, required_str, MCPTool, Schema, SchemaBoolean, SchemaObject, SchemaString};
use crate::ai::CalendarAgent;

/// 结合黄历回答自然语言问题
pub struct AnswerCalendarQuestionTool {
    agent: Arc<CalendarAgent>,
}

impl AnswerCalendarQuestionTool {
    pub fn new(agent: Arc<CalendarAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl MCPTool for AnswerCalendarQuestionTool {
    fn name(&self) -> &str {
        "answer_calendar_question"
    }

    fn description(&self) -> &str {
        "根据黄历信息回答用户的问题，例如某天是否适合出行、搬家、结婚，幸运颜色、吉时、财神方位等。\
         问题中需要包含具体日期（如2025-12-01）或相对日期（今天、明天、后天等）。"
    }

    fn parameters_schema(&self) -> &Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            let mut properties = BTreeMap::new();
            properties.insert(
                "question".to_string(),
                Schema::String(SchemaString {
                    description: Some("用户的问题，如：明天适合出行吗？后天的幸运颜色是什么？".to_string()),
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
                required: vec!["question".to_string()],
                properties,
                ..Default::default()
            })
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let question = required_str(&params, "question")?;
        let force_refresh = optional_bool(&params, "force_refresh")?;

        let answer = self.agent.answer(question, force_refresh).await?;
        Ok(Value::String(answer))
    }
}
