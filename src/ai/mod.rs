/// AI服务模块
///
/// 提供基于大模型的能力：
/// 1. 大模型客户端 - OpenAI 兼容接口与通义千问原生接口
/// 2. 提示词模板 - 日期改写与黄历问答
/// 3. 黄历问答 Agent - 结合黄历数据回答用户问题

pub mod ai_service;
pub mod calendar_agent;
pub mod prompt_templates;

pub use ai_service::*;
pub use calendar_agent::CalendarAgent;
pub use prompt_templates::{is_no_date_reply, CalendarPrompts, NO_DATE_MARKER, NO_DATE_SENTINEL};
