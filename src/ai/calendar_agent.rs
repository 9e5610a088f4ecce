use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use super::ai_service::{AIRequest, ChatCompletion};
use super::prompt_templates::CalendarPrompts;
use crate::almanac::AlmanacService;
use crate::dates::{needs_hour_detail, wants_refresh, DateResolver};
use crate::errors::MCPError;

/// 黄历问答 Agent：解析日期 → 查询黄历 → 结合黄历让大模型回答
pub struct CalendarAgent {
    resolver: Arc<DateResolver>,
    almanac: Arc<AlmanacService>,
    llm: Option<Arc<dyn ChatCompletion>>,
    /// 未配置大模型时提示用户设置的环境变量名
    api_key_var: String,
    prompts: CalendarPrompts,
    temperature: f32,
}

impl CalendarAgent {
    pub fn new(
        resolver: Arc<DateResolver>,
        almanac: Arc<AlmanacService>,
        llm: Option<Arc<dyn ChatCompletion>>,
        api_key_var: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            resolver,
            almanac,
            llm,
            api_key_var: api_key_var.into(),
            prompts: CalendarPrompts::new(),
            temperature,
        }
    }

    pub async fn answer(&self, question: &str, force_refresh: bool) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(MCPError::InvalidParameter("必须提供问题参数".to_string()).into());
        }

        let llm = self.llm.as_ref().ok_or_else(|| {
            MCPError::ConfigError(format!("未设置{}，无法回答黄历问题", self.api_key_var))
        })?;

        let resolved = self.resolver.resolve_question(question).await?;
        let force_refresh = force_refresh || wants_refresh(question);
        let need_hour_info = needs_hour_detail(question);
        info!(
            "🔍 回答黄历问题: date={}, force_refresh={}, need_hour_info={}",
            resolved.date, force_refresh, need_hour_info
        );

        let record = self.almanac.lookup(resolved.date, force_refresh).await?;
        info!("📦 {} 黄历来源: {}，由 {} 生成回答", resolved.date, record.source.label(), llm.model_name());
        let calendar_text = record.to_prompt_text(need_hour_info);

        let request = AIRequest::new(self.prompts.get_answer_user_prompt(
            resolved.date,
            &calendar_text,
            &resolved.question,
            need_hour_info,
        ))
        .with_system(self.prompts.get_answer_system_prompt())
        .with_temperature(self.temperature);

        let response = llm.request(request).await?;
        let answer = response.content.trim().to_string();
        if answer.is_empty() {
            return Err(MCPError::LlmError("大模型返回了空回答".to_string()).into());
        }
        Ok(answer)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ai::AIResponse;
    use crate::almanac::service::tests::CountingSource;
    use crate::dates::FixedClock;
    use crate::storage::MemoryCalendarStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;

    /// 记录收到的请求并回放固定回答
    #[derive(Default)]
    pub(crate) struct EchoModel {
        pub requests: Mutex<Vec<AIRequest>>,
    }

    #[async_trait]
    impl ChatCompletion for EchoModel {
        async fn request(&self, request: AIRequest) -> Result<AIResponse> {
            self.requests.lock().push(request);
            Ok(AIResponse {
                content: "  宜出行，建议午时出发。 ".to_string(),
                model: "echo".to_string(),
                tokens_used: Some(1),
                response_time_ms: 0,
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    fn agent(llm: Option<Arc<EchoModel>>) -> (CalendarAgent, Arc<CountingSource>) {
        let source = Arc::new(CountingSource::default());
        let almanac = Arc::new(AlmanacService::new(source.clone(), Arc::new(MemoryCalendarStore::new(8))));
        let resolver = Arc::new(DateResolver::new(Arc::new(FixedClock(
            NaiveDate::from_ymd_opt(2025, 11, 30).unwrap(),
        ))));
        let llm = llm.map(|m| m as Arc<dyn ChatCompletion>);
        (CalendarAgent::new(resolver, almanac, llm, "DEEPSEEK_API_KEY", 0.7), source)
    }

    #[tokio::test]
    async fn test_answer_grounds_prompt_on_record() {
        let model = Arc::new(EchoModel::default());
        let (agent, source) = agent(Some(model.clone()));

        let answer = agent.answer("明天几点出门比较好？", false).await.unwrap();

        assert_eq!(answer, "宜出行，建议午时出发。");
        assert_eq!(source.day_calls.load(Ordering::SeqCst), 1);
        let requests = model.requests.lock();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].user_message.contains("2025年12月1日"));
        assert!(requests[0].user_message.contains("今日适宜：祭祀"));
        assert!(requests[0].user_message.contains("子时：吉"));
        assert_eq!(requests[0].temperature, Some(0.7));
    }

    #[tokio::test]
    async fn test_refresh_keyword_forces_upstream() {
        let model = Arc::new(EchoModel::default());
        let (agent, source) = agent(Some(model));

        agent.answer("明天宜出行吗", false).await.unwrap();
        agent.answer("明天宜出行吗", false).await.unwrap();
        assert_eq!(source.day_calls.load(Ordering::SeqCst), 1);

        agent.answer("请刷新明天的黄历，宜出行吗", false).await.unwrap();
        assert_eq!(source.day_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_question_and_missing_llm() {
        let (agent_without_llm, _) = agent(None);
        let err = agent_without_llm.answer("   ", false).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<MCPError>(), Some(MCPError::InvalidParameter(_))));

        let err = agent_without_llm.answer("明天宜出行吗", false).await.unwrap_err();
        match err.downcast_ref::<MCPError>() {
            Some(MCPError::ConfigError(msg)) => assert!(msg.contains("DEEPSEEK_API_KEY")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_question_without_date_is_defined_error() {
        let (agent, source) = agent(Some(Arc::new(EchoModel::default())));
        let err = agent.answer("适合搬家吗", false).await.unwrap_err();

        assert!(matches!(err.downcast_ref::<MCPError>(), Some(MCPError::DateNotFound(_))));
        assert_eq!(source.day_calls.load(Ordering::SeqCst), 0);
    }
}
