use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{LlmConfig, WireFormat};
use crate::errors::MCPError;

/// AI请求参数
#[derive(Debug, Clone, Default)]
pub struct AIRequest {
    /// 系统提示
    pub system_prompt: Option<String>,
    /// 用户消息
    pub user_message: String,
    /// 温度参数
    pub temperature: Option<f32>,
}

impl AIRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn messages(&self) -> Vec<Value> {
        let mut messages = Vec::new();
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(json!({"role": "system", "content": system_prompt}));
        }
        messages.push(json!({"role": "user", "content": self.user_message}));
        messages
    }
}

/// AI响应结果
#[derive(Debug, Clone)]
pub struct AIResponse {
    /// 响应内容
    pub content: String,
    /// 使用的模型
    pub model: String,
    /// 消耗的token数
    pub tokens_used: Option<u32>,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
}

/// 对话补全接口
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn request(&self, request: AIRequest) -> Result<AIResponse>;

    fn model_name(&self) -> &str;
}

/// 单次请求失败的分类：客户端错误（4xx，429除外）不重试
enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

/// 大模型 HTTP 客户端
#[derive(Clone)]
pub struct AIService {
    config: LlmConfig,
    api_key: String,
    client: Client,
    retry_backoff: Duration,
}

impl AIService {
    /// 创建新的AI服务实例；未配置密钥时返回配置错误
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            MCPError::ConfigError(format!("需要设置{}环境变量", config.api_key_var()))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!("🤖 初始化AI服务");
        info!("API Base: {}", config.api_base);
        info!("默认模型: {}", config.model);

        Ok(Self {
            config,
            api_key,
            client,
            retry_backoff: Duration::from_millis(1000),
        })
    }

    /// 第 n 次失败后等待 `backoff * n`
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    fn endpoint(&self) -> String {
        match self.config.provider.wire_format() {
            WireFormat::OpenAiCompatible => format!("{}/chat/completions", self.config.api_base),
            WireFormat::DashScope => {
                format!("{}/services/aigc/text-generation/generation", self.config.api_base)
            }
        }
    }

    fn build_body(&self, request: &AIRequest, model: &str) -> Value {
        match self.config.provider.wire_format() {
            WireFormat::OpenAiCompatible => {
                let mut body = json!({
                    "model": model,
                    "messages": request.messages(),
                    "stream": false
                });
                if let Some(temperature) = request.temperature {
                    body["temperature"] = json!(temperature);
                }
                body
            }
            WireFormat::DashScope => {
                let mut parameters = json!({"result_format": "message"});
                if let Some(temperature) = request.temperature {
                    parameters["temperature"] = json!(temperature);
                }
                json!({
                    "model": model,
                    "input": {"messages": request.messages()},
                    "parameters": parameters
                })
            }
        }
    }

    fn parse_response(&self, body: &Value) -> Result<(String, Option<u32>)> {
        let choices = match self.config.provider.wire_format() {
            WireFormat::OpenAiCompatible => body.get("choices"),
            WireFormat::DashScope => body.get("output").and_then(|o| o.get("choices")),
        };

        let content = choices
            .and_then(|choices| choices.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| MCPError::LlmError(format!("无效的AI响应格式: {}", body)))?
            .to_string();

        let tokens_used = body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(|tokens| tokens.as_u64())
            .map(|t| t as u32);

        Ok((content, tokens_used))
    }

    /// 带重试的请求发送
    async fn send_request_with_retry(&self, request: &AIRequest) -> Result<AIResponse> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_retries {
            match self.send_single_request(request).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!("✅ AI请求重试成功 (第{}次尝试)", attempt);
                    }
                    return Ok(response);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) => {
                    if attempt < self.config.max_retries {
                        warn!("⚠️ AI请求失败，将重试 (第{}次尝试): {}", attempt, e);
                        tokio::time::sleep(self.retry_backoff * attempt).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| MCPError::LlmError("AI请求未执行".to_string()).into()))
    }

    /// 发送单次请求
    async fn send_single_request(&self, request: &AIRequest) -> std::result::Result<AIResponse, AttemptError> {
        let model = self.config.model.as_str();
        let body = self.build_body(request, model);

        let mut builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body);
        for (name, value) in &self.config.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Retryable(MCPError::Timeout(format!("调用{}超时", self.config.provider.name())).into())
            } else {
                AttemptError::Retryable(MCPError::LlmError(format!("调用{} API时出错: {}", self.config.provider.name(), e)).into())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let err: anyhow::Error =
                MCPError::LlmError(format!("AI API调用失败: {} - {}", status, error_text)).into();
            return if status.is_client_error() && status.as_u16() != 429 {
                Err(AttemptError::Fatal(err))
            } else {
                Err(AttemptError::Retryable(err))
            };
        }

        let response_json: Value = response.json().await.map_err(|e| {
            AttemptError::Retryable(MCPError::LlmError(format!("AI响应不是合法JSON: {}", e)).into())
        })?;
        let (content, tokens_used) = self.parse_response(&response_json).map_err(AttemptError::Fatal)?;

        Ok(AIResponse {
            content,
            model: model.to_string(),
            tokens_used,
            response_time_ms: 0,
        })
    }
}

#[async_trait]
impl ChatCompletion for AIService {
    async fn request(&self, request: AIRequest) -> Result<AIResponse> {
        let start_time = Instant::now();
        let response = self.send_request_with_retry(&request).await?;
        let elapsed = start_time.elapsed().as_millis() as u64;
        debug!("🤖 AI请求完成，耗时: {}ms", elapsed);

        Ok(AIResponse {
            response_time_ms: elapsed,
            ..response
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
