use thiserror::Error;

pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MCPError {
    #[error("参数无效: {0}")]
    InvalidParameter(String),

    #[error("日期无效: {0}")]
    InvalidDate(String),

    #[error("无法识别日期: {0}")]
    DateNotFound(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("黄历接口错误: {0}")]
    UpstreamError(String),

    #[error("大模型调用错误: {0}")]
    LlmError(String),

    #[error("缓存错误: {0}")]
    CacheError(String),

    #[error("请求超时: {0}")]
    Timeout(String),

    #[error("服务器错误: {0}")]
    ServerError(String),
}

impl MCPError {
    pub fn error_code(&self) -> &'static str {
        match self {
            MCPError::InvalidParameter(_) => "INVALID_PARAMETER",
            MCPError::InvalidDate(_) => "INVALID_DATE",
            MCPError::DateNotFound(_) => "DATE_NOT_FOUND",
            MCPError::NotFound(_) => "NOT_FOUND",
            MCPError::ConfigError(_) => "CONFIG_ERROR",
            MCPError::UpstreamError(_) => "UPSTREAM_ERROR",
            MCPError::LlmError(_) => "LLM_ERROR",
            MCPError::CacheError(_) => "CACHE_ERROR",
            MCPError::Timeout(_) => "TIMEOUT",
            MCPError::ServerError(_) => "SERVER_ERROR",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            MCPError::InvalidParameter(_) => "请检查参数格式并确保所有必需参数都已提供",
            MCPError::InvalidDate(_) => "请确认日期真实存在，例如 2025-02-28",
            MCPError::DateNotFound(_) => "请输入具体的时间日期或相对日期，如2025-12-01或今天、明天等",
            MCPError::NotFound(_) => "请检查资源标识符是否正确",
            MCPError::ConfigError(_) => "请检查 configs/.env 中的环境变量是否已正确设置",
            MCPError::UpstreamError(_) => "黄历接口暂时不可用，请稍后重试或使用 force_refresh=false 读取缓存",
            MCPError::LlmError(_) => "请检查大模型 API 密钥、地址与模型名称，稍后重试",
            MCPError::CacheError(_) => "缓存操作失败，请重试",
            MCPError::Timeout(_) => "请检查网络连接，或稍后重试",
            MCPError::ServerError(_) => "请稍后重试，如果问题持续存在请联系管理员",
        }
    }

    /// 检查错误是否可恢复（重试可能成功）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MCPError::UpstreamError(_)
                | MCPError::LlmError(_)
                | MCPError::CacheError(_)
                | MCPError::Timeout(_)
                | MCPError::ServerError(_)
        )
    }

    /// 面向工具调用方的错误文本
    pub fn to_tool_message(&self) -> String {
        format!("[{}] {}\n建议: {}", self.error_code(), self, self.suggestion())
    }
}

/// 把任意错误整理为工具调用方可读的文本，领域错误带上错误码和建议
pub fn describe_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<MCPError>() {
        Some(mcp_error) => mcp_error.to_tool_message(),
        None => format!("[SERVER_ERROR] 处理工具调用时出错: {:#}", err),
    }
}
