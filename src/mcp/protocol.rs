// MCP协议定义（JSON-RPC 2.0）
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 服务器支持的最新协议版本
pub const MCP_VERSION: &str = "2025-03-26";

/// 可与客户端协商的协议版本
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP 请求；没有 `id` 的是通知，不需要响应
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// MCP 响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

/// MCP 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// `initialize` 的参数，只关心客户端请求的协议版本和身份
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// MCP 初始化结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: Value,
    pub server_info: ServerInfo,
}

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Response {
    /// 创建一个成功响应
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// 创建一个错误响应
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(ErrorResponse {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// 协商协议版本：客户端请求的版本受支持时原样返回，否则返回最新版本
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|v| SUPPORTED_VERSIONS.iter().find(|s| **s == v).copied())
        .unwrap_or(MCP_VERSION)
}

// 错误代码定义
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_creation() {
        let resp = Response::success(json!(1), json!({"status": "ok"}));
        assert_eq!(resp.id, json!(1));
        assert!(resp.error.is_none());

        let err_resp = Response::error(json!("req-2"), error_codes::INVALID_REQUEST, "Invalid request");
        let value = serde_json::to_value(&err_resp).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["error"]["code"], -32600);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_notification_has_no_id() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(req.is_notification());
        assert!(req.params.is_null());
    }

    #[test]
    fn test_negotiate_version() {
        assert_eq!(negotiate_version(Some("2024-11-05")), "2024-11-05");
        assert_eq!(negotiate_version(Some("1999-01-01")), MCP_VERSION);
        assert_eq!(negotiate_version(None), MCP_VERSION);
    }
}
