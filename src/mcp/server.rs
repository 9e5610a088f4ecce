use std::time::Instant;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::protocol::{
    error_codes, negotiate_version, InitializeParams, InitializeResult, Request, Response, ServerInfo,
};
use crate::errors::{describe_error, MCPError};
use crate::tools::base::MCPTool;

/// 工具信息结构
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具注册表
pub struct MCPServer {
    tools: RwLock<Vec<Box<dyn MCPTool>>>,
}

impl Default for MCPServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MCPServer {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(Vec::new()),
        }
    }

    /// 注册工具，同名工具不允许重复注册
    pub async fn register_tool(&self, tool: Box<dyn MCPTool>) -> Result<()> {
        let mut tools = self.tools.write().await;
        if tools.iter().any(|t| t.name() == tool.name()) {
            return Err(MCPError::ServerError(format!("工具已注册: {}", tool.name())).into());
        }
        tools.push(tool);
        Ok(())
    }

    pub async fn has_tool(&self, tool_name: &str) -> bool {
        self.tools.read().await.iter().any(|t| t.name() == tool_name)
    }

    /// 校验参数后执行工具
    pub async fn execute_tool(&self, tool_name: &str, params: Value) -> Result<Value> {
        let tools = self.tools.read().await;
        let tool = tools
            .iter()
            .find(|t| t.name() == tool_name)
            .ok_or_else(|| MCPError::NotFound(format!("工具不存在: {}", tool_name)))?;

        tool.validate_params(&params)?;
        tool.execute(params).await
    }

    /// 获取所有工具列表
    pub async fn list_tools(&self) -> Vec<ToolInfo> {
        let tools = self.tools.read().await;
        tools
            .iter()
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema().to_json_schema(),
            })
            .collect()
    }

    /// 获取工具数量
    pub async fn get_tool_count(&self) -> usize {
        self.tools.read().await.len()
    }
}

/// 基于换行分隔 JSON-RPC 的 MCP 服务器
pub struct Server {
    /// 服务器名称
    name: String,
    /// 服务器版本
    version: String,
    /// 是否已初始化
    initialized: bool,
    registry: MCPServer,
}

impl Server {
    /// 创建新的 MCP 服务器实例
    pub fn new(name: String, version: String, registry: MCPServer) -> Self {
        Self {
            name,
            version,
            initialized: false,
            registry,
        }
    }

    pub fn registry(&self) -> &MCPServer {
        &self.registry
    }

    /// 在 stdin/stdout 上运行服务器；日志只写 stderr
    pub async fn run(&mut self) -> Result<()> {
        self.run_with(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
    }

    /// 在任意读写流上运行服务器，直到读到 EOF
    pub async fn run_with<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("🔧 MCP服务器已启动，等待请求...");

        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("📡 客户端断开连接");
                    break;
                }
                Ok(n) => debug!("📥 收到 {} 字节数据: {}", n, line.trim()),
                Err(e) => {
                    warn!("❌ 读取请求失败: {}", e);
                    break;
                }
            }

            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line).await {
                let response_json = serde_json::to_string(&response)?;
                debug!("📤 发送响应: {}", response_json);
                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!("👋 MCP服务器关闭");
        Ok(())
    }

    /// 处理一行原始输入；通知不产生响应
    pub async fn handle_line(&mut self, line: &str) -> Option<Response> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("❌ 请求解析失败: {}", e);
                return Some(Response::error(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<Request>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(Response::error(
                id,
                error_codes::INVALID_REQUEST,
                format!("Invalid request: {}", e),
            )),
        }
    }

    /// 处理 MCP 请求
    pub async fn handle_request(&mut self, request: Request) -> Option<Response> {
        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        debug!("🔄 处理请求: {}", request.method);
        let response = match request.method.as_str() {
            "initialize" => {
                if self.initialized {
                    return Some(Response::error(id, error_codes::INVALID_REQUEST, "Server already initialized"));
                }
                match self.handle_initialize(&request.params) {
                    Ok(result) => {
                        self.initialized = true;
                        Response::success(id, result)
                    }
                    Err(e) => Response::error(id, error_codes::INVALID_PARAMS, e.to_string()),
                }
            }
            "ping" => Response::success(id, json!({})),
            _ if !self.initialized => {
                Response::error(id, error_codes::INVALID_REQUEST, "Server not initialized")
            }
            "shutdown" => {
                self.initialized = false;
                info!("🛑 客户端请求关闭会话");
                Response::success(id, Value::Null)
            }
            "tools/list" => self.handle_list_tools(id).await,
            "tools/call" => self.handle_tool_call(id, &request.params).await,
            _ => Response::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_notification(&self, request: &Request) {
        match request.method.as_str() {
            "notifications/initialized" => info!("🤝 客户端初始化完成"),
            other => debug!("忽略通知: {}", other),
        }
    }

    /// 处理初始化请求
    fn handle_initialize(&self, params: &Value) -> Result<Value> {
        let params: InitializeParams = if params.is_null() {
            InitializeParams::default()
        } else {
            serde_json::from_value(params.clone())?
        };

        if let Some(client) = &params.client_info {
            info!("Client connected: {} {}", client.name, client.version);
        }

        let result = InitializeResult {
            protocol_version: negotiate_version(params.protocol_version.as_deref()).to_string(),
            capabilities: json!({"tools": {"listChanged": false}}),
            server_info: ServerInfo {
                name: self.name.clone(),
                version: self.version.clone(),
            },
        };
        Ok(serde_json::to_value(result)?)
    }

    /// 处理工具列表请求
    async fn handle_list_tools(&self, id: Value) -> Response {
        let tool_list: Vec<Value> = self
            .registry
            .list_tools()
            .await
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.parameters
                })
            })
            .collect();

        Response::success(id, json!({ "tools": tool_list }))
    }

    /// 处理工具调用请求；工具自身的失败以 isError 结果返回
    async fn handle_tool_call(&self, id: Value, params: &Value) -> Response {
        let tool_name = match params.get("name").and_then(|v| v.as_str()) {
            Some(name) => name,
            None => return Response::error(id, error_codes::INVALID_PARAMS, "Missing tool name"),
        };
        if !self.registry.has_tool(tool_name).await {
            return Response::error(id, error_codes::INVALID_PARAMS, format!("Unknown tool: {}", tool_name));
        }

        let arguments = params
            .get("arguments")
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| json!({}));

        let trace_id = Uuid::new_v4();
        let span = info_span!("tool_call", trace_id = %trace_id, tool = %tool_name);
        let outcome = async {
            info!("🔧 调用工具: {}", arguments);
            let start = Instant::now();
            let outcome = self.registry.execute_tool(tool_name, arguments).await;
            match &outcome {
                Ok(_) => info!("✅ 工具执行完成，耗时 {}ms", start.elapsed().as_millis()),
                Err(e) => {
                    let recoverable = e.downcast_ref::<MCPError>().map_or(false, MCPError::is_recoverable);
                    warn!(recoverable, "❌ 工具执行失败: {:#}", e)
                }
            }
            outcome
        }
        .instrument(span)
        .await;

        let (text, is_error) = match outcome {
            Ok(Value::String(text)) => (text, false),
            Ok(other) => (
                serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
                false,
            ),
            Err(e) => (describe_error(&e), true),
        };

        Response::success(
            id,
            json!({
                "content": [{"type": "text", "text": text}],
                "isError": is_error
            }),
        )
    }
}
