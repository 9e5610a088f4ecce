use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use cardcaptor_calendar::ai::{AIRequest, AIResponse, CalendarAgent, ChatCompletion};
use cardcaptor_calendar::almanac::{AlmanacService, AlmanacSource};
use cardcaptor_calendar::dates::{DateResolver, FixedClock};
use cardcaptor_calendar::mcp::{error_codes, MCPServer, Server};
use cardcaptor_calendar::storage::MemoryCalendarStore;
use cardcaptor_calendar::tools::{AnswerCalendarQuestionTool, GetCalendarInfoTool};

/// 计数的假黄历接口
#[derive(Default)]
struct FakeAlmanac {
    day_calls: AtomicUsize,
    hour_calls: AtomicUsize,
}

#[async_trait]
impl AlmanacSource for FakeAlmanac {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Value> {
        self.day_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "code": 200,
            "ynian": date.format("%Y").to_string(),
            "yyue": date.format("%-m").to_string(),
            "yri": date.format("%-d").to_string(),
            "yi": "祭祀 出行 会亲友",
            "ji": "动土"
        }))
    }

    async fn fetch_hours(&self, _date: NaiveDate) -> Result<Value> {
        self.hour_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"code": 200, "zi0": "子", "zi1": "吉", "wu0": "午", "wu1": "凶"}))
    }
}

/// 日期改写时把"平安夜"换成具体日期，回答时给出固定文本
struct FakeModel;

#[async_trait]
impl ChatCompletion for FakeModel {
    async fn request(&self, request: AIRequest) -> Result<AIResponse> {
        let is_rewrite = request
            .system_prompt
            .as_deref()
            .map(|p| p.contains("日期转换助手"))
            .unwrap_or(false);
        let content = if is_rewrite {
            "2025-12-24适合聚会吗？".to_string()
        } else {
            "宜会亲友，适合聚会。".to_string()
        };
        Ok(AIResponse {
            content,
            model: "fake".to_string(),
            tokens_used: None,
            response_time_ms: 1,
        })
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

struct TestClient {
    writer: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
}

impl TestClient {
    async fn send(&mut self, message: &str) {
        self.writer.write_all(message.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("响应超时")
            .unwrap()
            .expect("服务器提前关闭");
        serde_json::from_str(&line).unwrap()
    }

    async fn request(&mut self, message: Value) -> Value {
        self.send(&message.to_string()).await;
        self.recv().await
    }

    async fn call_tool(&mut self, id: u64, name: &str, arguments: Value) -> Value {
        let resp = self
            .request(json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "tools/call",
                "params": {"name": name, "arguments": arguments}
            }))
            .await;
        assert_eq!(resp["id"], id);
        resp["result"].clone()
    }
}

async fn start() -> (TestClient, Arc<FakeAlmanac>, JoinHandle<Result<()>>) {
    let source = Arc::new(FakeAlmanac::default());
    let almanac = Arc::new(AlmanacService::new(source.clone(), Arc::new(MemoryCalendarStore::new(64))));
    let llm: Arc<dyn ChatCompletion> = Arc::new(FakeModel);
    let resolver = Arc::new(
        DateResolver::new(Arc::new(FixedClock(NaiveDate::from_ymd_opt(2025, 11, 30).unwrap())))
            .with_rewriter(llm.clone(), 0.3),
    );
    let agent = Arc::new(CalendarAgent::new(
        resolver.clone(),
        almanac.clone(),
        Some(llm),
        "DEEPSEEK_API_KEY",
        0.7,
    ));

    let registry = MCPServer::new();
    registry
        .register_tool(Box::new(GetCalendarInfoTool::new(resolver, almanac)))
        .await
        .unwrap();
    registry
        .register_tool(Box::new(AnswerCalendarQuestionTool::new(agent)))
        .await
        .unwrap();
    let mut server = Server::new("cardcaptor-calendar".to_string(), "0.1.0".to_string(), registry);

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let handle = tokio::spawn(async move { server.run_with(BufReader::new(server_read), server_write).await });

    let (client_read, client_write) = tokio::io::split(client_io);
    let client = TestClient {
        writer: client_write,
        lines: BufReader::new(client_read).lines(),
    };
    (client, source, handle)
}

async fn initialize(client: &mut TestClient) {
    let resp = client
        .request(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "clientInfo": {"name": "test-client", "version": "1.0.0"},
                "capabilities": {}
            }
        }))
        .await;
    assert_eq!(resp["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(resp["result"]["serverInfo"]["name"], "cardcaptor-calendar");
    client
        .send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
}

#[tokio::test]
async fn test_tools_are_listed_with_schemas() {
    let (mut client, _, handle) = start().await;
    initialize(&mut client).await;

    let resp = client.request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
    let tools = resp["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);

    let info = &tools[0];
    assert_eq!(info["name"], "get_calendar_info");
    assert_eq!(info["inputSchema"]["required"], json!(["date"]));
    assert_eq!(info["inputSchema"]["properties"]["force_refresh"]["type"], "boolean");
    assert_eq!(info["inputSchema"]["properties"]["force_refresh"]["default"], false);

    let ask = &tools[1];
    assert_eq!(ask["name"], "answer_calendar_question");
    assert_eq!(ask["inputSchema"]["required"], json!(["question"]));

    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_calendar_info_caches_until_forced() {
    let (mut client, source, handle) = start().await;
    initialize(&mut client).await;

    let result = client.call_tool(1, "get_calendar_info", json!({"date": "明天"})).await;
    assert_eq!(result["isError"], false);
    let record: Value = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(record["day_info"]["yri"], "1");
    assert_eq!(record["hour_info"]["zi1"], "吉");

    client.call_tool(2, "get_calendar_info", json!({"date": "2025-12-01"})).await;
    assert_eq!(source.day_calls.load(Ordering::SeqCst), 1);

    client
        .call_tool(3, "get_calendar_info", json!({"date": "2025-12-01", "force_refresh": true}))
        .await;
    assert_eq!(source.day_calls.load(Ordering::SeqCst), 2);
    assert_eq!(source.hour_calls.load(Ordering::SeqCst), 2);

    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_question_with_festival_is_rewritten_and_answered() {
    let (mut client, source, handle) = start().await;
    initialize(&mut client).await;

    let result = client
        .call_tool(1, "answer_calendar_question", json!({"question": "平安夜适合聚会吗？"}))
        .await;
    assert_eq!(result["isError"], false);
    assert_eq!(result["content"][0]["text"], "宜会亲友，适合聚会。");
    assert_eq!(source.day_calls.load(Ordering::SeqCst), 1);

    let cached = client
        .call_tool(2, "get_calendar_info", json!({"date": "2025-12-24"}))
        .await;
    assert_eq!(cached["isError"], false);
    assert_eq!(source.day_calls.load(Ordering::SeqCst), 1);

    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_tool_errors_are_results_not_protocol_errors() {
    let (mut client, source, handle) = start().await;
    initialize(&mut client).await;

    let empty = client.call_tool(1, "answer_calendar_question", json!({"question": "  "})).await;
    assert_eq!(empty["isError"], true);
    assert!(empty["content"][0]["text"].as_str().unwrap().starts_with("[INVALID_PARAMETER]"));

    let bad_flag = client
        .call_tool(2, "get_calendar_info", json!({"date": "今天", "force_refresh": "yes"}))
        .await;
    assert_eq!(bad_flag["isError"], true);
    assert!(bad_flag["content"][0]["text"].as_str().unwrap().contains("force_refresh"));

    let bad_date = client.call_tool(3, "get_calendar_info", json!({"date": "2025-13-01"})).await;
    assert_eq!(bad_date["isError"], true);
    assert!(bad_date["content"][0]["text"].as_str().unwrap().starts_with("[INVALID_DATE]"));

    assert_eq!(source.day_calls.load(Ordering::SeqCst), 0);

    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_protocol_errors_keep_the_loop_alive() {
    let (mut client, _, handle) = start().await;

    let early = client.request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
    assert_eq!(early["error"]["code"], error_codes::INVALID_REQUEST);

    initialize(&mut client).await;

    client.send("{this is not json").await;
    let parse_error = client.recv().await;
    assert_eq!(parse_error["error"]["code"], error_codes::PARSE_ERROR);
    assert!(parse_error["id"].is_null());

    let unknown_tool = client
        .request(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "get_weather", "arguments": {}}
        }))
        .await;
    assert_eq!(unknown_tool["error"]["code"], error_codes::INVALID_PARAMS);

    let unknown_method = client.request(json!({"jsonrpc": "2.0", "id": 3, "method": "prompts/list"})).await;
    assert_eq!(unknown_method["error"]["code"], error_codes::METHOD_NOT_FOUND);

    let pong = client.request(json!({"jsonrpc": "2.0", "id": 4, "method": "ping"})).await;
    assert_eq!(pong["result"], json!({}));

    let shutdown = client.request(json!({"jsonrpc": "2.0", "id": 5, "method": "shutdown"})).await;
    assert!(shutdown["result"].is_null());
    let after = client.request(json!({"jsonrpc": "2.0", "id": 6, "method": "tools/list"})).await;
    assert_eq!(after["error"]["code"], error_codes::INVALID_REQUEST);

    drop(client);
    handle.await.unwrap().unwrap();
}
