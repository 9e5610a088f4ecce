//! # Cardcaptor Calendar
//!
//! 一个基于 MCP (Model Context Protocol) 的黄历服务，通过 stdio 为 LLM 客户端提供两个工具。
//!
//! ## 特性
//!
//! - 📅 **黄历查询** - `get_calendar_info`：按具体日期或相对日期返回日维度与十二时辰的黄历
//! - 💬 **黄历问答** - `answer_calendar_question`：结合当天黄历，由大模型回答宜忌、吉时、方位等问题
//! - 💾 **本地缓存** - 黄历数据写入 SQLite，重复查询不再请求上游接口
//! - 🚀 **MCP协议** - 换行分隔的 JSON-RPC 2.0，支持 stdio 模式通信
//!
//! ## 快速开始
//!
//! ```no_run
//! use cardcaptor_calendar::{app::AppContext, config::{project_root, AppConfig}};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let root = project_root(None);
//! let ctx = AppContext::from_config(AppConfig::load(None, &root)?)?;
//! let mut server = ctx.build_server().await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod ai;
pub mod almanac;
pub mod app;
pub mod config;
pub mod dates;
pub mod errors;
pub mod logging;
pub mod mcp;
pub mod storage;
pub mod tools;

pub use errors::{MCPError, Result};

// Re-export commonly used types
pub use async_trait::async_trait;
pub use serde_json::{json, Value};
