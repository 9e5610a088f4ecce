use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::ai::{AIService, CalendarAgent, ChatCompletion};
use crate::almanac::{AlmanacClient, AlmanacService};
use crate::config::AppConfig;
use crate::dates::{DateResolver, LocalClock};
use crate::mcp::{MCPServer, Server};
use crate::storage::open_store;
use crate::tools::{AnswerCalendarQuestionTool, GetCalendarInfoTool, MCPTool};

pub const SERVER_NAME: &str = "cardcaptor-calendar";

/// 进程内共享的服务组件
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub resolver: Arc<DateResolver>,
    pub almanac: Arc<AlmanacService>,
    pub agent: Arc<CalendarAgent>,
}

impl AppContext {
    /// 按配置装配存储、黄历接口与大模型；缺少大模型密钥时只告警
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let config = Arc::new(config);

        let store = open_store(&config.storage)?;
        info!("💾 缓存后端: {}", store.name());

        let source = Arc::new(AlmanacClient::new(config.almanac.clone())?);
        if config.almanac.base_url.is_none() {
            warn!("⚠️ 未设置CALENDAR_BASE_URL，只能返回已缓存的黄历");
        }
        let almanac = Arc::new(AlmanacService::new(source, store));

        let llm: Option<Arc<dyn ChatCompletion>> = match AIService::new(config.llm.clone()) {
            Ok(service) => Some(Arc::new(service)),
            Err(e) => {
                warn!("⚠️ 大模型不可用，问答工具将返回配置错误: {}", e);
                None
            }
        };

        let mut resolver = DateResolver::new(Arc::new(LocalClock));
        if let Some(llm) = &llm {
            resolver = resolver.with_rewriter(llm.clone(), config.llm.question_temperature);
        }
        let resolver = Arc::new(resolver);

        let agent = Arc::new(CalendarAgent::new(
            resolver.clone(),
            almanac.clone(),
            llm,
            config.llm.api_key_var(),
            config.llm.answer_temperature,
        ));

        Ok(Self {
            config,
            resolver,
            almanac,
            agent,
        })
    }

    pub fn tools(&self) -> Vec<Box<dyn MCPTool>> {
        vec![
            Box::new(GetCalendarInfoTool::new(self.resolver.clone(), self.almanac.clone())),
            Box::new(AnswerCalendarQuestionTool::new(self.agent.clone())),
        ]
    }

    /// 启动前检查缓存存储是否可用
    pub async fn check_storage(&self) -> Result<()> {
        let store = self.almanac.store();
        if store.health_check().await? {
            info!("✅ 缓存存储连接正常: {}", store.name());
        } else {
            warn!("⚠️ 缓存存储健康检查未通过: {}", store.name());
        }
        Ok(())
    }

    /// 检查存储、注册全部工具并创建 MCP 服务器
    pub async fn build_server(&self) -> Result<Server> {
        self.check_storage().await?;

        let registry = MCPServer::new();
        for tool in self.tools() {
            let name = tool.name().to_string();
            registry.register_tool(tool).await?;
            info!("✅ 工具已注册: {}", name);
        }
        info!("📋 服务器工具总数: {}", registry.get_tool_count().await);

        Ok(Server::new(
            SERVER_NAME.to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
            registry,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheBackend, FileConfig};
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_sources(FileConfig::default(), |key| vars.get(key).cloned()).unwrap()
    }

    #[tokio::test]
    async fn test_starts_without_credentials() {
        let cfg = config(&[("CALENDAR_CACHE_BACKEND", "memory")]);
        assert_eq!(cfg.storage.backend, CacheBackend::Memory);
        let ctx = AppContext::from_config(cfg).unwrap();

        let server = ctx.build_server().await.unwrap();
        let names: Vec<String> = server.registry().list_tools().await.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["get_calendar_info", "answer_calendar_question"]);

        let err = ctx.agent.answer("明天宜出行吗", false).await.unwrap_err();
        assert!(err.to_string().contains("DEEPSEEK_API_KEY"));
    }

    #[cfg(feature = "database")]
    #[tokio::test]
    async fn test_build_server_checks_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("data").join("calendar.db");
        let cfg = config(&[("CALENDAR_DB_PATH", db.to_str().unwrap())]);
        let ctx = AppContext::from_config(cfg).unwrap();

        assert_eq!(ctx.almanac.store().name(), "sqlite");
        tokio_test::assert_ok!(ctx.check_storage().await);
        assert!(ctx.build_server().await.is_ok());
        assert!(db.exists());
    }

    #[tokio::test]
    async fn test_uncached_date_without_base_url_is_config_error() {
        let ctx = AppContext::from_config(config(&[("CALENDAR_CACHE_BACKEND", "memory")])).unwrap();
        let date = ctx.resolver.resolve_date("2025-12-01").await.unwrap();

        let err = ctx.almanac.lookup(date, false).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::errors::MCPError>(),
            Some(crate::errors::MCPError::ConfigError(_))
        ));
    }
}
