//! 进程级配置
//!
//! 启动时读取一次：先确定项目根目录，再加载根目录下的 `configs/.env`，最后读取
//! 可选的 `configs/app.yaml`。优先级：环境变量 > YAML > 内置默认值。
//! 相对路径（数据库、日志目录）一律相对项目根目录，而不是进程的当前目录。

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::MCPError;

pub const DEFAULT_ENV_FILE: &str = "configs/.env";
pub const DEFAULT_CONFIG_FILE: &str = "configs/app.yaml";
pub const DEFAULT_DB_PATH: &str = "data/calendar.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
/// 显式指定项目根目录的环境变量
pub const ROOT_ENV_VAR: &str = "CALENDAR_HOME";

/// 大模型提供商
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    DeepSeek,
    Zhipu,
    Doubao,
    Qwen,
}

/// 大模型接口的请求/响应格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `POST {base}/chat/completions`
    OpenAiCompatible,
    /// 通义千问原生接口 `POST {base}/services/aigc/text-generation/generation`
    DashScope,
}

impl LlmProvider {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "deepseek" => Ok(LlmProvider::DeepSeek),
            "zhipu" => Ok(LlmProvider::Zhipu),
            "doubao" => Ok(LlmProvider::Doubao),
            "qwen" => Ok(LlmProvider::Qwen),
            other => Err(MCPError::ConfigError(format!(
                "不支持的提供商: {}，支持的提供商: ['deepseek', 'zhipu', 'doubao', 'qwen']",
                other
            ))
            .into()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::DeepSeek => "deepseek",
            LlmProvider::Zhipu => "zhipu",
            LlmProvider::Doubao => "doubao",
            LlmProvider::Qwen => "qwen",
        }
    }

    /// 环境变量前缀，如 `DEEPSEEK_API_KEY`
    pub fn env_prefix(&self) -> &'static str {
        match self {
            LlmProvider::DeepSeek => "DEEPSEEK",
            LlmProvider::Zhipu => "ZHIPU",
            LlmProvider::Doubao => "DOUBAO",
            LlmProvider::Qwen => "QWEN",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::DeepSeek => "https://api.deepseek.com/v1",
            LlmProvider::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
            LlmProvider::Doubao => "https://ark.cn-beijing.volces.com/api/v3",
            LlmProvider::Qwen => "https://dashscope.aliyuncs.com/api/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::DeepSeek => "deepseek-chat",
            LlmProvider::Zhipu => "glm-4",
            LlmProvider::Doubao => "ep-20241208123456-abcde",
            LlmProvider::Qwen => "qwen-turbo",
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        match self {
            LlmProvider::Qwen => WireFormat::DashScope,
            _ => WireFormat::OpenAiCompatible,
        }
    }
}

/// 大模型配置
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub extra_headers: Vec<(String, String)>,
    /// 相对日期改写时的温度
    pub question_temperature: f32,
    /// 回答问题时的温度
    pub answer_temperature: f32,
}

impl LlmConfig {
    pub fn api_key_var(&self) -> String {
        format!("{}_API_KEY", self.provider.env_prefix())
    }
}

/// 黄历接口配置
#[derive(Debug, Clone)]
pub struct AlmanacConfig {
    /// 用于获取最优接口地址的入口
    pub base_url: Option<String>,
    pub api_id: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Sqlite,
    Memory,
}

impl CacheBackend {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "sqlite" => Ok(CacheBackend::Sqlite),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(MCPError::ConfigError(format!(
                "不支持的缓存后端: {}，可选: sqlite, memory",
                other
            ))
            .into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: CacheBackend,
    pub db_path: PathBuf,
    pub memory_capacity: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub dir: PathBuf,
}

/// 应用配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub almanac: AlmanacConfig,
    pub storage: StorageConfig,
    pub logs: LogConfig,
}

/// `configs/app.yaml` 的结构，所有字段可选
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub logs: Option<FileLogs>,
    #[serde(default)]
    pub storage: Option<FileStorage>,
    #[serde(default)]
    pub llm: Option<FileLlm>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileLogs {
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileStorage {
    pub path: Option<String>,
    pub backend: Option<String>,
    pub memory_capacity: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileLlm {
    pub provider: Option<String>,
    pub question_temperature: Option<f32>,
    pub answer_temperature: Option<f32>,
}

impl FileConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| MCPError::ConfigError(format!("解析配置文件失败: {}", e)).into())
    }

    /// 读取配置文件；文件不存在时返回默认值
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("配置文件不存在，使用默认配置: {}", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| MCPError::ConfigError(format!("读取配置文件 {} 失败: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }
}

/// 确定项目根目录
///
/// 顺序：显式传入（`--root`）> `CALENDAR_HOME` > 从可执行文件所在目录向上第一个
/// 含 `configs/` 的目录 > 可执行文件所在目录。MCP 客户端按路径启动进程，当前目录不可靠。
pub fn project_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(root) = explicit {
        return root.to_path_buf();
    }
    if let Some(home) = env::var_os(ROOT_ENV_VAR).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    match env::current_exe().ok().as_deref().and_then(Path::parent) {
        Some(exe_dir) => find_root_from(exe_dir),
        None => PathBuf::from("."),
    }
}

/// 从 `start` 向上查找第一个包含 `configs/` 目录的祖先，找不到时返回 `start`
pub fn find_root_from(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join("configs").is_dir())
        .unwrap_or(start)
        .to_path_buf()
}

/// 加载 .env 文件：显式路径优先，否则 `{root}/configs/.env`，再否则 `{root}/.env`
pub fn load_env_file(path: Option<&Path>, root: &Path) {
    match path {
        Some(path) => {
            if dotenv::from_path(path).is_err() {
                eprintln!("⚠️ 无法加载环境变量文件: {}", path.display());
            }
        }
        None => {
            let candidates = [root.join(DEFAULT_ENV_FILE), root.join(".env")];
            if let Some(found) = candidates.iter().find(|p| p.is_file()) {
                dotenv::from_path(found).ok();
            }
        }
    }
}

impl AppConfig {
    /// 从进程环境与配置文件构建；未指定配置文件时读取 `{root}/configs/app.yaml`
    pub fn load(config_path: Option<&Path>, root: &Path) -> Result<Self> {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => root.join(DEFAULT_CONFIG_FILE),
        };
        let file = FileConfig::load(&path)?;
        Ok(Self::from_sources(file, |key| env::var(key).ok())?.rooted_at(root))
    }

    /// 把相对的数据库路径与日志目录解析到 `root` 下，绝对路径保持不变
    pub fn rooted_at(mut self, root: &Path) -> Self {
        if self.storage.db_path.is_relative() {
            self.storage.db_path = root.join(&self.storage.db_path);
        }
        if self.logs.dir.is_relative() {
            self.logs.dir = root.join(&self.logs.dir);
        }
        self
    }

    /// 从配置文件内容和任意环境变量查询函数构建，空字符串视为未设置
    pub fn from_sources<F>(file: FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let file_llm = file.llm.unwrap_or_default();
        let file_storage = file.storage.unwrap_or_default();
        let file_logs = file.logs.unwrap_or_default();

        let provider = match var("LLM_PROVIDER").or(file_llm.provider) {
            Some(name) => LlmProvider::parse(&name)?,
            None => LlmProvider::DeepSeek,
        };
        let prefix = provider.env_prefix();

        let mut extra_headers = Vec::new();
        if provider == LlmProvider::DeepSeek {
            let source_sn = var("DEEPSEEK_SOURCE_SN").unwrap_or_else(|| "prompt-engine".to_string());
            extra_headers.push(("source-sn".to_string(), source_sn));
        }

        let llm = LlmConfig {
            provider,
            api_key: var(&format!("{}_API_KEY", prefix)),
            api_base: var(&format!("{}_BASE_URL", prefix))
                .unwrap_or_else(|| provider.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            model: var(&format!("{}_LLM_MODEL", prefix))
                .unwrap_or_else(|| provider.default_model().to_string()),
            timeout_secs: parse_number(var("AI_TIMEOUT_SECS"), "AI_TIMEOUT_SECS", 60)?,
            max_retries: parse_number::<u32>(var("AI_MAX_RETRIES"), "AI_MAX_RETRIES", 3)?.max(1),
            extra_headers,
            question_temperature: file_llm.question_temperature.unwrap_or(0.3),
            answer_temperature: file_llm.answer_temperature.unwrap_or(0.7),
        };

        let almanac = AlmanacConfig {
            base_url: var("CALENDAR_BASE_URL"),
            api_id: var("CALENDAR_API_ID").unwrap_or_default(),
            api_key: var("CALENDAR_API_KEY").unwrap_or_default(),
            timeout_secs: parse_number(var("CALENDAR_TIMEOUT_SECS"), "CALENDAR_TIMEOUT_SECS", 10)?,
        };

        let backend = match var("CALENDAR_CACHE_BACKEND").or(file_storage.backend) {
            Some(name) => CacheBackend::parse(&name)?,
            None => CacheBackend::Sqlite,
        };
        let storage = StorageConfig {
            backend,
            db_path: PathBuf::from(
                var("CALENDAR_DB_PATH")
                    .or(file_storage.path)
                    .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            ),
            memory_capacity: file_storage.memory_capacity.unwrap_or(1024),
        };

        let logs = LogConfig {
            dir: PathBuf::from(
                var("LOG_DIR")
                    .or(file_logs.path)
                    .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()),
            ),
        };

        Ok(Self { llm, almanac, storage, logs })
    }

    /// 启动时打印配置摘要（不输出密钥）
    pub fn log_summary(&self) {
        info!("🤖 大模型: {} / {} ({})", self.llm.provider.name(), self.llm.model, self.llm.api_base);
        info!("🔑 大模型密钥: {}", if self.llm.api_key.is_some() { "已设置" } else { "未设置" });
        info!(
            "📅 黄历接口入口: {}",
            self.almanac.base_url.as_deref().unwrap_or("未设置")
        );
        info!("💾 缓存: {:?} ({})", self.storage.backend, self.storage.db_path.display());
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| MCPError::ConfigError(format!("{} 不是合法的数字: {}", key, raw)).into()),
        None => Ok(default),
    }
}
