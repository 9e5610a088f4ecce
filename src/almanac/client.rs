use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AlmanacConfig;
use crate::errors::MCPError;

const DAY_ENDPOINT: &str = "/api/time/getzdday.php";
const HOUR_ENDPOINT: &str = "/api/time/getzddayh.php";

/// 黄历数据源
#[async_trait]
pub trait AlmanacSource: Send + Sync {
    /// 获取某一天的日维度黄历
    async fn fetch_day(&self, date: NaiveDate) -> Result<Value>;

    /// 获取某一天十二时辰的黄历
    async fn fetch_hours(&self, date: NaiveDate) -> Result<Value>;
}

/// 黄历接口客户端
///
/// 先请求 `CALENDAR_BASE_URL` 拿到当前最优接口地址并记住；请求失败后清空，
/// 下次调用时重新获取。
pub struct AlmanacClient {
    config: AlmanacConfig,
    client: Client,
    api_host: RwLock<Option<String>>,
}

impl AlmanacClient {
    pub fn new(config: AlmanacConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            client,
            api_host: RwLock::new(None),
        })
    }

    /// 获取当前最优接口地址，形如 `http://1.2.3.4`
    pub async fn discover_api_host(&self) -> Result<String> {
        let base_url = self.config.base_url.as_deref().ok_or_else(|| {
            MCPError::ConfigError("未设置 CALENDAR_BASE_URL，无法从黄历接口获取数据".to_string())
        })?;

        let data = self.get_json(base_url, &[]).await?;

        let api = match (data.get("code").and_then(Value::as_i64), data.get("api").and_then(Value::as_str)) {
            (Some(200), Some(api)) if !api.trim().is_empty() => api.trim(),
            _ => {
                return Err(MCPError::UpstreamError(format!("获取API地址失败: {}", data)).into());
            }
        };

        let host = normalize_host(api);
        info!("🌐 黄历接口地址: {}", host);
        *self.api_host.write() = Some(host.clone());
        Ok(host)
    }

    async fn ensure_host(&self) -> Result<String> {
        let cached = self.api_host.read().clone();
        match cached {
            Some(host) => Ok(host),
            None => self.discover_api_host().await,
        }
    }

    async fn fetch(&self, endpoint: &str, date: NaiveDate, label: &str) -> Result<Value> {
        let host = self.ensure_host().await?;
        let url = format!("{}{}", host, endpoint);
        let params = [
            ("id", self.config.api_id.clone()),
            ("key", self.config.api_key.clone()),
            ("nian", date.year().to_string()),
            ("yue", date.month().to_string()),
            ("ri", date.day().to_string()),
        ];

        debug!("📡 请求{}: {} ({})", label, url, date);
        let result = self.get_json(&url, &params).await.and_then(|data| {
            if data.get("code").and_then(Value::as_i64) == Some(200) {
                Ok(data)
            } else {
                Err(MCPError::UpstreamError(format!("获取{}失败: {}", label, data)).into())
            }
        });

        if let Err(e) = &result {
            warn!("⚠️ {}请求失败，下次将重新获取接口地址: {}", label, e);
            *self.api_host.write() = None;
        }
        result
    }

    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value> {
        let response = self.client.get(url).query(params).send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow::Error::from(MCPError::Timeout(format!("黄历接口请求超时: {}", url)))
            } else {
                anyhow::Error::from(MCPError::UpstreamError(format!("黄历接口请求失败: {}", e)))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MCPError::UpstreamError(format!("HTTP {} - {}", status, body)).into());
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| MCPError::UpstreamError(format!("黄历接口返回了非JSON内容: {}", e)))?;
        if !data.is_object() {
            return Err(MCPError::UpstreamError(format!("黄历接口返回格式异常: {}", data)).into());
        }
        Ok(data)
    }
}

#[async_trait]
impl AlmanacSource for AlmanacClient {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Value> {
        self.fetch(DAY_ENDPOINT, date, "日期黄历信息").await
    }

    async fn fetch_hours(&self, date: NaiveDate) -> Result<Value> {
        self.fetch(HOUR_ENDPOINT, date, "时辰黄历信息").await
    }
}

/// 去掉末尾的 `/`；没有协议头时补上 `http://`
fn normalize_host(api: &str) -> String {
    let trimmed = api.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
