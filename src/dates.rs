//! 日期表达式解析
//!
//! 支持具体日期（`2025-12-01`、`2025/12/1`、`2025年12月1日`）、相对日期
//! （今天、明天、后天、大后天、昨天、前天、大前天、today、tomorrow…）以及
//! `N天后`/`N天前`/`in N days`/`N days ago`。规则解析失败且配置了大模型时，
//! 由大模型把相对日期改写成具体日期后再解析一次。

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Local, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::ai::{is_no_date_reply, AIRequest, CalendarPrompts, ChatCompletion};
use crate::errors::MCPError;

/// 出现即视为需要强制刷新的关键词
pub const FORCE_REFRESH_KEYWORDS: &[&str] =
    &["最新", "刷新", "重新获取", "更新", "重新拉取", "强制刷新", "重新查询"];

/// 出现即需要重点参考时辰信息的关键词
pub const HOUR_KEYWORDS: &[&str] = &["时辰", "几点", "什么时候", "时间", "小时", "吉时", "面试"];

/// 相对日期短语及其相对今天的偏移；包含关系的短语中较长者在前
const RELATIVE_PHRASES: &[(&str, i64)] = &[
    ("day after tomorrow", 2),
    ("day before yesterday", -2),
    ("大后天", 3),
    ("大前天", -3),
    ("后天", 2),
    ("后日", 2),
    ("前天", -2),
    ("明天", 1),
    ("明日", 1),
    ("今天", 0),
    ("今日", 0),
    ("昨天", -1),
    ("昨日", -1),
    ("tomorrow", 1),
    ("yesterday", -1),
    ("today", 0),
];

lazy_static! {
    static ref NUMERIC_DATE: Regex =
        Regex::new(r"(\d{4})\s*[-/.]\s*(\d{1,2})\s*[-/.]\s*(\d{1,2})").unwrap();
    static ref CHINESE_DATE: Regex =
        Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*[日号]?").unwrap();
    static ref DAYS_LATER: Regex = Regex::new(r"(\d{1,4})\s*天\s*(?:以后|之后|后)").unwrap();
    static ref DAYS_EARLIER: Regex = Regex::new(r"(\d{1,4})\s*天\s*(?:以前|之前|前)").unwrap();
    static ref IN_DAYS: Regex = Regex::new(r"(?i)\bin\s+(\d{1,4})\s+days?\b").unwrap();
    static ref DAYS_AGO: Regex = Regex::new(r"(?i)\b(\d{1,4})\s+days?\s+ago\b").unwrap();
}

/// 当前日期来源
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// 本地时区的系统时钟
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// 固定日期，测试和命令行复现时使用
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// 在文本中扫描日期的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateScan {
    Found(NaiveDate),
    /// 形如日期但日历上不存在，例如 2025-02-30
    Invalid(String),
    Missing,
}

/// 在自由文本中查找第一个日期；具体日期优先于相对日期
pub fn scan_date(text: &str, today: NaiveDate) -> DateScan {
    let mut invalid = None;

    for pattern in [&*NUMERIC_DATE, &*CHINESE_DATE] {
        for caps in pattern.captures_iter(text) {
            let parsed = (
                caps[1].parse::<i32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<u32>(),
            );
            if let (Ok(y), Ok(m), Ok(d)) = parsed {
                match NaiveDate::from_ymd_opt(y, m, d) {
                    Some(date) => return DateScan::Found(date),
                    None => {
                        invalid.get_or_insert_with(|| caps[0].to_string());
                    }
                }
            }
        }
    }

    if let Some(invalid) = invalid {
        return DateScan::Invalid(invalid);
    }

    for (pattern, sign) in [(&*DAYS_LATER, 1), (&*IN_DAYS, 1), (&*DAYS_EARLIER, -1), (&*DAYS_AGO, -1)] {
        if let Some(caps) = pattern.captures(text) {
            if let Ok(n) = caps[1].parse::<i64>() {
                if let Some(date) = today.checked_add_signed(Duration::days(sign * n)) {
                    return DateScan::Found(date);
                }
            }
        }
    }

    match find_relative_phrase(text) {
        Some(offset) => today
            .checked_add_signed(Duration::days(offset))
            .map(DateScan::Found)
            .unwrap_or(DateScan::Missing),
        None => DateScan::Missing,
    }
}

/// 最靠前出现的相对日期短语；同一位置取最长的短语
fn find_relative_phrase(text: &str) -> Option<i64> {
    let lowered = text.to_lowercase();
    RELATIVE_PHRASES
        .iter()
        .filter_map(|(phrase, offset)| lowered.find(phrase).map(|pos| (pos, phrase.len(), *offset)))
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, _, offset)| offset)
}

/// 在自由文本中查找第一个合法日期
pub fn find_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    match scan_date(text, today) {
        DateScan::Found(date) => Some(date),
        _ => None,
    }
}

/// 把一个日期表达式（如 "明天"、"2025-12-01"）解析为具体日期
pub fn resolve_expression(expr: &str, today: NaiveDate) -> Option<NaiveDate> {
    find_date(expr.trim(), today)
}

/// 问题中是否包含强制刷新的关键词
pub fn wants_refresh(text: &str) -> bool {
    FORCE_REFRESH_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// 问题是否关心具体时辰
pub fn needs_hour_detail(text: &str) -> bool {
    HOUR_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// 解析后的问题：具体日期以及（可能被改写过的）问题文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuestion {
    pub date: NaiveDate,
    pub question: String,
}

/// 规则解析 + 大模型兜底的日期解析器
pub struct DateResolver {
    clock: Arc<dyn Clock>,
    rewriter: Option<Arc<dyn ChatCompletion>>,
    prompts: CalendarPrompts,
    temperature: f32,
}

impl DateResolver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rewriter: None,
            prompts: CalendarPrompts::new(),
            temperature: 0.3,
        }
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn ChatCompletion>, temperature: f32) -> Self {
        self.rewriter = Some(rewriter);
        self.temperature = temperature;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// 解析 `get_calendar_info` 的日期参数
    pub async fn resolve_date(&self, expr: &str) -> Result<NaiveDate> {
        let today = self.today();
        match scan_date(expr, today) {
            DateScan::Found(date) => return Ok(date),
            DateScan::Invalid(text) => return Err(MCPError::InvalidDate(text).into()),
            DateScan::Missing => {}
        }

        if let Some(rewritten) = self.rewrite(&format!("查询{}的黄历信息", expr), today).await {
            match scan_date(&rewritten, today) {
                DateScan::Found(date) => return Ok(date),
                DateScan::Invalid(text) => return Err(MCPError::InvalidDate(text).into()),
                DateScan::Missing => {}
            }
        }

        Err(MCPError::DateNotFound(format!(
            "无法解析日期：{}。请使用相对日期（今天、明天等）或具体日期（YYYY-MM-DD格式）",
            expr
        ))
        .into())
    }

    /// 解析 `answer_calendar_question` 的问题文本
    pub async fn resolve_question(&self, question: &str) -> Result<ResolvedQuestion> {
        let today = self.today();
        match scan_date(question, today) {
            DateScan::Found(date) => {
                return Ok(ResolvedQuestion { date, question: question.to_string() });
            }
            DateScan::Invalid(text) => return Err(MCPError::InvalidDate(text).into()),
            DateScan::Missing => {}
        }

        if let Some(rewritten) = self.rewrite(question, today).await {
            match scan_date(&rewritten, today) {
                DateScan::Found(date) => {
                    info!("📅 问题已改写: {} -> {}", question, rewritten);
                    return Ok(ResolvedQuestion { date, question: rewritten });
                }
                DateScan::Invalid(text) => return Err(MCPError::InvalidDate(text).into()),
                DateScan::Missing => {}
            }
        }

        Err(MCPError::DateNotFound(format!(
            "无法从问题中提取日期信息，请确保问题中包含具体日期（如2025-12-01）或相对日期：{}",
            question
        ))
        .into())
    }

    /// 让大模型把相对日期改写为具体日期；未配置、调用失败或模型回复无日期时返回 `None`
    async fn rewrite(&self, question: &str, today: NaiveDate) -> Option<String> {
        let rewriter = self.rewriter.as_ref()?;
        let request = AIRequest::new(self.prompts.get_date_rewrite_user_prompt(question))
            .with_system(self.prompts.get_date_rewrite_system_prompt(today))
            .with_temperature(self.temperature);

        match rewriter.request(request).await {
            Ok(response) => {
                let rewritten = response.content.trim().to_string();
                debug!("大模型日期改写结果: {}", rewritten);
                if is_no_date_reply(&rewritten) {
                    info!("📅 大模型判断问题中没有日期信息: {}", question);
                    return None;
                }
                Some(rewritten)
            }
            Err(e) => {
                warn!("⚠️ 大模型日期改写失败: {}", e);
                None
            }
        }
    }
}
