use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

/// 十二时辰在接口字段中的拼音前缀，按子时起排列
pub const SHICHEN_KEYS: [&str; 12] = [
    "zi", "chou", "yin", "mao", "chen", "si", "wu", "wei", "shen", "you", "xu", "hai",
];

/// 记录来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    /// 两个维度均来自缓存
    Cache,
    /// 两个维度均来自黄历接口
    Upstream,
    /// 部分来自缓存，部分新拉取
    Mixed,
}

impl RecordSource {
    pub fn label(&self) -> &'static str {
        match self {
            RecordSource::Cache => "缓存",
            RecordSource::Upstream => "黄历接口",
            RecordSource::Mixed => "缓存+黄历接口",
        }
    }
}

/// 某一天的黄历信息；序列化结果即工具返回的 `{day_info, hour_info}`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlmanacRecord {
    #[serde(skip)]
    pub date: NaiveDate,
    pub day_info: Value,
    pub hour_info: Value,
    #[serde(skip)]
    pub source: RecordSource,
}

impl AlmanacRecord {
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// 整理成便于大模型理解的文本，缺失字段直接跳过
    pub fn to_prompt_text(&self, include_hours: bool) -> String {
        let day = &self.day_info;
        let mut parts: Vec<String> = Vec::new();

        let mut push = |label: &str, value: Option<String>| {
            if let Some(value) = value {
                parts.push(format!("{}：{}", label, value));
            }
        };

        push(
            "日期",
            Some(format!(
                "{}年{}月{}日",
                field(day, "ynian").unwrap_or_else(|| self.date.format("%Y").to_string()),
                field(day, "yyue").unwrap_or_else(|| self.date.format("%-m").to_string()),
                field(day, "yri").unwrap_or_else(|| self.date.format("%-d").to_string()),
            )),
        );
        push("星期", field(day, "xingqi"));
        if let (Some(nian), Some(yue), Some(ri)) =
            (field(day, "nnian"), field(day, "nyue"), field(day, "nri"))
        {
            push("农历", Some(format!("{}年{}月{}", nian, yue, ri)));
        }
        push(
            "节气",
            field(day, "jieqi").map(|jq| match field(day, "JIEQIDAYS") {
                Some(days) => format!("{}（{}天）", jq, days),
                None => jq,
            }),
        );
        push("年干支", field(day, "ganzhinian"));
        push("月干支", field(day, "ganzhiyue"));
        push("日干支", field(day, "ganzhiri"));
        push("年五行", field(day, "nianwuxing"));
        push("月五行", field(day, "yuewuxing"));
        push("日五行", field(day, "riwuxing"));
        push("正五行", field(day, "ZHENG"));
        push("今日适宜", field(day, "yi"));
        push("今日不宜", field(day, "ji"));
        push("财神方位", field(day, "DAYPOSITIONCAI"));
        push("喜神方位", field(day, "DAYPOSITIONXI"));
        push("福神方位", field(day, "DAYPOSITIONFU"));
        push("冲煞", field(day, "xiangchong"));
        push("吉神", field(day, "DAYJISHEN"));
        push("凶煞", field(day, "DAYXIONGSHA"));
        push(
            "天神",
            field(day, "DAYTIANSHEN").map(|ts| {
                let detail: Vec<String> = [field(day, "DAYTIANSHENTYPE"), field(day, "DAYTIANSHENLUCK")]
                    .into_iter()
                    .flatten()
                    .collect();
                if detail.is_empty() {
                    ts
                } else {
                    format!("{}（{}）", ts, detail.join("，"))
                }
            }),
        );
        push("值星", field(day, "ZHIXING"));
        push("彭祖百忌", field(day, "pengzu"));

        if include_hours {
            let hours = self.hour_lines();
            if !hours.is_empty() {
                parts.push(String::new());
                parts.push("各时辰详情：".to_string());
                parts.extend(hours);
            }
        }

        parts.join("\n")
    }

    /// 十二时辰明细，名称或吉凶缺失的时辰不输出
    pub fn hour_lines(&self) -> Vec<String> {
        let hour = &self.hour_info;
        SHICHEN_KEYS
            .iter()
            .filter_map(|sc| {
                let name = field(hour, &format!("{}0", sc))?;
                let luck = field(hour, &format!("{}1", sc))?;
                let mut line = match field(hour, &format!("{}2", sc)) {
                    Some(time) => format!("{}时（{}）：{}", name, time, luck),
                    None => format!("{}时：{}", name, luck),
                };
                if let Some(shen) = field(hour, &format!("{}3", sc)) {
                    line.push_str(&format!("，{}", shen));
                }
                if let Some(yi) = field(hour, &format!("{}4", sc)) {
                    line.push_str(&format!("，适宜：{}", yi));
                }
                if let Some(ji) = field(hour, &format!("{}5", sc)) {
                    line.push_str(&format!("，不宜：{}", ji));
                }
                Some(line)
            })
            .collect()
    }
}

/// 读取字段为字符串；兼容数据平铺在顶层或包在 `data` 里两种返回
fn field(payload: &Value, key: &str) -> Option<String> {
    let value = payload.get(key).or_else(|| payload.get("data").and_then(|d| d.get(key)))?;
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
