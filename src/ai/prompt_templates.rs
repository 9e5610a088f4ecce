use chrono::NaiveDate;

/// 问题中没有任何日期信息时，日期改写提示词要求模型原样返回的句子
pub const NO_DATE_SENTINEL: &str = "请输入具体的时间日期或相对日期，如2025-12-01或今天、明天等";

/// 模型改写措辞时仍会保留的句首，用于识别变体
pub const NO_DATE_MARKER: &str = "请输入具体的时间日期";

/// 改写结果是否为“无日期”回复（原句或其变体）
pub fn is_no_date_reply(reply: &str) -> bool {
    reply.contains(NO_DATE_SENTINEL) || reply.contains(NO_DATE_MARKER)
}

/// 黄历相关的提示词模板
#[derive(Clone, Default)]
pub struct CalendarPrompts;

impl CalendarPrompts {
    pub fn new() -> Self {
        Self
    }

    /// 相对日期改写的系统提示词
    pub fn get_date_rewrite_system_prompt(&self, today: NaiveDate) -> String {
        let today = today.format("%Y-%m-%d");
        format!(
            r#"你是一个日期转换助手。今天的日期是{today}。

你的任务是将用户问题中的相对日期（如"今天"、"明天"、"后天"、"大后天"等）转换为具体的日期格式（YYYY-MM-DD）。

转换规则：
- 今天 = {today}
- 明天 = 今天的日期 + 1天
- 后天 = 今天的日期 + 2天
- 大后天 = 今天的日期 + 3天
- 昨天 = 今天的日期 - 1天
- 前天 = 今天的日期 - 2天

如果用户问题中包含具体日期（如"2025-12-01"），则保持不变。

如果用户问题中不包含任何日期信息，无法查询黄历，请直接返回："{sentinel}"

请只返回转换后的问题文本，不要添加任何解释或说明。"#,
            today = today,
            sentinel = NO_DATE_SENTINEL
        )
    }

    pub fn get_date_rewrite_user_prompt(&self, question: &str) -> String {
        format!("用户问题：{}\n\n请根据上述规则转换日期并返回转换后的问题。", question)
    }

    /// 黄历咨询师系统提示词
    pub fn get_answer_system_prompt(&self) -> String {
        r#"你是一位专业的黄历咨询师，擅长根据黄历信息为用户提供建议和解答。

请根据提供的黄历信息，用专业、友好、易懂的方式回答用户的问题。回答时应该：
1. 基于黄历信息中的宜忌、五行、方位等要素进行分析
2. 提供具体、实用的建议
3. 如果涉及颜色推荐，可以参考五行属性（金-白/银/金，木-绿/青，水-黑/蓝，火-红/粉/紫/橙，土-黄/棕/米）
4. 如果涉及活动建议，要明确指出是否适宜，并说明原因
5. 如果涉及方位，要明确指出具体的方位信息
6. 回答要简洁明了，重点突出

请用中文回答，语气要专业但亲切。"#
            .to_string()
    }

    pub fn get_answer_user_prompt(
        &self,
        date: NaiveDate,
        calendar_text: &str,
        question: &str,
        need_hour_info: bool,
    ) -> String {
        let hour_hint = if need_hour_info {
            "\n用户关心具体时间，请结合各时辰的吉凶、宜忌给出推荐的时辰。"
        } else {
            ""
        };
        format!(
            "以下是{}的黄历信息：\n\n{}\n\n用户问题：{}\n{}\n请根据上述黄历信息，专业地回答用户的问题。",
            date.format("%Y年%-m月%-d日"),
            calendar_text,
            question,
            hour_hint
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_date_reply_detection() {
        assert!(is_no_date_reply(NO_DATE_SENTINEL));
        assert!(is_no_date_reply("请输入具体的时间日期或相对日期，如 2025-12-01 或今天"));
        assert!(!is_no_date_reply("2025-12-24适合聚会吗？"));
    }

    #[test]
    fn test_rewrite_prompt_embeds_today_and_sentinel() {
        let prompts = CalendarPrompts::new();
        let prompt = prompts.get_date_rewrite_system_prompt(NaiveDate::from_ymd_opt(2025, 11, 30).unwrap());
        assert!(prompt.contains("今天的日期是2025-11-30"));
        assert!(prompt.contains(NO_DATE_SENTINEL));
    }

    #[test]
    fn test_answer_prompt_mentions_hours_only_when_needed() {
        let prompts = CalendarPrompts::new();
        let date = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();

        let with_hours = prompts.get_answer_user_prompt(date, "今日适宜：出行", "几点出门好", true);
        assert!(with_hours.contains("2025年12月1日"));
        assert!(with_hours.contains("时辰"));

        let without = prompts.get_answer_user_prompt(date, "今日适宜：出行", "适合搬家吗", false);
        assert!(!without.contains("推荐的时辰"));
    }
}
