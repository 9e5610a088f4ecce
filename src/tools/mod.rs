pub mod base;
pub mod calendar_info;
pub mod calendar_question;

pub use base::{MCPTool, Schema};
pub use calendar_info::GetCalendarInfoTool;
pub use calendar_question::AnswerCalendarQuestionTool;
