/// 黄历数据模块
///
/// - `client`：黄历接口客户端（获取最优接口地址、日维度、时辰维度）
/// - `service`：缓存优先的查询与强制刷新
/// - `models`：黄历记录及其文本化

pub mod client;
pub mod models;
pub mod service;

pub use client::{AlmanacClient, AlmanacSource};
pub use models::{AlmanacRecord, RecordSource};
pub use service::AlmanacService;
