use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LogConfig;

const LOG_FILE_PREFIX: &str = "cardcaptor-calendar";
const DEFAULT_FILTER: &str = "cardcaptor_calendar=info";

/// 日志写线程的守卫，进程退出前需要一直持有
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

fn daily_appender(dir: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("无法创建日志目录: {}", dir.display()))
}

/// 全部日志与错误日志两个文件写入端
fn file_appenders(dir: &Path) -> Result<(RollingFileAppender, RollingFileAppender)> {
    Ok((daily_appender(dir)?, daily_appender(&dir.join("error"))?))
}

/// 初始化日志：stderr（stdout 留给协议）+ 按天滚动的全部日志 + 单独的错误日志
///
/// 日志目录不可写时只输出到 stderr，不影响服务启动。
pub fn init_logging(config: &LogConfig) -> Result<LogGuards> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_ansi(false);

    match file_appenders(&config.dir) {
        Ok((all_appender, error_appender)) => {
            let (all_writer, all_guard) = tracing_appender::non_blocking(all_appender);
            let (error_writer, error_guard) = tracing_appender::non_blocking(error_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_writer(all_writer).with_ansi(false))
                .with(
                    fmt::layer()
                        .with_writer(error_writer)
                        .with_ansi(false)
                        .with_filter(LevelFilter::ERROR),
                )
                .try_init()
                .context("日志系统初始化失败")?;

            Ok(LogGuards {
                _guards: vec![all_guard, error_guard],
            })
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
                .context("日志系统初始化失败")?;
            warn!("⚠️ 日志文件不可用，仅输出到标准错误: {:#}", e);

            Ok(LogGuards { _guards: Vec::new() })
        }
    }
}
