use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use cardcaptor_calendar::app::AppContext;
use cardcaptor_calendar::config::{load_env_file, project_root, AppConfig};
use cardcaptor_calendar::errors::describe_error;
use cardcaptor_calendar::logging::init_logging;

#[derive(Parser)]
#[command(name = "cardcaptor-calendar", version, about = "黄历 MCP 服务器")]
struct Cli {
    /// 项目根目录，默认取 CALENDAR_HOME 或可执行文件所在位置
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// 环境变量文件，默认 <root>/configs/.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// YAML 配置文件，默认 <root>/configs/app.yaml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// 通过 stdio 运行 MCP 服务器（默认）
    Serve,

    /// 查询某一天的黄历
    Info {
        /// 日期，如 2025-12-01、明天
        date: String,
        #[arg(long)]
        force_refresh: bool,
    },

    /// 回答一个黄历问题；不带参数时从标准输入读取一行
    Ask {
        question: Option<String>,
        #[arg(long)]
        force_refresh: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let root = project_root(cli.root.as_deref());
    load_env_file(cli.env_file.as_deref(), &root);
    let config = AppConfig::load(cli.config.as_deref(), &root)?;
    let log_guards = init_logging(&config.logs)?;

    info!("🚀 启动 cardcaptor-calendar v{}", env!("CARGO_PKG_VERSION"));
    info!("📁 项目根目录: {}", root.display());
    config.log_summary();

    let ctx = AppContext::from_config(config)?;

    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let mut server = ctx.build_server().await?;
            info!("🌐 启动MCP服务器...");
            server.run().await?;
            Ok(None)
        }
        Command::Info { date, force_refresh } => lookup_record(&ctx, &date, force_refresh).await.map(Some),
        Command::Ask { question, force_refresh } => {
            let question = match question {
                Some(q) => q,
                None => {
                    eprintln!("请输入您的问题：");
                    let mut line = String::new();
                    std::io::stdin().read_line(&mut line)?;
                    line
                }
            };
            ctx.agent.answer(&question, force_refresh).await.map(Some)
        }
    };

    let failed = match outcome {
        Ok(Some(text)) => {
            println!("{}", text);
            false
        }
        Ok(None) => false,
        Err(e) => {
            error!("❌ 执行失败: {:#}", e);
            eprintln!("{}", describe_error(&e));
            true
        }
    };

    drop(log_guards);
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn lookup_record(ctx: &AppContext, expr: &str, force_refresh: bool) -> Result<String> {
    let date = ctx.resolver.resolve_date(expr).await?;
    let record = ctx.almanac.lookup(date, force_refresh).await?;
    Ok(record.to_json_pretty())
}
