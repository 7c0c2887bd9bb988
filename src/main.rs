//! Game Session Monitor CLI
//!
//! 启动模拟器游戏，检测加载/退出并记录游戏时长

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use game_session_monitor::{
    cli::{
        format_json, handle_history, handle_play, handle_shutdown, HistoryArgs, PlayArgs,
        ShutdownArgs,
    },
    config, LauncherConfig,
};

#[derive(Parser)]
#[command(name = "gsm")]
#[command(about = "Game Session Monitor - 启动游戏并记录游戏时长")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/game-session-monitor/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动游戏并监控到退出
    Play(PlayArgs),
    /// 读取一次进程采样
    Sample {
        /// 进程名（默认取配置中的 process_name）
        process_name: Option<String>,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看游戏时长日志
    History(HistoryArgs),
    /// 延时关机
    Shutdown(ShutdownArgs),
    /// 打印当前生效的配置
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug gsm play ...
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("game_session_monitor=info,gsm=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::config_path);
    let config = LauncherConfig::load_from(&config_path)?;

    match cli.command {
        Commands::Play(args) => {
            if let Err(e) = handle_play(args, &config).await {
                eprintln!("❌ {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Sample { process_name, json } => {
            let name = process_name.unwrap_or_else(|| config.process_name.clone());
            let sampler = config.sampler.build();
            let sample = tokio::task::spawn_blocking(move || sampler.sample(&name)).await??;

            if json {
                println!("{}", format_json(&sample));
            } else {
                match sample.pid {
                    Some(pid) => println!("PID: {} | 内存: {} KB", pid, sample.memory_kb),
                    None => println!("未找到进程"),
                }
            }
        }
        Commands::History(args) => {
            handle_history(args, &config)?;
        }
        Commands::Shutdown(args) => {
            handle_shutdown(args, &config)?;
        }
        Commands::Config => {
            println!("# {}", config_path.display());
            println!("{}", format_json(&config));
        }
    }

    Ok(())
}
