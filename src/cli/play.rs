// src/cli/play.rs
//! Play 命令 - 启动游戏并在前台监控到会话结束
//!
//! Ctrl-C 会取消监控（不写游戏时长日志），模拟器进程不受影响。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, warn};

use super::output::format_event;
use crate::config::LauncherConfig;
use crate::launcher::SessionController;
use crate::monitor::SessionOutcome;

/// Play 命令参数
#[derive(Args)]
pub struct PlayArgs {
    /// 游戏标题（写入日志）
    pub title: String,

    /// 传给模拟器的启动路径，例如 PS3_GAME/USRDIR/EBOOT.BIN
    pub run_path: PathBuf,

    /// 不发送全屏/切换窗口组合键
    #[arg(long)]
    pub no_focus: bool,

    /// 以 JSON 输出事件
    #[arg(long)]
    pub json: bool,
}

/// 处理 play 命令
pub async fn handle_play(args: PlayArgs, config: &LauncherConfig) -> Result<()> {
    let controller = SessionController::from_config(config, !args.no_focus)?;

    let mut handle = controller
        .start_session(&args.title, &args.run_path)
        .with_context(|| format!("启动失败: {}", args.title))?;

    let mut cancelled = false;
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => {
                    if args.json {
                        println!("{}", serde_json::to_string(&event)?);
                    } else {
                        println!("{}", format_event(&event));
                    }
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c(), if !cancelled => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                cancelled = true;
                handle.cancel();
            }
        }
    }

    if let SessionOutcome::Finished { record, .. } = handle.wait().await? {
        if !args.json {
            println!("已记录到 {}", controller.recorder().path().display());
        }
        debug!(game = %record.game, "Play session finished");
    }
    Ok(())
}
