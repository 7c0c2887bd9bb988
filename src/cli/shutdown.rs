// src/cli/shutdown.rs
//! Shutdown 命令 - 确认后延时关机

use anyhow::Result;
use clap::Args;
use dialoguer::Confirm;

use crate::config::LauncherConfig;
use crate::launcher::SessionController;

/// Shutdown 命令参数
#[derive(Args)]
pub struct ShutdownArgs {
    /// 跳过确认
    #[arg(long, short)]
    pub yes: bool,
}

/// 处理 shutdown 命令
pub fn handle_shutdown(args: ShutdownArgs, config: &LauncherConfig) -> Result<()> {
    let confirmed = args.yes
        || Confirm::new()
            .with_prompt(format!("{} 秒后关机？", config.shutdown_delay_secs))
            .default(false)
            .interact()
            .unwrap_or(false);

    if !confirmed {
        println!("已取消。");
        return Ok(());
    }

    let controller = SessionController::from_config(config, false)?;
    controller.shutdown_system()?;
    println!("系统将在 {} 秒后关机", config.shutdown_delay_secs);
    Ok(())
}
