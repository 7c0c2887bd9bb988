// src/cli/history.rs
//! History 命令 - 查看游戏时长日志

use anyhow::Result;
use clap::Args;

use super::output::{format_history, format_json};
use crate::config::LauncherConfig;
use crate::session::SessionRecorder;

/// History 命令参数
#[derive(Args)]
pub struct HistoryArgs {
    /// 只显示最近 N 条
    #[arg(long, short)]
    pub limit: Option<usize>,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 处理 history 命令
pub fn handle_history(args: HistoryArgs, config: &LauncherConfig) -> Result<()> {
    let recorder = SessionRecorder::new(&config.log_path);
    let mut records = recorder.read_all()?;

    if let Some(limit) = args.limit {
        let start = records.len().saturating_sub(limit);
        records.drain(..start);
    }

    if args.json {
        println!("{}", format_json(&records));
    } else {
        println!("{}", format_history(&records));
    }
    Ok(())
}
