//! Output formatting for CLI commands

use serde::Serialize;

use crate::monitor::SessionEvent;
use crate::session::{format_duration, parse_duration, SessionLogRecord};

/// Format output as pretty JSON
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// 单行事件描述
pub fn format_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Launching { title } => format!("正在启动: {}", title),
        SessionEvent::Loaded { pid, memory_kb } => match pid {
            Some(pid) => format!("游戏已加载 (PID {}, {} KB)", pid, memory_kb),
            None => format!("游戏已加载 ({} KB)", memory_kb),
        },
        SessionEvent::LogWriteFailed { error } => format!("⚠️ 游戏时长未能写入日志: {}", error),
        SessionEvent::Exited { record, .. } => {
            format!("游戏已退出: {} 游玩 {}", record.game, record.duration)
        }
        SessionEvent::Cancelled => "监控已取消".to_string(),
    }
}

/// 日志表格，最后一行为总时长
pub fn format_history(records: &[SessionLogRecord]) -> String {
    if records.is_empty() {
        return "没有游戏记录".to_string();
    }

    let width = records.iter().map(|r| r.game.chars().count()).max().unwrap_or(4).max(4);
    let mut out = format!(
        "{:<width$}  {:<19}  {:<19}  {}\n",
        "Game",
        "Start",
        "End",
        "Time Played",
        width = width
    );
    for r in records {
        out.push_str(&format!(
            "{:<width$}  {:<19}  {:<19}  {}\n",
            r.game, r.start, r.end, r.duration,
            width = width
        ));
    }

    let total: i64 = records.iter().filter_map(|r| parse_duration(&r.duration)).sum();
    out.push_str(&format!("\n共 {} 次会话，总时长 {}", records.len(), format_duration(total)));
    out
}
