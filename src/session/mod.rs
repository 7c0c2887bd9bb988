//! 会话模块 - 一次游戏会话及其日志记录

pub mod recorder;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub use recorder::{SessionRecorder, LOG_HEADER};

const SECONDS_PER_DAY: i64 = 86_400;

/// 正在进行的游戏会话
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub title: String,
    pub start_time: DateTime<Local>,
}

impl Session {
    /// 启动成功后创建
    pub fn open(title: impl Into<String>, start_time: DateTime<Local>) -> Self {
        Self { title: title.into(), start_time }
    }

    /// 结束会话，生成日志记录
    ///
    /// 消耗 self，同一会话不可能被结束两次。
    pub fn finalize(self, end_time: DateTime<Local>) -> SessionLogRecord {
        let seconds = (end_time - self.start_time).num_seconds().max(0);
        SessionLogRecord {
            game: self.title,
            start: format_timestamp(&self.start_time),
            end: format_timestamp(&end_time),
            duration: format_duration(seconds),
        }
    }
}

/// 会话日志中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogRecord {
    pub game: String,
    pub start: String,
    pub end: String,
    pub duration: String,
}

impl SessionLogRecord {
    pub fn fields(&self) -> [&str; 4] {
        [self.game.as_str(), self.start.as_str(), self.end.as_str(), self.duration.as_str()]
    }
}

/// `YYYY-MM-DD HH:MM:SS`
pub fn format_timestamp(ts: &DateTime<Local>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `H:MM:SS`，超过一天时为 `D day(s), H:MM:SS`
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / SECONDS_PER_DAY;
    let rem = seconds % SECONDS_PER_DAY;
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);

    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

/// 把 `format_duration` 的输出解析回秒数
pub fn parse_duration(formatted: &str) -> Option<i64> {
    let (days, clock) = match formatted.split_once(", ") {
        Some((day_part, clock)) => {
            let days: i64 = day_part.split_whitespace().next()?.parse().ok()?;
            (days, clock)
        }
        None => (0, formatted),
    };

    let mut parts = clock.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let secs: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(days * SECONDS_PER_DAY + hours * 3600 + minutes * 60 + secs)
}
