//! 进程采样模块 - 从系统进程表读取模拟器的 PID 和常驻内存

use std::process::Command;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sysinfo::{ProcessStatus, System};
use tracing::debug;

use crate::error::{Error, Result};

/// 一次采样结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSample {
    /// 进程不在进程表中时为 None
    pub pid: Option<u32>,
    pub memory_kb: u64,
    pub observed_at: DateTime<Local>,
}

impl ProcessSample {
    pub fn new(pid: Option<u32>, memory_kb: u64, observed_at: DateTime<Local>) -> Self {
        Self { pid, memory_kb, observed_at }
    }

    /// 进程表中没有匹配项
    pub fn absent(observed_at: DateTime<Local>) -> Self {
        Self { pid: None, memory_kb: 0, observed_at }
    }

    pub fn is_present(&self) -> bool {
        self.pid.is_some()
    }
}

/// 进程采样能力
pub trait ProcessSampler: Send + Sync {
    /// 查询指定进程名，只有无法调用系统工具时才返回错误
    fn sample(&self, process_name: &str) -> Result<ProcessSample>;
}

/// 采样后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    /// Windows `tasklist` 文本输出
    Tasklist,
    /// sysinfo 进程表
    Sysinfo,
}

impl Default for SamplerKind {
    fn default() -> Self {
        if cfg!(windows) {
            SamplerKind::Tasklist
        } else {
            SamplerKind::Sysinfo
        }
    }
}

impl SamplerKind {
    pub fn build(self) -> Box<dyn ProcessSampler> {
        match self {
            SamplerKind::Tasklist => Box::new(TasklistSampler::new()),
            SamplerKind::Sysinfo => Box::new(SysinfoSampler::new()),
        }
    }
}

/// 基于 `tasklist` 的采样器
pub struct TasklistSampler;

impl TasklistSampler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TasklistSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler for TasklistSampler {
    fn sample(&self, process_name: &str) -> Result<ProcessSample> {
        let output = Command::new("tasklist")
            .args(["/FI", &format!("IMAGENAME eq {}*", process_name), "/NH", "/FO", "TABLE"])
            .output()
            .map_err(|source| Error::SamplerUnavailable {
                tool: "tasklist".to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tasklist(&stdout, process_name, Local::now()))
    }
}

/// 解析 tasklist 表格输出
///
/// 行格式: `rpcs3.exe   12345 Console   1   1,234,567 K`。
/// 第二个字段是 PID，倒数第二个字段是带千分位的内存数。
pub fn parse_tasklist(
    output: &str,
    process_name: &str,
    observed_at: DateTime<Local>,
) -> ProcessSample {
    let needle = process_name.to_lowercase();

    let row = output.lines().find_map(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first() {
            Some(first) if first.to_lowercase().starts_with(&needle) => Some(tokens),
            _ => None,
        }
    });

    let Some(tokens) = row else {
        return ProcessSample::absent(observed_at);
    };

    let pid = tokens.get(1).and_then(|t| t.parse::<u32>().ok());
    let memory_kb = if tokens.len() >= 4 {
        parse_memory_kb(tokens[tokens.len() - 2])
    } else {
        0
    };

    ProcessSample::new(pid, memory_kb, observed_at)
}

/// 解析千分位内存数，格式错误返回 0
pub fn parse_memory_kb(raw: &str) -> u64 {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | '\u{a0}' | '\u{202f}' | '\''))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return 0;
    }
    digits.parse().unwrap_or(0)
}

/// 基于 sysinfo 的采样器
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self { system: Mutex::new(System::new()) }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler for SysinfoSampler {
    fn sample(&self, process_name: &str) -> Result<ProcessSample> {
        let needle = process_name.to_lowercase();
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_all();

        // 已退出但未被回收的僵尸进程不算在运行
        let found = system.processes().iter().find(|(_, process)| {
            process.status() != ProcessStatus::Zombie
                && process.name().to_string_lossy().to_lowercase().starts_with(&needle)
        });

        let sample = match found {
            Some((pid, process)) => {
                ProcessSample::new(Some(pid.as_u32()), process.memory() / 1024, Local::now())
            }
            None => ProcessSample::absent(Local::now()),
        };
        debug!(
            process = %process_name,
            pid = ?sample.pid,
            memory_kb = sample.memory_kb,
            "Sampled process table"
        );
        Ok(sample)
    }
}
