//! 配置模块 - 加载 `~/.config/game-session-monitor/config.json`
//!
//! 文件不存在时使用默认值；所有字段都可以单独省略。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::infra::process::SamplerKind;
use crate::monitor::{MonitorSettings, Thresholds};

/// 默认高内存阈值（KB），超过即认为游戏已加载
pub const DEFAULT_HIGH_THRESHOLD_KB: u64 = 1_000_000;
/// 默认低内存阈值（KB），低于即认为游戏已退出
pub const DEFAULT_LOW_THRESHOLD_KB: u64 = 700_000;

/// 启动器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// 模拟器可执行文件
    pub emulator_path: PathBuf,
    /// 进程表中的进程名
    pub process_name: String,
    pub high_threshold_kb: u64,
    pub low_threshold_kb: u64,
    /// 采样间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 启动后开始采样前的等待时间（毫秒）
    pub settle_delay_ms: u64,
    /// 游戏时长日志
    pub log_path: PathBuf,
    pub sampler: SamplerKind,
    /// 关机延迟（秒）
    pub shutdown_delay_secs: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        let emulator_binary = if cfg!(windows) { "rpcs3.exe" } else { "rpcs3" };
        Self {
            emulator_path: PathBuf::from("RPCS3").join(emulator_binary),
            process_name: "rpcs3".to_string(),
            high_threshold_kb: DEFAULT_HIGH_THRESHOLD_KB,
            low_threshold_kb: DEFAULT_LOW_THRESHOLD_KB,
            poll_interval_ms: 1000,
            settle_delay_ms: 3000,
            log_path: config_dir().join("screen_time_log.csv"),
            sampler: SamplerKind::default(),
            shutdown_delay_secs: 5,
        }
    }
}

/// 配置目录
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/game-session-monitor")
}

/// 默认配置文件路径
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

impl LauncherConfig {
    /// 从默认路径加载
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// 从指定路径加载，并校验
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        config.validate()?;

        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.high_threshold_kb <= self.low_threshold_kb {
            return Err(Error::InvalidConfig(format!(
                "high_threshold_kb ({}) must be greater than low_threshold_kb ({})",
                self.high_threshold_kb, self.low_threshold_kb
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be non-zero".to_string()));
        }
        if self.process_name.trim().is_empty() {
            return Err(Error::InvalidConfig("process_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// 转换为监控运行参数
    pub fn monitor_settings(&self) -> Result<MonitorSettings> {
        self.validate()?;
        Ok(MonitorSettings {
            process_name: self.process_name.clone(),
            thresholds: Thresholds::new(self.high_threshold_kb, self.low_threshold_kb)?,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        })
    }
}
