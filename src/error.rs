//! 错误类型 - 启动器与会话监控的错误分类

use std::path::PathBuf;
use thiserror::Error;

/// 会话监控子系统的错误
///
/// 内存读数解析失败不在此列：采样器会把它当作 0 KB 处理，不会向上传播。
#[derive(Debug, Error)]
pub enum Error {
    /// 外部进程无法创建（找不到可执行文件或系统拒绝）
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 无法调用系统进程表工具
    #[error("process table tool `{tool}` could not be invoked: {source}")]
    SamplerUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// 会话日志无法打开或写入
    #[error("failed to write session log {}: {source}", .path.display())]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 系统命令无法调用
    #[error("failed to run `{command}`: {source}")]
    Command {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// 已有会话在运行
    #[error("a session for '{title}' is already active")]
    SessionActive { title: String },

    /// 配置无效
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// 配置文件无法读取或解析
    #[error("failed to load config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 监控任务异常结束
    #[error("session monitor task failed: {0}")]
    MonitorJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 是否应该作为"启动失败"展示给用户
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Error::Spawn { .. })
    }
}
