//! 系统命令模块 - 强制结束进程、延时关机

use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// 系统控制能力
pub trait SystemControl: Send + Sync {
    /// 强制结束进程，失败只记录日志
    fn terminate(&self, pid: u32) -> bool;

    /// 延时关机
    fn shutdown(&self, delay: Duration) -> Result<()>;
}

/// 通过系统命令实现的控制器
pub struct OsSystemControl;

impl OsSystemControl {
    pub fn new() -> Self {
        Self
    }

    fn kill_command(pid: u32) -> (&'static str, Vec<String>) {
        if cfg!(windows) {
            ("taskkill", vec!["/PID".to_string(), pid.to_string(), "/F".to_string()])
        } else {
            ("kill", vec!["-9".to_string(), pid.to_string()])
        }
    }

    fn shutdown_command(delay: Duration) -> (&'static str, Vec<String>) {
        if cfg!(windows) {
            ("shutdown", vec!["/s".to_string(), "/t".to_string(), delay.as_secs().to_string()])
        } else {
            // Unix shutdown 只支持分钟粒度
            let minutes = delay.as_secs().div_ceil(60).max(1);
            ("shutdown", vec!["-h".to_string(), format!("+{}", minutes)])
        }
    }
}

impl Default for OsSystemControl {
    fn default() -> Self {
        Self::new()
    }
}

/// 运行一条命令并等待结束，返回是否成功
pub(crate) fn run_quiet(program: &str, args: &[String]) -> std::io::Result<bool> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    Ok(status.success())
}

impl SystemControl for OsSystemControl {
    fn terminate(&self, pid: u32) -> bool {
        let (program, args) = Self::kill_command(pid);
        debug!(pid, program, "Terminating process");

        match run_quiet(program, &args) {
            Ok(true) => {
                info!(pid, "Process terminated");
                true
            }
            Ok(false) => {
                warn!(pid, "Kill command reported failure");
                false
            }
            Err(e) => {
                warn!(pid, error = %e, "Failed to invoke kill command");
                false
            }
        }
    }

    fn shutdown(&self, delay: Duration) -> Result<()> {
        let (program, args) = Self::shutdown_command(delay);
        info!(delay_secs = delay.as_secs(), "Requesting system shutdown");

        let ok = run_quiet(program, &args).map_err(|source| Error::Command {
            command: format!("{} {}", program, args.join(" ")),
            source,
        })?;
        if !ok {
            warn!("Shutdown command reported failure");
        }
        Ok(())
    }
}
