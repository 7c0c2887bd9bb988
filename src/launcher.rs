//! 启动模块 - 启动模拟器并为每个会话创建监控任务
//!
//! 同一时间只允许一个活动会话，由 `SessionController` 持有的标志保证。

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, error, info};

use crate::config::LauncherConfig;
use crate::error::{Error, Result};
use crate::infra::input::{FocusController, HotkeyFocusController, NoopFocusController};
use crate::infra::process::ProcessSampler;
use crate::infra::system::{OsSystemControl, SystemControl};
use crate::monitor::{MonitorSettings, SessionHandle, SessionMonitor};
use crate::session::{Session, SessionRecorder};

/// 进程启动能力
pub trait ProcessLauncher: Send + Sync {
    /// 以 run_path 为唯一参数启动，不等待退出，返回 PID
    fn start(&self, run_path: &Path) -> Result<u32>;
}

/// 启动外部模拟器
pub struct Launcher {
    program: PathBuf,
}

impl Launcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// 带目录的路径直接检查，裸命令名从 PATH 查找
    fn resolve(&self) -> Result<PathBuf> {
        let not_found = || Error::Spawn {
            program: self.program.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "executable not found"),
        };

        if self.program.is_absolute() || self.program.components().count() > 1 {
            if self.program.is_file() {
                Ok(self.program.clone())
            } else {
                Err(not_found())
            }
        } else {
            which::which(&self.program).map_err(|_| not_found())
        }
    }
}

impl ProcessLauncher for Launcher {
    fn start(&self, run_path: &Path) -> Result<u32> {
        let program = self.resolve()?;

        let mut child = Command::new(&program)
            .arg(run_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let pid = child.id();
        // 后台回收子进程，退出后不会以僵尸进程留在进程表中
        std::thread::spawn(move || match child.wait() {
            Ok(status) => debug!(pid, %status, "Emulator exited"),
            Err(e) => debug!(pid, error = %e, "Failed to wait for emulator"),
        });
        info!(
            program = %program.display(),
            run_path = %run_path.display(),
            pid,
            "Launched emulator"
        );
        Ok(pid)
    }
}

/// 活动会话标志，drop 时释放
struct ActiveSessionGuard(Arc<AtomicBool>);

impl ActiveSessionGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for ActiveSessionGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 启动器对外接口：启动会话、关机
pub struct SessionController {
    launcher: Box<dyn ProcessLauncher>,
    settings: MonitorSettings,
    sampler: Arc<dyn ProcessSampler>,
    focus: Arc<dyn FocusController>,
    system: Arc<dyn SystemControl>,
    recorder: Arc<SessionRecorder>,
    shutdown_delay: Duration,
    active: Arc<AtomicBool>,
}

impl SessionController {
    pub fn new(
        launcher: Box<dyn ProcessLauncher>,
        settings: MonitorSettings,
        sampler: Arc<dyn ProcessSampler>,
        focus: Arc<dyn FocusController>,
        system: Arc<dyn SystemControl>,
        recorder: Arc<SessionRecorder>,
    ) -> Self {
        Self {
            launcher,
            settings,
            sampler,
            focus,
            system,
            recorder,
            shutdown_delay: Duration::from_secs(5),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 按配置组装系统实现
    pub fn from_config(config: &LauncherConfig, with_focus: bool) -> Result<Self> {
        let focus: Arc<dyn FocusController> = if with_focus {
            Arc::new(HotkeyFocusController::new())
        } else {
            Arc::new(NoopFocusController)
        };

        Ok(Self::new(
            Box::new(Launcher::new(&config.emulator_path)),
            config.monitor_settings()?,
            Arc::from(config.sampler.build()),
            focus,
            Arc::new(OsSystemControl::new()),
            Arc::new(SessionRecorder::new(&config.log_path)),
        )
        .with_shutdown_delay(Duration::from_secs(config.shutdown_delay_secs)))
    }

    pub fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    pub fn recorder(&self) -> &Arc<SessionRecorder> {
        &self.recorder
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 启动游戏并开始监控
    ///
    /// 需要在 tokio runtime 中调用。已有活动会话时返回 `Error::SessionActive`，
    /// 启动失败时返回 `Error::Spawn`，此时不会创建监控任务。
    pub fn start_session(&self, title: &str, run_path: &Path) -> Result<SessionHandle> {
        let guard = ActiveSessionGuard::acquire(&self.active).ok_or_else(|| Error::SessionActive {
            title: title.to_string(),
        })?;

        let pid = self.launcher.start(run_path).map_err(|e| {
            error!(title = %title, error = %e, "Failed to launch");
            e
        })?;
        info!(title = %title, pid, "Launching");

        let session = Session::open(title, Local::now());
        let monitor = SessionMonitor::new(
            self.settings.clone(),
            Arc::clone(&self.sampler),
            Arc::clone(&self.focus),
            Arc::clone(&self.system),
            Arc::clone(&self.recorder),
        );
        Ok(monitor.spawn_with(session, Some(pid), guard))
    }

    /// 延时关机
    pub fn shutdown_system(&self) -> Result<()> {
        info!(delay_secs = self.shutdown_delay.as_secs(), "Shutting down system");
        self.system.shutdown(self.shutdown_delay)
    }
}
