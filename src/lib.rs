//! Game Session Monitor - 启动模拟器游戏并通过进程内存检测加载和退出

pub mod cli;
pub mod config;
pub mod error;
pub mod infra;
pub mod launcher;
pub mod monitor;
pub mod session;

pub use config::LauncherConfig;
pub use error::{Error, Result};
pub use infra::{
    FocusController, HotkeyFocusController, NoopFocusController, OsSystemControl, ProcessSample,
    ProcessSampler, SamplerKind, SysinfoSampler, SystemControl, TasklistSampler,
};
pub use launcher::{Launcher, ProcessLauncher, SessionController};
pub use monitor::{
    Effect, ExitReason, LifecycleState, LifecycleStateMachine, MonitorSettings, SessionEvent,
    SessionHandle, SessionMonitor, SessionOutcome, Step, Thresholds,
};
pub use session::{format_duration, format_timestamp, Session, SessionLogRecord, SessionRecorder};
