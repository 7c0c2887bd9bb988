//! 基础设施层 - 进程表采样、合成输入、系统命令

pub mod input;
pub mod process;
pub mod system;

pub use input::{FocusController, Hotkey, HotkeyFocusController, NoopFocusController};
pub use process::{ProcessSample, ProcessSampler, SamplerKind, SysinfoSampler, TasklistSampler};
pub use system::{OsSystemControl, SystemControl};
