//! 合成输入模块 - 全屏切换与焦点恢复
//!
//! 两个操作都是尽力而为：系统没有提供窗口是否真正获得焦点的反馈，
//! 所以失败只记录 warn 日志，不返回错误。

use tracing::{debug, warn};

use crate::infra::system::run_quiet;

/// 焦点控制能力
pub trait FocusController: Send + Sync {
    /// 发送全屏切换组合键（Alt+Enter）
    fn toggle_fullscreen(&self);

    /// 发送任务切换组合键（Alt+Tab），把启动器切回前台
    fn restore_focus(&self);
}

/// 组合键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotkey {
    AltEnter,
    AltTab,
}

impl Hotkey {
    /// WScript.Shell SendKeys 语法
    fn send_keys_sequence(self) -> &'static str {
        match self {
            Hotkey::AltEnter => "%{ENTER}",
            Hotkey::AltTab => "%{TAB}",
        }
    }

    /// xdotool key 语法
    fn xdotool_sequence(self) -> &'static str {
        match self {
            Hotkey::AltEnter => "alt+Return",
            Hotkey::AltTab => "alt+Tab",
        }
    }

    /// 当前平台的发送命令
    pub fn command(self) -> (&'static str, Vec<String>) {
        if cfg!(windows) {
            let script = format!(
                "(New-Object -ComObject WScript.Shell).SendKeys('{}')",
                self.send_keys_sequence()
            );
            ("powershell", vec!["-NoProfile".to_string(), "-Command".to_string(), script])
        } else {
            ("xdotool", vec!["key".to_string(), self.xdotool_sequence().to_string()])
        }
    }
}

/// 通过系统工具发送组合键
pub struct HotkeyFocusController;

impl HotkeyFocusController {
    pub fn new() -> Self {
        Self
    }

    fn send(&self, hotkey: Hotkey) {
        let (program, args) = hotkey.command();
        match run_quiet(program, &args) {
            Ok(true) => debug!(?hotkey, "Hotkey sent"),
            Ok(false) => warn!(?hotkey, program, "Hotkey command reported failure"),
            Err(e) => warn!(?hotkey, program, error = %e, "Failed to send hotkey"),
        }
    }
}

impl Default for HotkeyFocusController {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusController for HotkeyFocusController {
    fn toggle_fullscreen(&self) {
        self.send(Hotkey::AltEnter);
    }

    fn restore_focus(&self) {
        self.send(Hotkey::AltTab);
    }
}

/// 无界面运行时使用
pub struct NoopFocusController;

impl FocusController for NoopFocusController {
    fn toggle_fullscreen(&self) {
        debug!("Fullscreen toggle skipped");
    }

    fn restore_focus(&self) {
        debug!("Focus restore skipped");
    }
}
