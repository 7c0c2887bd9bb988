//! 生命周期状态机 - 把内存采样归类为会话状态
//!
//! 状态机本身不做任何 I/O：每次采样输入当前状态，输出下一个状态和需要执行的副作用。

use serde::Serialize;

use crate::error::{Error, Result};
use crate::infra::process::ProcessSample;

/// 内存阈值，`high > low` 构成滞回区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    high_kb: u64,
    low_kb: u64,
}

impl Thresholds {
    pub fn new(high_kb: u64, low_kb: u64) -> Result<Self> {
        if high_kb <= low_kb {
            return Err(Error::InvalidConfig(format!(
                "high threshold {} KB must exceed low threshold {} KB",
                high_kb, low_kb
            )));
        }
        Ok(Self { high_kb, low_kb })
    }

    pub fn high_kb(&self) -> u64 {
        self.high_kb
    }

    pub fn low_kb(&self) -> u64 {
        self.low_kb
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_kb: crate::config::DEFAULT_HIGH_THRESHOLD_KB,
            low_kb: crate::config::DEFAULT_LOW_THRESHOLD_KB,
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Idle,
    Launching,
    Loaded,
    Exited,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Exited
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::Launching => write!(f, "launching"),
            LifecycleState::Loaded => write!(f, "loaded"),
            LifecycleState::Exited => write!(f, "exited"),
        }
    }
}

/// 会话结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    /// 进程仍在，但内存降到低阈值以下
    LowMemory,
    /// 进程已从进程表消失
    ProcessGone,
}

/// 状态转换要求执行的副作用，按顺序执行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ToggleFullscreen,
    Terminate(u32),
    /// 结束会话并写入日志
    Finalize(ExitReason),
    RestoreFocus,
}

/// 一次状态转换的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub next: LifecycleState,
    pub effects: Vec<Effect>,
}

impl Step {
    fn stay(state: LifecycleState) -> Self {
        Self { next: state, effects: Vec::new() }
    }

    fn to(next: LifecycleState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

/// 生命周期状态机
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleStateMachine {
    thresholds: Thresholds,
}

impl LifecycleStateMachine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// 会话开始: Idle -> Launching
    pub fn start(&self, state: LifecycleState) -> Step {
        match state {
            LifecycleState::Idle => Step::to(LifecycleState::Launching, Vec::new()),
            other => Step::stay(other),
        }
    }

    /// 输入一次采样
    pub fn step(&self, state: LifecycleState, sample: &ProcessSample) -> Step {
        match state {
            LifecycleState::Idle | LifecycleState::Exited => Step::stay(state),
            LifecycleState::Launching => {
                if sample.memory_kb > self.thresholds.high_kb {
                    Step::to(LifecycleState::Loaded, vec![Effect::ToggleFullscreen])
                } else {
                    Step::stay(state)
                }
            }
            LifecycleState::Loaded => match sample.pid {
                None => Step::to(
                    LifecycleState::Exited,
                    vec![Effect::Finalize(ExitReason::ProcessGone), Effect::RestoreFocus],
                ),
                Some(pid) if sample.memory_kb < self.thresholds.low_kb => Step::to(
                    LifecycleState::Exited,
                    vec![
                        Effect::Terminate(pid),
                        Effect::Finalize(ExitReason::LowMemory),
                        Effect::RestoreFocus,
                    ],
                ),
                Some(_) => Step::stay(state),
            },
        }
    }
}
