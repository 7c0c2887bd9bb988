//! 会话监控模块 - 轮询进程表、驱动状态机、执行副作用
//!
//! 每次游戏启动对应一个独立的 tokio 任务，直到状态机进入 Exited 或被取消。
//! 任务通过 channel 发布生命周期事件，不与调用方共享可变状态。

mod state;

pub use state::{Effect, ExitReason, LifecycleState, LifecycleStateMachine, Step, Thresholds};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::infra::input::FocusController;
use crate::infra::process::{ProcessSample, ProcessSampler};
use crate::infra::system::SystemControl;
use crate::session::{Session, SessionLogRecord, SessionRecorder};

/// 监控运行参数
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub process_name: String,
    pub thresholds: Thresholds,
    /// 两次采样之间的间隔
    pub poll_interval: Duration,
    /// 启动后开始采样前的等待
    pub settle_delay: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            process_name: "rpcs3".to_string(),
            thresholds: Thresholds::default(),
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(3),
        }
    }
}

/// 生命周期事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// 开始等待游戏加载
    Launching { title: String },
    /// 游戏已加载，启动器应最小化
    Loaded { pid: Option<u32>, memory_kb: u64 },
    /// 日志写入失败（不影响会话结束）
    LogWriteFailed { error: String },
    /// 会话结束，启动器应恢复
    Exited { reason: ExitReason, record: SessionLogRecord },
    Cancelled,
}

/// 监控任务的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Finished {
        reason: ExitReason,
        record: SessionLogRecord,
    },
    Cancelled,
}

/// 单个会话的监控器
pub struct SessionMonitor {
    settings: MonitorSettings,
    sampler: Arc<dyn ProcessSampler>,
    focus: Arc<dyn FocusController>,
    system: Arc<dyn SystemControl>,
    recorder: Arc<SessionRecorder>,
}

impl SessionMonitor {
    pub fn new(
        settings: MonitorSettings,
        sampler: Arc<dyn ProcessSampler>,
        focus: Arc<dyn FocusController>,
        system: Arc<dyn SystemControl>,
        recorder: Arc<SessionRecorder>,
    ) -> Self {
        Self { settings, sampler, focus, system, recorder }
    }

    /// 在后台任务中运行，立即返回句柄
    pub fn spawn(self, session: Session, pid: Option<u32>) -> SessionHandle {
        self.spawn_with(session, pid, ())
    }

    /// 同 `spawn`，`guard` 在任务结束时（包括 panic 和 abort）被 drop
    pub(crate) fn spawn_with<G: Send + 'static>(
        self,
        session: Session,
        pid: Option<u32>,
        guard: G,
    ) -> SessionHandle {
        let title = session.title.clone();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(LifecycleState::Idle);

        let task = tokio::spawn(async move {
            let _guard = guard;
            self.run(session, Publisher { events: events_tx, state: state_tx }, cancel_rx).await
        });

        SessionHandle {
            title,
            pid,
            events: events_rx,
            state: state_rx,
            cancel: cancel_tx,
            task,
        }
    }

    async fn run(
        self,
        session: Session,
        publisher: Publisher,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<SessionOutcome> {
        let machine = LifecycleStateMachine::new(self.settings.thresholds);
        let mut session = Some(session);
        let title = session.as_ref().map(|s| s.title.clone()).unwrap_or_default();

        let mut state = machine.start(LifecycleState::Idle).next;
        publisher.state(state);
        publisher.emit(SessionEvent::Launching { title: title.clone() });
        info!(title = %title, process = %self.settings.process_name, "Monitoring session");

        if pause(self.settings.settle_delay, &mut cancel).await {
            return Ok(self.cancelled(&title, &publisher));
        }

        loop {
            if *cancel.borrow() {
                return Ok(self.cancelled(&title, &publisher));
            }

            let sample = match self.sample().await {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(error = %e, "Process sampling failed, skipping tick");
                    if pause(self.settings.poll_interval, &mut cancel).await {
                        return Ok(self.cancelled(&title, &publisher));
                    }
                    continue;
                }
            };
            debug!(pid = ?sample.pid, memory_kb = sample.memory_kb, state = %state, "Sample");

            let step = machine.step(state, &sample);
            let mut finished = None;
            for effect in &step.effects {
                if let Some(done) = self.apply(*effect, &sample, &mut session, &publisher).await {
                    finished = Some(done);
                }
            }

            if step.next != state {
                info!(
                    from = %state,
                    to = %step.next,
                    pid = ?sample.pid,
                    memory_kb = sample.memory_kb,
                    "State transition"
                );
                state = step.next;
                publisher.state(state);
            }

            if state.is_terminal() {
                let (reason, record) = finished.ok_or_else(|| {
                    Error::MonitorJoin("session reached Exited without being finalized".to_string())
                })?;
                publisher.emit(SessionEvent::Exited { reason, record: record.clone() });
                return Ok(SessionOutcome::Finished { reason, record });
            }

            if pause(self.settings.poll_interval, &mut cancel).await {
                return Ok(self.cancelled(&title, &publisher));
            }
        }
    }

    /// 执行一个副作用，Finalize 返回生成的记录
    async fn apply(
        &self,
        effect: Effect,
        sample: &ProcessSample,
        session: &mut Option<Session>,
        publisher: &Publisher,
    ) -> Option<(ExitReason, SessionLogRecord)> {
        match effect {
            Effect::ToggleFullscreen => {
                let focus = Arc::clone(&self.focus);
                run_blocking(move || focus.toggle_fullscreen()).await;
                publisher.emit(SessionEvent::Loaded {
                    pid: sample.pid,
                    memory_kb: sample.memory_kb,
                });
                None
            }
            Effect::Terminate(pid) => {
                info!(pid, "Game exited, stopping emulator");
                let system = Arc::clone(&self.system);
                run_blocking(move || system.terminate(pid)).await;
                None
            }
            Effect::Finalize(reason) => {
                let record = session.take()?.finalize(sample.observed_at);
                let recorder = Arc::clone(&self.recorder);
                let to_write = record.clone();
                match run_blocking(move || recorder.append(&to_write)).await {
                    Some(Ok(())) => info!(
                        game = %record.game,
                        duration = %record.duration,
                        ?reason,
                        "Logged play time"
                    ),
                    Some(Err(e)) => {
                        warn!(error = %e, "Play time could not be logged");
                        publisher.emit(SessionEvent::LogWriteFailed { error: e.to_string() });
                    }
                    None => publisher.emit(SessionEvent::LogWriteFailed {
                        error: "log writer panicked".to_string(),
                    }),
                }
                Some((reason, record))
            }
            Effect::RestoreFocus => {
                let focus = Arc::clone(&self.focus);
                run_blocking(move || focus.restore_focus()).await;
                None
            }
        }
    }

    async fn sample(&self) -> Result<ProcessSample> {
        let sampler = Arc::clone(&self.sampler);
        let name = self.settings.process_name.clone();
        tokio::task::spawn_blocking(move || sampler.sample(&name))
            .await
            .map_err(|e| Error::MonitorJoin(e.to_string()))?
    }

    fn cancelled(&self, title: &str, publisher: &Publisher) -> SessionOutcome {
        info!(title = %title, "Session monitor cancelled");
        publisher.emit(SessionEvent::Cancelled);
        SessionOutcome::Cancelled
    }
}

struct Publisher {
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<LifecycleState>,
}

impl Publisher {
    /// 接收端已关闭时忽略
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn state(&self, state: LifecycleState) {
        self.state.send_replace(state);
    }
}

/// 在阻塞线程池执行，panic 时返回 None
async fn run_blocking<T, F>(f: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Blocking call failed");
            None
        }
    }
}

/// 等待一段时间，期间收到取消信号返回 true
async fn pause(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    if *cancel.borrow() {
        return true;
    }
    let changed = tokio::select! {
        _ = tokio::time::sleep(duration) => return false,
        changed = cancel.changed() => changed,
    };
    match changed {
        Ok(()) => *cancel.borrow(),
        // 句柄已释放，任务继续独立运行
        Err(_) => {
            tokio::time::sleep(duration).await;
            false
        }
    }
}

/// 调用方持有的会话句柄
#[derive(Debug)]
pub struct SessionHandle {
    title: String,
    pid: Option<u32>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    state: watch::Receiver<LifecycleState>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<SessionOutcome>>,
}

impl SessionHandle {
    pub fn title(&self) -> &str {
        &self.title
    }

    /// 启动器返回的 PID
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// 当前状态
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// 等待下一个事件，任务结束且事件取完后返回 None
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// 非阻塞读取事件，供 UI 帧循环调用
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// 请求停止监控，不会写日志
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 等待监控任务结束
    pub async fn wait(self) -> Result<SessionOutcome> {
        self.task.await.map_err(|e| Error::MonitorJoin(e.to_string()))?
    }
}
