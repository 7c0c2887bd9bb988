//! 会话监控集成测试 - 用脚本化采样器驱动完整的生命周期

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use game_session_monitor::{
    Error, ExitReason, FocusController, LifecycleState, MonitorSettings, ProcessLauncher,
    ProcessSample, ProcessSampler, Result, Session, SessionController, SessionEvent,
    SessionMonitor, SessionOutcome, SessionRecorder, SystemControl, Thresholds,
};

const PID: u32 = 4242;

/// 按脚本返回采样，脚本用完后返回 `fallback`
struct ScriptedSampler {
    script: Mutex<VecDeque<Option<ProcessSample>>>,
    fallback: Option<u64>,
    base: DateTime<Local>,
    ticks: Mutex<i64>,
}

impl ScriptedSampler {
    /// `None` 表示进程不在进程表中
    fn new(base: DateTime<Local>, memory: &[Option<u64>]) -> Self {
        let script = memory
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let at = base + chrono::Duration::seconds(i as i64);
                Some(match m {
                    Some(kb) => ProcessSample::new(Some(PID), *kb, at),
                    None => ProcessSample::absent(at),
                })
            })
            .collect();
        Self {
            script: Mutex::new(script),
            fallback: None,
            base,
            ticks: Mutex::new(memory.len() as i64),
        }
    }

    /// 脚本用完后一直返回此内存值，用于模拟永不退出的进程
    fn with_fallback(mut self, memory_kb: u64) -> Self {
        self.fallback = Some(memory_kb);
        self
    }

    /// 在脚本末尾插入一次采样失败
    fn push_failure(self) -> Self {
        self.script.lock().unwrap().push_back(None);
        self
    }

    fn push(self, memory: Option<u64>) -> Self {
        let mut ticks = self.ticks.lock().unwrap();
        let at = self.base + chrono::Duration::seconds(*ticks);
        *ticks += 1;
        drop(ticks);
        self.script.lock().unwrap().push_back(Some(match memory {
            Some(kb) => ProcessSample::new(Some(PID), kb, at),
            None => ProcessSample::absent(at),
        }));
        self
    }
}

impl ProcessSampler for ScriptedSampler {
    fn sample(&self, _process_name: &str) -> Result<ProcessSample> {
        match self.script.lock().unwrap().pop_front() {
            Some(Some(sample)) => Ok(sample),
            Some(None) => Err(Error::SamplerUnavailable {
                tool: "scripted".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "tool missing"),
            }),
            None => Ok(match self.fallback {
                Some(kb) => ProcessSample::new(Some(PID), kb, Local::now()),
                None => ProcessSample::absent(Local::now()),
            }),
        }
    }
}

/// 记录所有副作用调用
#[derive(Default)]
struct CallLog {
    calls: Mutex<Vec<String>>,
}

impl CallLog {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl FocusController for CallLog {
    fn toggle_fullscreen(&self) {
        self.push("fullscreen".to_string());
    }

    fn restore_focus(&self) {
        self.push("restore".to_string());
    }
}

impl SystemControl for CallLog {
    fn terminate(&self, pid: u32) -> bool {
        self.push(format!("terminate:{}", pid));
        true
    }

    fn shutdown(&self, delay: Duration) -> Result<()> {
        self.push(format!("shutdown:{}", delay.as_secs()));
        Ok(())
    }
}

struct FakeLauncher;

impl ProcessLauncher for FakeLauncher {
    fn start(&self, _run_path: &Path) -> Result<u32> {
        Ok(PID)
    }
}

struct FailingLauncher;

impl ProcessLauncher for FailingLauncher {
    fn start(&self, _run_path: &Path) -> Result<u32> {
        Err(Error::Spawn {
            program: "rpcs3.exe".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        })
    }
}

fn settings(poll_interval: Duration) -> MonitorSettings {
    MonitorSettings {
        process_name: "rpcs3".to_string(),
        thresholds: Thresholds::new(1_000_000, 700_000).unwrap(),
        poll_interval,
        settle_delay: Duration::ZERO,
    }
}

fn monitor(
    sampler: ScriptedSampler,
    calls: &Arc<CallLog>,
    log_path: &Path,
    poll: Duration,
) -> SessionMonitor {
    SessionMonitor::new(
        settings(poll),
        Arc::new(sampler),
        calls.clone(),
        calls.clone(),
        Arc::new(SessionRecorder::new(log_path)),
    )
}

fn controller(
    launcher: Box<dyn ProcessLauncher>,
    sampler: ScriptedSampler,
    calls: &Arc<CallLog>,
    log_path: &Path,
) -> SessionController {
    SessionController::new(
        launcher,
        settings(Duration::from_millis(5)),
        Arc::new(sampler),
        calls.clone(),
        calls.clone(),
        Arc::new(SessionRecorder::new(log_path)),
    )
}

fn log_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("screen_time_log.csv")
}

async fn collect_events(handle: &mut game_session_monitor::SessionHandle) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_low_memory_exit_kills_and_logs() {
    // Given: 样本 [0, 0, 1.2M, 1.3M, 650K]，每秒一次
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let base = Local::now();
    let sampler = ScriptedSampler::new(
        base,
        &[Some(0), Some(0), Some(1_200_000), Some(1_300_000), Some(650_000)],
    );
    let calls = Arc::new(CallLog::default());

    // When: 监控运行到结束
    let mut handle = monitor(sampler, &calls, &path, Duration::ZERO)
        .spawn(Session::open("Journey", base), Some(PID));
    let events = collect_events(&mut handle).await;
    let state = handle.state();
    let outcome = handle.wait().await.unwrap();

    // Then: 第 3 个样本进入 Loaded，第 5 个样本进入 Exited
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], SessionEvent::Launching { title: "Journey".to_string() });
    assert_eq!(events[1], SessionEvent::Loaded { pid: Some(PID), memory_kb: 1_200_000 });
    match &events[2] {
        SessionEvent::Exited { reason, record } => {
            assert_eq!(*reason, ExitReason::LowMemory);
            assert_eq!(record.duration, "0:00:04");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(state, LifecycleState::Exited);
    assert_eq!(
        calls.calls(),
        vec!["fullscreen".to_string(), format!("terminate:{}", PID), "restore".to_string()]
    );
    assert!(matches!(outcome, SessionOutcome::Finished { reason: ExitReason::LowMemory, .. }));

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "Game,Start,End,Time Played");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("Journey,"));
    assert!(lines[1].ends_with(",0:00:04"));
}

#[tokio::test]
async fn test_process_vanishing_skips_kill_but_logs() {
    // Given: 样本 [0, 1.1M, 进程消失]
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let base = Local::now();
    let sampler = ScriptedSampler::new(base, &[Some(0), Some(1_100_000), None]);
    let calls = Arc::new(CallLog::default());

    let mut handle = monitor(sampler, &calls, &path, Duration::ZERO)
        .spawn(Session::open("Flower", base), Some(PID));
    let events = collect_events(&mut handle).await;
    let outcome = handle.wait().await.unwrap();

    // Then: 不调用 kill，但仍然写入记录
    assert_eq!(calls.calls(), vec!["fullscreen".to_string(), "restore".to_string()]);
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Exited { reason: ExitReason::ProcessGone, .. })
    ));
    match outcome {
        SessionOutcome::Finished { reason, record } => {
            assert_eq!(reason, ExitReason::ProcessGone);
            assert_eq!(record.game, "Flower");
            assert_eq!(record.duration, "0:00:02");
        }
        SessionOutcome::Cancelled => panic!("session should have finished"),
    }
    assert_eq!(SessionRecorder::new(&path).read_all().unwrap().len(), 1);
}

#[tokio::test]
async fn test_oscillation_inside_band_keeps_session_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let base = Local::now();
    let mut memory = vec![Some(1_500_000)];
    for i in 0..20 {
        memory.push(Some(if i % 2 == 0 { 750_000 } else { 990_000 }));
    }
    memory.push(Some(100_000));
    let sampler = ScriptedSampler::new(base, &memory);
    let calls = Arc::new(CallLog::default());

    let mut handle = monitor(sampler, &calls, &path, Duration::ZERO)
        .spawn(Session::open("Hover", base), Some(PID));
    let events = collect_events(&mut handle).await;
    handle.wait().await.unwrap();

    let loaded = events.iter().filter(|e| matches!(e, SessionEvent::Loaded { .. })).count();
    let exited = events.iter().filter(|e| matches!(e, SessionEvent::Exited { .. })).count();
    assert_eq!(loaded, 1);
    assert_eq!(exited, 1);
    assert_eq!(
        calls.calls().iter().filter(|c| c.starts_with("terminate")).count(),
        1
    );
    assert_eq!(SessionRecorder::new(&path).read_all().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sampler_failure_is_not_treated_as_exit() {
    // Given: 加载后连续两次采样失败，随后进程消失
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let base = Local::now();
    let sampler = ScriptedSampler::new(base, &[Some(1_200_000)])
        .push_failure()
        .push_failure()
        .push(Some(900_000))
        .push(None);
    let calls = Arc::new(CallLog::default());

    let mut handle = monitor(sampler, &calls, &path, Duration::ZERO)
        .spawn(Session::open("Flaky", base), Some(PID));
    let events = collect_events(&mut handle).await;
    let outcome = handle.wait().await.unwrap();

    // Then: 失败的采样被跳过，最终因进程消失结束
    assert!(matches!(
        outcome,
        SessionOutcome::Finished { reason: ExitReason::ProcessGone, .. }
    ));
    assert_eq!(events.iter().filter(|e| matches!(e, SessionEvent::Exited { .. })).count(), 1);
    assert!(!calls.calls().iter().any(|c| c.starts_with("terminate")));
}

#[tokio::test]
async fn test_cancel_stops_stuck_monitor_without_logging() {
    // Given: 进程一直停留在加载前的内存水平
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let sampler = ScriptedSampler::new(Local::now(), &[]).with_fallback(400_000);
    let calls = Arc::new(CallLog::default());

    let mut handle = monitor(sampler, &calls, &path, Duration::from_millis(5))
        .spawn(Session::open("Stuck", Local::now()), Some(PID));
    assert_eq!(
        handle.next_event().await,
        Some(SessionEvent::Launching { title: "Stuck".to_string() })
    );

    // When: 取消
    handle.cancel();
    let events = collect_events(&mut handle).await;
    let outcome = handle.wait().await.unwrap();

    // Then: 不写日志，也没有任何副作用
    assert_eq!(outcome, SessionOutcome::Cancelled);
    assert_eq!(events, vec![SessionEvent::Cancelled]);
    assert!(calls.calls().is_empty());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_log_write_failure_still_finishes_session() {
    let dir = tempfile::tempdir().unwrap();
    let base = Local::now();
    let sampler = ScriptedSampler::new(base, &[Some(1_200_000), Some(10)]);
    let calls = Arc::new(CallLog::default());

    // 目录不能作为日志文件打开
    let mut handle = monitor(sampler, &calls, dir.path(), Duration::ZERO)
        .spawn(Session::open("NoLog", base), Some(PID));
    let events = collect_events(&mut handle).await;
    let outcome = handle.wait().await.unwrap();

    assert!(events.iter().any(|e| matches!(e, SessionEvent::LogWriteFailed { .. })));
    assert!(matches!(outcome, SessionOutcome::Finished { .. }));
    assert_eq!(calls.calls().last().map(String::as_str), Some("restore"));
}

#[tokio::test]
async fn test_controller_allows_only_one_active_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let sampler = ScriptedSampler::new(Local::now(), &[]).with_fallback(400_000);
    let calls = Arc::new(CallLog::default());
    let controller = controller(Box::new(FakeLauncher), sampler, &calls, &path);

    // Given: 一个正在运行的会话
    let first = controller.start_session("First", Path::new("EBOOT.BIN")).unwrap();
    assert_eq!(first.pid(), Some(PID));
    assert!(controller.is_active());

    // When: 再启动一个
    let second = controller.start_session("Second", Path::new("EBOOT.BIN"));

    // Then: 被拒绝
    assert!(matches!(second, Err(Error::SessionActive { .. })));

    // 第一个结束后可以再次启动
    first.cancel();
    assert_eq!(first.wait().await.unwrap(), SessionOutcome::Cancelled);
    assert!(!controller.is_active());

    let third = controller.start_session("Third", Path::new("EBOOT.BIN")).unwrap();
    third.cancel();
    third.wait().await.unwrap();
}

#[tokio::test]
async fn test_controller_spawn_failure_releases_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let sampler = ScriptedSampler::new(Local::now(), &[]);
    let calls = Arc::new(CallLog::default());
    let controller = controller(Box::new(FailingLauncher), sampler, &calls, &path);

    let err = controller.start_session("Broken", Path::new("EBOOT.BIN")).unwrap_err();

    assert!(err.is_launch_failure());
    assert!(!controller.is_active());
    assert!(calls.calls().is_empty());
}

#[tokio::test]
async fn test_repeated_sessions_share_one_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);

    for title in ["Journey", "Flower", "flOw"] {
        let base = Local::now();
        let sampler = ScriptedSampler::new(base, &[Some(1_200_000), Some(100)]);
        let calls = Arc::new(CallLog::default());
        let controller = controller(Box::new(FakeLauncher), sampler, &calls, &path);

        let handle = controller.start_session(title, Path::new("EBOOT.BIN")).unwrap();
        assert!(matches!(handle.wait().await.unwrap(), SessionOutcome::Finished { .. }));
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "Game,Start,End,Time Played");
    assert_eq!(lines.len(), 4);
    assert_eq!(content.matches("Time Played").count(), 1);
}

#[tokio::test]
async fn test_controller_shutdown_uses_configured_delay() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(CallLog::default());
    let controller = controller(
        Box::new(FakeLauncher),
        ScriptedSampler::new(Local::now(), &[]),
        &calls,
        &log_path(&dir),
    )
    .with_shutdown_delay(Duration::from_secs(5));

    controller.shutdown_system().unwrap();

    assert_eq!(calls.calls(), vec!["shutdown:5".to_string()]);
}

#[tokio::test]
async fn test_frame_loop_polls_events_until_exit() {
    // Given: 一个很快结束的会话，由帧循环轮询
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let base = Local::now();
    let sampler = ScriptedSampler::new(base, &[Some(1_200_000), None]);
    let calls = Arc::new(CallLog::default());
    let mut handle = monitor(sampler, &calls, &path, Duration::ZERO)
        .spawn(Session::open("Frame", base), Some(PID));

    // When: 每帧非阻塞地取事件
    let mut events = Vec::new();
    for _ in 0..500 {
        while let Some(event) = handle.try_next_event() {
            events.push(event);
        }
        if matches!(events.last(), Some(SessionEvent::Exited { .. })) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Then: 收到完整事件序列，任务随后结束
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], SessionEvent::Launching { .. }));
    assert!(matches!(events[1], SessionEvent::Loaded { .. }));
    assert!(matches!(
        events[2],
        SessionEvent::Exited { reason: ExitReason::ProcessGone, .. }
    ));

    for _ in 0..500 {
        if handle.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(handle.is_finished());
    assert_eq!(handle.try_next_event(), None);
    assert!(matches!(handle.wait().await.unwrap(), SessionOutcome::Finished { .. }));
}
