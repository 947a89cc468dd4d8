// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪流水线 (PipelineRunner)
//!
//! 采集线程 feed() → 单槽邮箱 → 跟踪线程 track() → 事件
//!
//! 状态机: Idle → Loading → Running → Stopping → Idle
//!
//! 跟踪器 (及其检测器/模型) 在 start() 时移交给跟踪线程独占,
//! stop() 时随 JoinHandle 交还, 模型句柄不需要额外的锁。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::{debug, error, info, trace, warn};

use super::events::{EventHub, PipelineEvent, TrackResult};
use super::mailbox::{Mail, Mailbox};
use crate::detection::{Detection, Detector, Frame};
use crate::error::{Result, TrackingError};
use crate::tracking::Tracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Loading,
    Running,
    Stopping,
}

/// 每帧读取的运行参数 (可在运行中修改)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackParams {
    pub confidence: f32,
    /// <= 0 表示不限
    pub max_results: i32,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            max_results: -1,
        }
    }
}

/// 采集线程与跟踪线程共享的状态
struct Shared {
    state: Mutex<RunnerState>,
    params: Mutex<TrackParams>,
    next_frame_id: AtomicU64,
    frames_dropped: AtomicU64,
}

impl Shared {
    fn state(&self) -> RunnerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RunnerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// 仅当当前状态为 from 时切换
    fn transition(&self, from: RunnerState, to: RunnerState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn params(&self) -> TrackParams {
        *self.params.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct PipelineRunner {
    /// 空闲时由 runner 持有, 运行时移交给跟踪线程
    tracker: Option<Tracker>,
    worker: Option<JoinHandle<Tracker>>,
    mailbox: Arc<Mailbox<(u64, Frame)>>,
    shared: Arc<Shared>,
    events: Arc<EventHub>,
    stats_interval: u64,
}

impl PipelineRunner {
    pub fn new(tracker: Tracker, params: TrackParams) -> Self {
        Self {
            tracker: Some(tracker),
            worker: None,
            mailbox: Arc::new(Mailbox::new()),
            shared: Arc::new(Shared {
                state: Mutex::new(RunnerState::Idle),
                params: Mutex::new(params),
                next_frame_id: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
            }),
            events: Arc::new(EventHub::default()),
            stats_interval: 100,
        }
    }

    /// 每处理 N 帧输出一次平均耗时 (0 表示关闭)
    pub fn with_stats_interval(mut self, frames: u64) -> Self {
        self.stats_interval = frames;
        self
    }

    pub fn state(&self) -> RunnerState {
        self.shared.state()
    }

    /// 跟踪线程是否在加载或运行 (加载失败后自行回到 Idle)
    pub fn is_running(&self) -> bool {
        matches!(self.state(), RunnerState::Loading | RunnerState::Running)
    }

    pub fn params(&self) -> TrackParams {
        self.shared.params()
    }

    pub fn set_params(&self, params: TrackParams) {
        *self
            .shared
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = params;
    }

    pub fn frames_dropped(&self) -> u64 {
        self.shared.frames_dropped.load(Ordering::Relaxed)
    }

    /// 订阅所有事件 (在跟踪线程上发送)
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// 注册跟踪回调 (tracked, all_detections), 在跟踪线程上执行
    pub fn on_track<F>(&self, callback: F)
    where
        F: FnMut(Option<&Detection>, &[Detection]) + Send + 'static,
    {
        self.events.on_track(Box::new(callback));
    }

    /// 当前跟踪器名称 (运行中时不可见)
    pub fn tracker_name(&self) -> Option<&'static str> {
        self.tracker.as_ref().map(|t| t.name())
    }

    /// 启动跟踪线程; 已在运行则先停止
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            self.stop()?;
        }
        let tracker = self
            .tracker
            .take()
            .ok_or_else(|| TrackingError::Worker("no tracker to run".into()))?;
        info!("🚀 跟踪流水线启动: {}", tracker.name());

        self.mailbox.reset();
        self.events.rearm();
        self.shared.set_state(RunnerState::Loading);

        let mailbox = self.mailbox.clone();
        let shared = self.shared.clone();
        let events = self.events.clone();
        let stats_interval = self.stats_interval;
        let spawned = std::thread::Builder::new()
            .name("tracking-worker".into())
            .spawn(move || worker_loop(tracker, &mailbox, &shared, &events, stats_interval));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("❌ 跟踪线程创建失败: {}", e);
                self.shared.set_state(RunnerState::Idle);
                Err(TrackingError::Worker(e.to_string()))
            }
        }
    }

    /// 注入停止哨兵并等待跟踪线程退出; 未运行时直接返回
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        self.shared.transition(RunnerState::Running, RunnerState::Stopping);
        self.shared.transition(RunnerState::Loading, RunnerState::Stopping);
        self.mailbox.close();

        let joined = handle.join();
        self.shared.set_state(RunnerState::Idle);
        match joined {
            Ok(tracker) => {
                self.tracker = Some(tracker);
                info!("🛑 跟踪流水线已停止");
                Ok(())
            }
            Err(_) => {
                error!("❌ 跟踪线程异常退出, 跟踪器已丢失");
                Err(TrackingError::Worker("tracking worker panicked".into()))
            }
        }
    }

    /// 投递一帧 (从不阻塞), 返回帧序号; 跟踪线程忙时旧帧被覆盖丢弃
    pub fn feed(&self, frame: Frame) -> u64 {
        let id = self.shared.next_frame_id.fetch_add(1, Ordering::Relaxed) + 1;
        if self.state() == RunnerState::Idle {
            trace!("流水线空闲, 丢弃帧 {}", id);
            return id;
        }
        if self.mailbox.post((id, frame)) {
            self.shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
            trace!("跟踪线程忙, 覆盖旧帧 (最新 {})", id);
        }
        id
    }

    /// 替换跟踪器: 运行中则先停止, 替换后重新启动
    pub fn set_tracker(&mut self, tracker: Tracker) -> Result<()> {
        let was_running = self.is_running();
        self.stop()?;
        info!("🔄 跟踪器切换: {}", tracker.name());
        self.tracker = Some(tracker);
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    /// 替换检测器, 与 set_tracker 相同的停止/重启语义
    pub fn set_detector(&mut self, detector: Detector) -> Result<()> {
        let was_running = self.is_running();
        self.stop()?;
        let tracker = self
            .tracker
            .as_mut()
            .ok_or_else(|| TrackingError::Worker("no tracker to update".into()))?;
        let mut old = tracker.swap_detector(detector);
        old.unload();
        if was_running {
            self.start()?;
        }
        Ok(())
    }
}

impl Drop for PipelineRunner {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("⚠️ 关闭流水线失败: {}", e);
        }
    }
}

/// 跟踪线程主循环, 退出时交还跟踪器
fn worker_loop(
    mut tracker: Tracker,
    mailbox: &Mailbox<(u64, Frame)>,
    shared: &Shared,
    events: &EventHub,
    stats_interval: u64,
) -> Tracker {
    debug!("🔍 跟踪线程启动");

    let loaded = tracker.load(&mut |p| events.publish(PipelineEvent::LoadProgress(p)));
    if let Err(e) = loaded {
        error!("❌ 跟踪器 {} 加载失败: {}", tracker.name(), e);
        events.publish(PipelineEvent::LoadFailed(e.to_string()));
        shared.set_state(RunnerState::Idle);
        events.publish(PipelineEvent::Stopped);
        return tracker;
    }
    shared.transition(RunnerState::Loading, RunnerState::Running);

    // 统计窗口
    let mut count: u64 = 0;
    let mut window = Duration::ZERO;

    loop {
        let (frame_id, frame) = match mailbox.take() {
            Mail::Item(item) => item,
            Mail::Stop => break,
        };
        let params = shared.params();
        let t_start = Instant::now();
        match tracker.track(&frame, params.confidence, params.max_results) {
            Ok((tracked, detections)) => {
                let elapsed = t_start.elapsed();
                events.publish(PipelineEvent::Track(TrackResult {
                    frame_id,
                    tracked,
                    detections,
                    elapsed,
                }));

                count += 1;
                window += elapsed;
                if stats_interval > 0 && count >= stats_interval {
                    let mean_ms = window.as_secs_f64() * 1000.0 / count as f64;
                    info!(
                        "📊 跟踪: {:.1} ms/帧 (最高 {:.1} FPS), 累计丢帧 {}",
                        mean_ms,
                        if mean_ms > 0.0 { 1000.0 / mean_ms } else { 0.0 },
                        shared.frames_dropped.load(Ordering::Relaxed)
                    );
                    count = 0;
                    window = Duration::ZERO;
                }
            }
            Err(e) => {
                warn!("⚠️ 帧 {} 跟踪失败, 跳过: {}", frame_id, e);
                events.publish(PipelineEvent::TrackFailed {
                    frame_id,
                    error: e.to_string(),
                });
            }
        }
    }

    tracker.unload();
    events.publish(PipelineEvent::Stopped);
    debug!("跟踪线程退出");
    tracker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::engine::testing::{ssd_outputs, u8_spec, FixedEngine};
    use crate::detection::engine::{InputDtype, InputSpec, InputTensor, TensorLayout};
    use crate::detection::{DetectorKind, DetectorOptions};
    use crate::tracking::ScoreWeights;
    use crossbeam_channel::{bounded, unbounded};
    use ndarray::Array3;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn frame() -> Frame {
        Frame::U8(Array3::zeros((4, 4, 3)))
    }

    fn fixed_detector(engine: FixedEngine) -> Detector {
        Detector::new("fixed", DetectorKind::SsdPostprocessed, "", DetectorOptions::default())
            .with_engine(Box::new(engine))
    }

    fn wait_stopped(rx: &Receiver<PipelineEvent>) {
        loop {
            match rx.recv_timeout(TIMEOUT).unwrap() {
                PipelineEvent::Stopped => return,
                _ => continue,
            }
        }
    }

    #[test]
    fn test_stop_idle_runner() {
        let mut runner = PipelineRunner::new(Tracker::Disabled, TrackParams::default());
        assert_eq!(runner.state(), RunnerState::Idle);
        runner.stop().unwrap();
        runner.stop().unwrap();
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    #[test]
    fn test_latest_frame_wins() {
        let (started_tx, started_rx) = unbounded();
        let (gate_tx, gate_rx) = unbounded::<()>();
        let engine = FixedEngine::new(
            u8_spec(4, 4),
            ssd_outputs(&[([0.0, 0.0, 0.5, 0.5], 0, 0.9)], 0),
        )
        .with_hook(Box::new(move |_: &InputTensor| {
            started_tx.send(()).ok();
            gate_rx.recv_timeout(TIMEOUT).ok();
        }));
        let tracker = Tracker::detector_based(fixed_detector(engine), ScoreWeights::default());
        let mut runner = PipelineRunner::new(tracker, TrackParams::default());

        let (track_tx, track_rx) = unbounded();
        runner.on_track(move |tracked, all| {
            track_tx.send((tracked.cloned(), all.len())).ok();
        });
        let events = runner.subscribe();
        runner.start().unwrap();

        assert_eq!(runner.feed(frame()), 1);
        // 帧 1 正在处理
        started_rx.recv_timeout(TIMEOUT).unwrap();
        for _ in 2..=5 {
            runner.feed(frame());
        }
        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();

        let mut processed = vec![];
        while processed.len() < 2 {
            if let PipelineEvent::Track(result) = events.recv_timeout(TIMEOUT).unwrap() {
                processed.push(result.frame_id);
            }
        }
        assert_eq!(processed, vec![1, 5]);
        assert_eq!(runner.frames_dropped(), 3);

        runner.stop().unwrap();
        assert_eq!(runner.state(), RunnerState::Idle);
        let fired: Vec<_> = track_rx.try_iter().collect();
        assert_eq!(fired.len(), 2);
        assert!(fired.iter().all(|(t, n)| t.is_some() && *n == 1));
        assert!(started_rx.try_recv().is_ok());
        assert!(started_rx.try_recv().is_err());
    }

    #[test]
    fn test_load_failure_returns_to_idle() {
        let det = Detector::new(
            "missing",
            DetectorKind::SsdPostprocessed,
            "/nonexistent/copilot-vision/model.onnx",
            DetectorOptions::default(),
        );
        let tracker = Tracker::detector_based(det, ScoreWeights::default());
        let mut runner = PipelineRunner::new(tracker, TrackParams::default());
        let events = runner.subscribe();
        runner.start().unwrap();

        let mut failed = false;
        loop {
            match events.recv_timeout(TIMEOUT).unwrap() {
                PipelineEvent::LoadFailed(_) => failed = true,
                PipelineEvent::LoadProgress(p) => assert!(p < 1.0),
                PipelineEvent::Stopped => break,
                PipelineEvent::Track(_) | PipelineEvent::TrackFailed { .. } => {
                    panic!("no frame was fed")
                }
            }
        }
        assert!(failed);
        assert_eq!(runner.state(), RunnerState::Idle);
        assert!(!runner.is_running());
        // 跟踪器被交还, 可以再次 stop/start
        runner.stop().unwrap();
        assert_eq!(runner.tracker_name(), Some("DetectorBasedTrackerAny"));
    }

    #[test]
    fn test_restart_and_swap() {
        let (seen_tx, seen_rx) = bounded(16);
        let mut runner = PipelineRunner::new(Tracker::Disabled, TrackParams::default());
        let events = runner.subscribe();
        runner.on_track(move |tracked, _| {
            seen_tx.send(tracked.map(|d| d.confidence)).ok();
        });
        runner.start().unwrap();
        runner.start().unwrap();
        // 第一次运行被 stop
        wait_stopped(&events);

        let empty = fixed_detector(FixedEngine::new(u8_spec(4, 4), ssd_outputs(&[], 0)));
        runner
            .set_tracker(Tracker::detector_based(empty, ScoreWeights::default()))
            .unwrap();
        wait_stopped(&events);
        runner.feed(frame());
        assert_eq!(seen_rx.recv_timeout(TIMEOUT).unwrap(), None);

        runner
            .set_detector(fixed_detector(FixedEngine::new(
                u8_spec(4, 4),
                ssd_outputs(&[([0.0, 0.0, 0.5, 0.5], 0, 0.8)], 0),
            )))
            .unwrap();
        wait_stopped(&events);
        assert!(runner.is_running());

        runner.feed(frame());
        assert_eq!(seen_rx.recv_timeout(TIMEOUT).unwrap(), Some(0.8));

        runner.set_params(TrackParams {
            confidence: 0.9,
            max_results: -1,
        });
        runner.feed(frame());
        assert_eq!(seen_rx.recv_timeout(TIMEOUT).unwrap(), None);
    }

    #[test]
    fn test_failed_frame_is_reported_and_skipped() {
        // int8 输入无法转换, 每帧都会失败
        let spec = InputSpec {
            width: 4,
            height: 4,
            dtype: InputDtype::Other("int8".into()),
            layout: TensorLayout::Nhwc,
        };
        let engine = FixedEngine::new(spec, ssd_outputs(&[], 0));
        let tracker = Tracker::detector_based(fixed_detector(engine), ScoreWeights::default());
        let mut runner = PipelineRunner::new(tracker, TrackParams::default());
        let events = runner.subscribe();
        runner.start().unwrap();

        let mut ids = vec![];
        for _ in 0..2 {
            let id = runner.feed(frame());
            loop {
                match events.recv_timeout(TIMEOUT).unwrap() {
                    PipelineEvent::TrackFailed { frame_id, error } => {
                        assert!(!error.is_empty());
                        ids.push(frame_id);
                        break;
                    }
                    PipelineEvent::Track(_) => panic!("frame should fail"),
                    _ => continue,
                }
            }
            assert_eq!(ids.last(), Some(&id));
        }
        assert_eq!(ids, vec![1, 2]);
        assert!(runner.is_running());
        runner.stop().unwrap();
    }

    #[test]
    fn test_feed_when_idle_is_discarded() {
        let runner = PipelineRunner::new(Tracker::Disabled, TrackParams::default());
        assert_eq!(runner.feed(frame()), 1);
        assert_eq!(runner.feed(frame()), 2);
        assert_eq!(runner.frames_dropped(), 0);
    }
}
