// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 流水线事件 (跟踪线程 → 订阅者)
//!
//! 事件在跟踪线程上发布, 订阅者需要自行切回自己的线程。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::warn;

use crate::detection::Detection;

/// 单帧跟踪结果
#[derive(Clone, Debug, PartialEq)]
pub struct TrackResult {
    pub frame_id: u64, // 对应 feed() 返回的帧序号
    pub tracked: Option<Detection>,
    pub detections: Vec<Detection>,
    pub elapsed: Duration, // 跟踪耗时
}

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    /// 加载进度 [0, 1]
    LoadProgress(f32),
    LoadFailed(String),
    Track(TrackResult),
    /// 单帧处理失败, 该帧被跳过
    TrackFailed { frame_id: u64, error: String },
    /// 工作线程已退出
    Stopped,
}

pub type TrackCallback = Box<dyn FnMut(Option<&Detection>, &[Detection]) + Send>;

/// 事件分发: channel 订阅者 + on_track 回调
#[derive(Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<PipelineEvent>>>,
    track_callbacks: Mutex<Vec<TrackCallback>>,
    warned_no_listener: AtomicBool,
}

impl EventHub {
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn on_track(&self, callback: TrackCallback) {
        self.track_callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    /// 新一轮运行, 重新允许 "无监听者" 警告
    pub fn rearm(&self) {
        self.warned_no_listener.store(false, Ordering::Relaxed);
    }

    pub fn publish(&self, event: PipelineEvent) {
        let mut delivered = false;

        if let PipelineEvent::Track(result) = &event {
            let mut callbacks = self
                .track_callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for cb in callbacks.iter_mut() {
                cb(result.tracked.as_ref(), &result.detections);
            }
            delivered |= !callbacks.is_empty();
        }

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.len() < before {
            warn!(
                "⚠️ {} 个事件订阅者已断开, 已移除",
                before - subscribers.len()
            );
        }
        delivered |= !subscribers.is_empty();

        if !delivered
            && matches!(event, PipelineEvent::Track(_))
            && !self.warned_no_listener.swap(true, Ordering::Relaxed)
        {
            warn!("⚠️ 跟踪结果没有监听者 (on_track / subscribe)");
        }
    }
}
