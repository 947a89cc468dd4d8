// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪器 (Tracker)
//!
//! 封闭的变体集合:
//! - `Disabled`:      不跟踪, 总是返回 (None, []), 用于无开销地测试上层
//! - `DetectorBased`: 每帧运行检测器, 再用打分策略挑出跟随目标

use log::{info, warn};

use super::strategy::{ScoreWeights, TrackAnyByScore};
use crate::detection::{Detection, Detector, Frame};
use crate::error::Result;
use crate::progress::Progress;

/// (跟随目标, 本帧全部检测结果)
pub type TrackOutput = (Option<Detection>, Vec<Detection>);

#[derive(Debug)]
pub struct DetectorBasedTracker {
    detector: Detector,
    strategy: TrackAnyByScore,
}

impl DetectorBasedTracker {
    pub fn new(detector: Detector, weights: ScoreWeights) -> Self {
        Self {
            detector,
            strategy: TrackAnyByScore::new(weights),
        }
    }

    pub fn strategy(&self) -> &TrackAnyByScore {
        &self.strategy
    }
}

#[derive(Debug)]
pub enum Tracker {
    Disabled,
    DetectorBased(DetectorBasedTracker),
}

impl Tracker {
    pub fn detector_based(detector: Detector, weights: ScoreWeights) -> Self {
        Tracker::DetectorBased(DetectorBasedTracker::new(detector, weights))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tracker::Disabled => "Disabled",
            Tracker::DetectorBased(_) => "DetectorBasedTrackerAny",
        }
    }

    pub fn detector(&self) -> Option<&Detector> {
        match self {
            Tracker::Disabled => None,
            Tracker::DetectorBased(t) => Some(&t.detector),
        }
    }

    /// 替换检测器, 返回被替换下来的 (未卸载) 检测器;
    /// Disabled 不持有检测器, 传入的检测器原样返回
    pub fn swap_detector(&mut self, detector: Detector) -> Detector {
        match self {
            Tracker::Disabled => {
                warn!("⚠️ 跟踪器 Disabled 不使用检测器, 忽略 {}", detector.name());
                detector
            }
            Tracker::DetectorBased(t) => {
                info!("🔄 检测器切换: {} → {}", t.detector.name(), detector.name());
                t.strategy.reset();
                std::mem::replace(&mut t.detector, detector)
            }
        }
    }

    /// 加载; 检测器进度映射到 [0, 0.99], 最后一次 1.0 由跟踪器给出
    pub fn load(&mut self, callback: &mut dyn FnMut(f32)) -> Result<()> {
        let mut progress = Progress::new(callback);
        if let Tracker::DetectorBased(t) = self {
            t.detector.load(&mut |p| progress.report(p * 0.99))?;
        }
        progress.finish();
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            Tracker::Disabled => true,
            Tracker::DetectorBased(t) => t.detector.is_loaded(),
        }
    }

    pub fn unload(&mut self) {
        if let Tracker::DetectorBased(t) = self {
            t.detector.unload();
            t.strategy.reset();
        }
    }

    pub fn track(
        &mut self,
        frame: &Frame,
        min_confidence: f32,
        max_results: i32,
    ) -> Result<TrackOutput> {
        match self {
            Tracker::Disabled => Ok((None, vec![])),
            Tracker::DetectorBased(t) => {
                let all = t.detector.detect(frame, min_confidence, max_results)?;
                let tracked = t.strategy.select(&all);
                Ok((tracked, all))
            }
        }
    }
}
