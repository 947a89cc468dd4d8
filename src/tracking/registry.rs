// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪器注册表

use log::warn;

use super::strategy::ScoreWeights;
use super::tracker::Tracker;
use crate::detection::Detector;
use crate::error::{Result, TrackingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerKind {
    Disabled,
    DetectorBasedAny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerEntry {
    pub name: &'static str,
    pub kind: TrackerKind,
}

impl TrackerEntry {
    pub fn uses_detector(&self) -> bool {
        self.kind != TrackerKind::Disabled
    }

    /// 组装跟踪器; Disabled 会丢弃传入的检测器
    pub fn build(&self, detector: Detector, weights: ScoreWeights) -> Tracker {
        match self.kind {
            TrackerKind::Disabled => Tracker::Disabled,
            TrackerKind::DetectorBasedAny => Tracker::detector_based(detector, weights),
        }
    }
}

pub static TRACKERS: &[TrackerEntry] = &[
    TrackerEntry {
        name: "Disabled",
        kind: TrackerKind::Disabled,
    },
    TrackerEntry {
        name: "DetectorBasedTrackerAny",
        kind: TrackerKind::DetectorBasedAny,
    },
];

pub fn find(name: &str) -> Result<&'static TrackerEntry> {
    TRACKERS
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| TrackingError::NoTracker(name.to_string()))
}

/// 按名称查找, 找不到时回退到第一个条目
pub fn resolve(name: &str) -> &'static TrackerEntry {
    match find(name) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("⚠️ {}, 使用默认跟踪器 {}", e, TRACKERS[0].name);
            &TRACKERS[0]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::registry::DETECTORS;
    use crate::detection::DetectorOptions;

    #[test]
    fn test_registry_lookup() {
        assert_eq!(TRACKERS[0].name, "Disabled");
        assert!(find("DetectorBasedTrackerAny").unwrap().uses_detector());
        assert!(matches!(find("KCF"), Err(TrackingError::NoTracker(_))));
        assert_eq!(resolve("KCF").kind, TrackerKind::Disabled);
    }

    #[test]
    fn test_build_names_match() {
        for entry in TRACKERS {
            let tracker = entry.build(
                DETECTORS[0].build(DetectorOptions::default()),
                ScoreWeights::default(),
            );
            assert_eq!(tracker.name(), entry.name);
        }
    }
}
