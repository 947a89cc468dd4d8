// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器注册表 (启动时查询的静态表)

use log::warn;

use super::detector::{Detector, DetectorOptions};
use super::postprocess::DetectorKind;
use crate::error::{Result, TrackingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorEntry {
    /// 稳定的显示名称
    pub name: &'static str,
    pub kind: DetectorKind,
    /// 默认模型 (可被配置中的 model 覆盖)
    pub model: &'static str,
}

impl DetectorEntry {
    /// 构造一个尚未加载的检测器
    pub fn build(&self, options: DetectorOptions) -> Detector {
        Detector::new(self.name, self.kind, self.model, options)
    }
}

pub static DETECTORS: &[DetectorEntry] = &[
    DetectorEntry {
        name: "EfficientDet-Lite0",
        kind: DetectorKind::SsdPostprocessed,
        model: "models/efficientdet_lite0.onnx",
    },
    DetectorEntry {
        name: "YOLOv5s",
        kind: DetectorKind::YoloV5,
        model: "models/yolov5s.onnx",
    },
];

pub fn find(name: &str) -> Result<&'static DetectorEntry> {
    DETECTORS
        .iter()
        .find(|d| d.name == name)
        .ok_or_else(|| TrackingError::NoDetector(name.to_string()))
}

/// 按名称查找, 找不到时回退到第一个条目
pub fn resolve(name: &str) -> &'static DetectorEntry {
    match find(name) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("⚠️ {}, 使用默认检测器 {}", e, DETECTORS[0].name);
            &DETECTORS[0]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_and_fallback() {
        assert_eq!(find("YOLOv5s").unwrap().kind, DetectorKind::YoloV5);
        assert!(matches!(find("nope"), Err(TrackingError::NoDetector(n)) if n == "nope"));
        assert_eq!(resolve("nope").name, DETECTORS[0].name);
    }

    #[test]
    fn test_build_is_unloaded() {
        let det = DETECTORS[0].build(DetectorOptions::default());
        assert!(!det.is_loaded());
        assert_eq!(det.name(), "EfficientDet-Lite0");
    }
}
