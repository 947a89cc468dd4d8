// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 流水线配置 (JSON)
//!
//! 配置对象在入口处显式构造并注入, 注册表查询只发生在 build_tracker()。

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::detection::registry as detectors;
use crate::detection::{Detector, DetectorOptions};
use crate::error::Result;
use crate::pipeline::TrackParams;
use crate::tracking::registry as trackers;
use crate::tracking::{ScoreWeights, Tracker};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === 运行参数 ===
    pub confidence: f32,  // 最低置信度
    pub max_results: i32, // 最大结果数, -1 不限

    // === 选择 ===
    pub detector: String, // 检测器注册名
    pub tracker: String,  // 跟踪器注册名

    // === 模型 ===
    pub model: Option<String>,       // 覆盖默认模型 (路径或 URL)
    pub labels: Option<Vec<String>>, // 后备标签
    pub cache_dir: Option<PathBuf>,  // 下载缓存目录

    pub detector_options: DetectorOptions,
    pub scoring: ScoreWeights,

    pub stats_interval: u64, // 统计输出间隔 (帧)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            max_results: -1,
            detector: detectors::DETECTORS[0].name.to_string(),
            tracker: "DetectorBasedTrackerAny".to_string(),
            model: None,
            labels: None,
            cache_dir: None,
            detector_options: DetectorOptions::default(),
            scoring: ScoreWeights::default(),
            stats_interval: 100,
        }
    }
}

impl PipelineConfig {
    /// 读取配置; 文件不存在时写入并返回默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("📝 配置文件不存在, 创建默认配置: {}", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }
        let json = fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn params(&self) -> TrackParams {
        TrackParams {
            confidence: self.confidence,
            max_results: self.max_results,
        }
    }

    /// 按注册名构造检测器 (未加载)
    pub fn build_detector(&self) -> Detector {
        let entry = detectors::resolve(&self.detector);
        let mut detector = entry.build(self.detector_options.clone());
        if let Some(model) = &self.model {
            detector = detector.with_source(model.clone());
        }
        if let Some(labels) = &self.labels {
            detector = detector.with_labels(labels.clone());
        }
        if let Some(dir) = &self.cache_dir {
            detector = detector.with_cache_dir(dir.clone());
        }
        detector
    }

    /// 按注册名构造跟踪器, 未知名称回退到注册表第一项
    pub fn build_tracker(&self) -> Tracker {
        trackers::resolve(&self.tracker).build(self.build_detector(), self.scoring.clone())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前配置:");
        info!("  检测器: {} | 跟踪器: {}", self.detector, self.tracker);
        info!(
            "  置信度: {:.2} | 最大结果数: {} | NMS: {:?}",
            self.confidence, self.max_results, self.detector_options.nms_iou_threshold
        );
        if let Some(model) = &self.model {
            info!("  模型: {}", model);
        }
        if let Some(category) = self.scoring.category_filter {
            info!("  只跟踪类别: {}", category);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackingError;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("copilot-vision-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_load_creates_defaults() {
        let path = temp_path("config-default.json");
        std::fs::remove_file(&path).ok();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(path.exists());
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_partial_json_and_malformed() {
        let path = temp_path("config-partial.json");
        std::fs::write(&path, r#"{"confidence": 0.7, "scoring": {"category_filter": 0}}"#).unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.confidence, 0.7);
        assert_eq!(config.max_results, -1);
        assert_eq!(config.scoring.category_filter, Some(0));
        assert_eq!(config.scoring.distance_weight, 2.0);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(TrackingError::Json(_))
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_build_tracker_with_fallbacks() {
        let config = PipelineConfig {
            detector: "unknown-detector".into(),
            tracker: "unknown-tracker".into(),
            ..Default::default()
        };
        assert_eq!(config.build_tracker().name(), "Disabled");

        let config = PipelineConfig {
            model: Some("/tmp/custom.onnx".into()),
            ..Default::default()
        };
        let tracker = config.build_tracker();
        assert_eq!(tracker.name(), "DetectorBasedTrackerAny");
        let detector = tracker.detector().unwrap();
        assert_eq!(detector.name(), detectors::DETECTORS[0].name);
        assert_eq!(detector.source(), "/tmp/custom.onnx");
    }
}
