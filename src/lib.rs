#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 流水线配置 (JSON)
pub mod detection; // 单帧目标检测
pub mod download; // 模型下载与缓存
pub mod error; // 错误类型
pub mod pipeline; // 跟踪线程与单槽邮箱
pub mod progress; // 加载进度
pub mod tracking; // 跟踪策略与注册表

pub use crate::config::PipelineConfig;
pub use crate::detection::{
    Category, Detection, Detector, DetectorKind, DetectorOptions, Frame, Rect,
};
pub use crate::error::{Result, TrackingError};
pub use crate::pipeline::{PipelineEvent, PipelineRunner, RunnerState, TrackParams, TrackResult};
pub use crate::tracking::{ScoreWeights, Tracker};
