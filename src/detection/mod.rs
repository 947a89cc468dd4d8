// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统 (Detection System)
///
/// 单帧目标检测, 由跟踪线程调用
/// - Frame → letterbox → 推理 → 过滤链 → Vec<Detection>
pub mod detector;
pub mod engine;
pub mod frame;
pub mod labels;
pub mod postprocess;
pub mod preprocess;
pub mod registry;
pub mod types;

pub use detector::{Detector, DetectorOptions, DetectorState};
pub use engine::{InferenceEngine, InputDtype, InputSpec, InputTensor, OrtEngine, TensorLayout};
pub use frame::{Frame, PixelType};
pub use postprocess::{non_max_suppression, DetectorKind, RawDetections};
pub use preprocess::Letterbox;
pub use registry::{DetectorEntry, DETECTORS};
pub use types::{Category, Detection, Rect};
