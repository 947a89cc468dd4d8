// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测/跟踪流水线的错误类型
//! Error types of the detection + tracking pipeline

use thiserror::Error;

/// 库内统一的 Result 别名
pub type Result<T> = std::result::Result<T, TrackingError>;

#[derive(Error, Debug)]
pub enum TrackingError {
    /// 模型文件缺失/损坏, 或下载失败
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// 请求了硬件加速, 但当前平台不可用
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// load() 之前调用了 detect()
    #[error("detector `{0}` is not loaded")]
    NotLoaded(String),

    /// 输入的 dtype / shape 与模型不匹配
    #[error("invalid input: {0}")]
    Value(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("no detector named `{0}`")]
    NoDetector(String),

    #[error("no tracker named `{0}`")]
    NoTracker(String),

    /// 工作线程无法启动或异常退出
    #[error("tracking worker unavailable: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackingError {
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    pub fn value<S: Into<String>>(msg: S) -> Self {
        Self::Value(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }
}
