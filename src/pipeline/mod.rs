// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 跟踪流水线 (Tracking Pipeline)
///
/// 双线程架构, 通过单槽邮箱解耦:
/// - 采集线程: feed() 从不阻塞, 只保留最新一帧
/// - 跟踪线程: 检测 + 跟踪, 结果以事件发布
pub mod events;
pub mod mailbox;
pub mod runner;

pub use events::{PipelineEvent, TrackCallback, TrackResult};
pub use mailbox::{Mail, Mailbox};
pub use runner::{PipelineRunner, RunnerState, TrackParams};
