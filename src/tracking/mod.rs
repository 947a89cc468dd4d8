// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 跟踪系统 (Tracking System)
///
/// 在逐帧检测结果中挑出一个跟随目标
pub mod registry;
pub mod strategy;
pub mod tracker;

pub use registry::{TrackerEntry, TrackerKind, TRACKERS};
pub use strategy::{ScoreWeights, TrackAnyByScore};
pub use tracker::{DetectorBasedTracker, TrackOutput, Tracker};
