// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪策略: 按分数选择要跟随的目标 (track-any-by-score)
//!
//! ```text
//! score = conf * confidence_weight
//!       + same_category_weight          (与上一帧目标同类别)
//!       + IoU(上一帧框, 候选框) * distance_weight
//! ```
//! 类别不符或总分低于 min_score 的候选直接淘汰 (-∞)。

use serde::{Deserialize, Serialize};

use crate::detection::Detection;

/// 打分权重
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// 只跟踪该类别, None 表示任意类别
    pub category_filter: Option<u32>,
    pub same_category_weight: f32,
    pub confidence_weight: f32,
    /// 与上一帧目标 IoU 的权重
    pub distance_weight: f32,
    pub min_score: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            category_filter: None,
            same_category_weight: 1.0,
            confidence_weight: 1.0,
            distance_weight: 2.0,
            min_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackAnyByScore {
    weights: ScoreWeights,
    last_tracked: Option<Detection>,
}

impl TrackAnyByScore {
    pub fn new(weights: ScoreWeights) -> Self {
        Self {
            weights,
            last_tracked: None,
        }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn last_tracked(&self) -> Option<&Detection> {
        self.last_tracked.as_ref()
    }

    pub fn score(&self, candidate: &Detection) -> f32 {
        let w = &self.weights;
        if let Some(category) = w.category_filter {
            if candidate.category.id != category {
                return f32::NEG_INFINITY;
            }
        }
        let mut score = candidate.confidence * w.confidence_weight;
        if let Some(prev) = &self.last_tracked {
            if prev.category.id == candidate.category.id {
                score += w.same_category_weight;
            }
            score += prev.bounding_box.iou(&candidate.bounding_box) * w.distance_weight;
        }
        // NaN 框或置信度不参与比较
        if !score.is_finite() || score < w.min_score {
            return f32::NEG_INFINITY;
        }
        score
    }

    /// 选出分数最高的候选 (同分取第一个); 没有合格候选时返回 None 并保留上一次的目标
    pub fn select(&mut self, detections: &[Detection]) -> Option<Detection> {
        let mut best: Option<(usize, f32)> = None;
        for (i, d) in detections.iter().enumerate() {
            let s = self.score(d);
            if s == f32::NEG_INFINITY {
                continue;
            }
            match best {
                Some((_, b)) if s <= b => {}
                _ => best = Some((i, s)),
            }
        }
        let (index, _) = best?;
        let chosen = detections[index].clone();
        self.last_tracked = Some(chosen.clone());
        Some(chosen)
    }

    pub fn reset(&mut self) {
        self.last_tracked = None;
    }
}
