// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 后处理: 原始输出解码 → 过滤链 → NMS
//!
//! 过滤顺序固定:
//! ```text
//! count 截断 → min_conf → 反 letterbox → 稳定降序 → deny → allow → NMS → max_results
//! ```

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use super::detector::DetectorOptions;
use super::engine::InputSpec;
use super::preprocess::Letterbox;
use super::types::{Category, Detection, Rect};
use crate::error::{Result, TrackingError};

/// 解码后的原始输出, 框为 letterbox 空间的 [y_min, x_min, y_max, x_max]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetections {
    pub boxes: Vec<[f32; 4]>,
    pub classes: Vec<u32>,
    pub scores: Vec<f32>,
    /// 有效条目数, 其余为 padding
    pub count: usize,
}

impl RawDetections {
    pub fn len(&self) -> usize {
        self.boxes.len().min(self.classes.len()).min(self.scores.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 检测器输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorKind {
    /// EfficientDet-Lite / SSD: 模型内已做后处理, 输出 boxes / classes / scores / count
    SsdPostprocessed,
    /// YOLOv5: 单个输出 [1, N, 5 + C] = cx, cy, w, h, obj, cls...
    YoloV5,
}

impl DetectorKind {
    pub fn decode(&self, outputs: &[ArrayD<f32>], spec: &InputSpec) -> Result<RawDetections> {
        match self {
            DetectorKind::SsdPostprocessed => decode_ssd(outputs),
            DetectorKind::YoloV5 => decode_yolov5(outputs, spec),
        }
    }
}

fn decode_ssd(outputs: &[ArrayD<f32>]) -> Result<RawDetections> {
    if outputs.len() < 4 {
        return Err(TrackingError::inference(format!(
            "SSD model should produce 4 outputs, got {}",
            outputs.len()
        )));
    }
    let flat: Vec<f32> = outputs[0].iter().copied().collect();
    if flat.len() % 4 != 0 {
        return Err(TrackingError::inference(format!(
            "box output shape {:?} is not N x 4",
            outputs[0].shape()
        )));
    }
    let boxes: Vec<[f32; 4]> = flat
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect();
    let classes: Vec<u32> = outputs[1]
        .iter()
        .map(|c| c.round().max(0.) as u32)
        .collect();
    let scores: Vec<f32> = outputs[2].iter().copied().collect();
    let count = outputs[3]
        .iter()
        .next()
        .map(|c| c.max(0.) as usize)
        .unwrap_or(0);
    Ok(RawDetections {
        boxes,
        classes,
        scores,
        count,
    })
}

fn decode_yolov5(outputs: &[ArrayD<f32>], spec: &InputSpec) -> Result<RawDetections> {
    let ys = outputs
        .first()
        .ok_or_else(|| TrackingError::inference("YOLOv5 model produced no output"))?;
    let shape = ys.shape();
    let stride = *shape.last().unwrap_or(&0);
    if stride < 6 {
        return Err(TrackingError::inference(format!(
            "YOLOv5 output shape {:?} has no class scores",
            shape
        )));
    }
    // ONNX 导出的 YOLOv5 坐标以输入像素为单位
    let (sx, sy) = (spec.width as f32, spec.height as f32);
    let flat: Vec<f32> = ys.iter().copied().collect();

    let mut raw = RawDetections::default();
    for row in flat.chunks_exact(stride) {
        let (cx, cy, w, h) = (row[0] / sx, row[1] / sy, row[2] / sx, row[3] / sy);
        raw.boxes
            .push([cy - h / 2., cx - w / 2., cy + h / 2., cx + w / 2.]);
        raw.scores.push(row[4]);
        // argmax, 并列时取第一个
        let (class, _) = row[5..]
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, &s)| {
                if s > best.1 {
                    (i, s)
                } else {
                    best
                }
            });
        raw.classes.push(class as u32);
    }
    raw.count = raw.boxes.len();
    Ok(raw)
}

/// 贪心 NMS: 稳定降序后保留高分框, 删除与已保留框 IoU 超过阈值的框
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].bounding_box.iou(&xs[index].bounding_box);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 完整过滤链, 返回按置信度降序的检测结果
pub fn postprocess(
    raw: &RawDetections,
    letterbox: &Letterbox,
    labels: &[String],
    options: &DetectorOptions,
    min_confidence: f32,
    max_results: i32,
) -> Vec<Detection> {
    let count = raw.count.min(raw.len());

    let mut detections: Vec<Detection> = (0..count)
        .filter(|&i| raw.scores[i] >= min_confidence)
        .map(|i| {
            let [y_min, x_min, y_max, x_max] = raw.boxes[i];
            let (x0, y0) = letterbox.to_original(x_min, y_min);
            let (x1, y1) = letterbox.to_original(x_max, y_max);
            Detection::new(
                Rect::new(x0, y0, x1, y1),
                raw.scores[i],
                Category::resolve(raw.classes[i], labels),
            )
        })
        .collect();

    // sort_by 是稳定排序: 同分时保持输入顺序
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    if let Some(deny) = &options.label_deny_list {
        detections.retain(|d| !deny.contains(&d.category.label));
    }
    if let Some(allow) = &options.label_allow_list {
        detections.retain(|d| allow.contains(&d.category.label));
    }

    if let Some(iou) = options.nms_iou_threshold {
        non_max_suppression(&mut detections, iou);
    }

    if max_results > 0 {
        detections.truncate(max_results as usize);
    }
    detections
}
