// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测结果数据结构定义
//! Value types produced by the detectors
use serde::{Deserialize, Serialize};

/// 归一化矩形, 坐标相对于原图尺寸 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl Rect {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// 模型输出顺序 [y_min, x_min, y_max, x_max]
    pub fn from_yxyx(yxyx: [f32; 4]) -> Self {
        Self::new(yxyx[1], yxyx[0], yxyx[3], yxyx[2])
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.) * self.height().max(0.)
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) / 2.,
            (self.y_min + self.y_max) / 2.,
        )
    }

    pub fn intersection_area(&self, another: &Rect) -> f32 {
        let l = self.x_min.max(another.x_min);
        let r = self.x_max.min(another.x_max);
        let t = self.y_min.max(another.y_min);
        let b = self.y_max.min(another.y_max);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Rect) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    /// 交并比, 角点取 [x_min, y_min, x_max, y_max]
    pub fn iou(&self, another: &Rect) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}

/// 类别: 模型类别索引 + 标签 (索引越界时为空字符串)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Category {
    pub id: u32,
    pub label: String,
}

impl Category {
    pub fn resolve(id: u32, labels: &[String]) -> Self {
        Self {
            id,
            label: labels.get(id as usize).cloned().unwrap_or_default(),
        }
    }
}

/// 单个检测目标, 每次推理新建, 帧间没有身份
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: Rect,
    pub confidence: f32,
    pub category: Category,
}

impl Detection {
    pub fn new(bounding_box: Rect, confidence: f32, category: Category) -> Self {
        Self {
            bounding_box,
            confidence,
            category,
        }
    }
}
