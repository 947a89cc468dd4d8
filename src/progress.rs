// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 模型加载进度
//!
//! 回调保证: 进度单调不减, 取值 [0, 1], 且以恰好一次 1.0 结束。

pub struct Progress<'a> {
    callback: &'a mut dyn FnMut(f32),
    last: f32,
    finished: bool,
}

impl<'a> Progress<'a> {
    pub fn new(callback: &'a mut dyn FnMut(f32)) -> Self {
        Self {
            callback,
            last: 0.0,
            finished: false,
        }
    }

    /// 上报进度; 回退的值被抬到上一次的值, 1.0 留给 finish()
    pub fn report(&mut self, value: f32) {
        if self.finished || value.is_nan() {
            return;
        }
        let value = value.clamp(self.last, 1.0);
        if value >= 1.0 {
            return;
        }
        self.last = value;
        (self.callback)(value);
    }

    /// 把 [0, 1] 的子进度映射到 [lo, hi]
    pub fn report_scaled(&mut self, value: f32, lo: f32, hi: f32) {
        self.report(lo + value.clamp(0.0, 1.0) * (hi - lo));
    }

    pub fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.last = 1.0;
            (self.callback)(1.0);
        }
    }

    pub fn last(&self) -> f32 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_monotonic_single_finish() {
        let mut seen = Vec::new();
        let mut cb = |p: f32| seen.push(p);
        {
            let mut progress = Progress::new(&mut cb);
            progress.report(0.2);
            progress.report(0.1); // 回退
            progress.report(1.0); // 提前到达 1.0 被忽略
            progress.report_scaled(0.5, 0.5, 0.9);
            progress.finish();
            progress.finish();
            progress.report(0.3);
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(&seen[..2], &[0.2, 0.2]);
        assert!((seen[2] - 0.7).abs() < 1e-6);
        assert_eq!(seen[3], 1.0);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.iter().filter(|p| **p == 1.0).count(), 1);
    }
}
