// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 视频帧 (采集线程 → 跟踪线程)
//! Dense row-major frame, shape [height, width, channels(3)]
use image::RgbImage;
use ndarray::Array3;

use crate::error::{Result, TrackingError};

/// 像素数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    F32,
}

#[derive(Debug, Clone)]
pub enum Frame {
    /// 8位 RGB (视频帧)
    U8(Array3<u8>),
    /// 浮点 RGB, 对称区间 [-1, 1]
    F32(Array3<f32>),
}

impl Frame {
    pub fn from_rgb_image(img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        let data = Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
            img.get_pixel(x as u32, y as u32).0[c]
        });
        Frame::U8(data)
    }

    /// 解码器输出的 RGBA → RGB (丢弃 Alpha 通道)
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(TrackingError::value(format!(
                "RGBA buffer has {} bytes, expected {} for {}x{}",
                rgba.len(),
                expected,
                width,
                height
            )));
        }
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        for chunk in rgba.chunks_exact(4) {
            rgb.extend_from_slice(&chunk[..3]);
        }
        Array3::from_shape_vec((height as usize, width as usize, 3), rgb)
            .map(Frame::U8)
            .map_err(|e| TrackingError::value(e.to_string()))
    }

    /// (height, width, channels)
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Frame::U8(a) => a.dim(),
            Frame::F32(a) => a.dim(),
        }
    }

    pub fn width(&self) -> usize {
        self.dim().1
    }

    pub fn height(&self) -> usize {
        self.dim().0
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            Frame::U8(_) => PixelType::U8,
            Frame::F32(_) => PixelType::F32,
        }
    }

    /// 只接受非空的 3 通道帧
    pub fn validate(&self) -> Result<()> {
        let (h, w, c) = self.dim();
        if c != 3 {
            return Err(TrackingError::value(format!(
                "expected 3 channels, got {}",
                c
            )));
        }
        if h == 0 || w == 0 {
            return Err(TrackingError::value(format!("empty frame {}x{}", w, h)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_drops_alpha() {
        let rgba = vec![1, 2, 3, 255, 4, 5, 6, 255];
        let frame = Frame::from_rgba(2, 1, &rgba).unwrap();
        assert_eq!(frame.dim(), (1, 2, 3));
        match frame {
            Frame::U8(a) => assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]),
            Frame::F32(_) => panic!("expected u8 frame"),
        }
    }

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        assert!(matches!(
            Frame::from_rgba(2, 2, &[0; 5]),
            Err(TrackingError::Value(_))
        ));
    }

    #[test]
    fn test_from_rgb_image_layout() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, image::Rgb([10, 20, 30]));
        let frame = Frame::from_rgb_image(&img);
        assert_eq!(frame.dim(), (2, 3, 3));
        if let Frame::U8(a) = frame {
            assert_eq!(a[[1, 2, 0]], 10);
            assert_eq!(a[[1, 2, 2]], 30);
        }
    }

    #[test]
    fn test_validate_channels() {
        let frame = Frame::U8(Array3::zeros((4, 4, 4)));
        assert!(frame.validate().is_err());
        assert!(Frame::F32(Array3::zeros((4, 4, 3))).validate().is_ok());
    }
}
