// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 预处理: 等比缩放 + 灰色填充 (letterbox) → dtype 转换 → 张量布局
//!
//! 缩放后的图像贴在左上角, 右侧/下方用 128 灰填充, 所以偏移量恒为 0,
//! 只需记录两个方向上的缩放比例即可把框映射回原图。

use fast_image_resize as fr;
use image::{ImageBuffer, Rgb};
use ndarray::{Array3, Axis};

use super::engine::{InputDtype, InputSpec, InputTensor, TensorLayout};
use super::frame::Frame;
use crate::error::{Result, TrackingError};

/// 填充灰度值 (u8 空间)
pub const PAD_VALUE: u8 = 128;

/// letterbox 空间 ↔ 原图归一化空间的映射
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub offset_x: f32,
    pub offset_y: f32,
    /// 原图内容在 letterbox 画面中占的宽度比例
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Default for Letterbox {
    fn default() -> Self {
        Self::identity()
    }
}

impl Letterbox {
    pub fn identity() -> Self {
        Self {
            offset_x: 0.,
            offset_y: 0.,
            scale_x: 1.,
            scale_y: 1.,
        }
    }

    /// 计算 src → dst 的等比缩放尺寸与映射参数
    /// 返回 (letterbox, resized_w, resized_h)
    pub fn fit(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (Self, u32, u32) {
        let scale = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
        let w_new = ((src_w as f32 * scale).floor() as u32).clamp(1, dst_w);
        let h_new = ((src_h as f32 * scale).floor() as u32).clamp(1, dst_h);
        let letterbox = Self {
            offset_x: 0.,
            offset_y: 0.,
            scale_x: w_new as f32 / dst_w as f32,
            scale_y: h_new as f32 / dst_h as f32,
        };
        (letterbox, w_new, h_new)
    }

    /// 原图归一化坐标 → letterbox 坐标
    pub fn to_letterboxed(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale_x + self.offset_x,
            y * self.scale_y + self.offset_y,
        )
    }

    /// letterbox 坐标 → 原图归一化坐标: coord' = (coord - offset) / scale
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.offset_x) / self.scale_x,
            (y - self.offset_y) / self.scale_y,
        )
    }
}

/// u8 → f32: 映射到对称区间 [-1, 1]
#[inline]
pub fn u8_to_f32(x: u8) -> f32 {
    (x as f32 - 127.5) / 127.5
}

/// f32 → u8: u8_to_f32 的逆映射 (饱和截断)
#[inline]
pub fn f32_to_u8(x: f32) -> u8 {
    (x * 127.5 + 127.5).round().clamp(0., 255.) as u8
}

fn resize_u8(src: &Array3<u8>, w_new: u32, h_new: u32) -> Result<Array3<u8>> {
    let (h, w, _) = src.dim();
    let buffer = src.as_standard_layout().into_owned().into_raw_vec_and_offset().0;
    let src_image = fr::images::Image::from_vec_u8(w as u32, h as u32, buffer, fr::PixelType::U8x3)
        .map_err(|e| TrackingError::value(format!("resize source: {:?}", e)))?;
    let mut dst_image = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .map_err(|e| TrackingError::value(format!("resize: {:?}", e)))?;

    Array3::from_shape_vec((h_new as usize, w_new as usize, 3), dst_image.into_vec())
        .map_err(|e| TrackingError::value(e.to_string()))
}

fn resize_f32(src: &Array3<f32>, w_new: u32, h_new: u32) -> Result<Array3<f32>> {
    let (h, w, _) = src.dim();
    let buffer = src.as_standard_layout().into_owned().into_raw_vec_and_offset().0;
    let img: ImageBuffer<Rgb<f32>, Vec<f32>> = ImageBuffer::from_raw(w as u32, h as u32, buffer)
        .ok_or_else(|| TrackingError::value("f32 frame buffer size mismatch"))?;
    let resized = image::imageops::resize(
        &img,
        w_new,
        h_new,
        image::imageops::FilterType::Triangle,
    );
    Array3::from_shape_vec((h_new as usize, w_new as usize, 3), resized.into_raw())
        .map_err(|e| TrackingError::value(e.to_string()))
}

/// 等比缩放到 (dst_w, dst_h) 内, 左上角对齐, 其余填充灰色
pub fn resize_and_pad(frame: &Frame, dst_w: u32, dst_h: u32) -> Result<(Frame, Letterbox)> {
    frame.validate()?;
    let (src_w, src_h) = (frame.width() as u32, frame.height() as u32);
    if src_w == dst_w && src_h == dst_h {
        return Ok((frame.clone(), Letterbox::identity()));
    }

    let (letterbox, w_new, h_new) = Letterbox::fit(src_w, src_h, dst_w, dst_h);
    let (hn, wn) = (h_new as usize, w_new as usize);
    let padded = match frame {
        Frame::U8(src) => {
            let resized = resize_u8(src, w_new, h_new)?;
            let mut padded = Array3::from_elem((dst_h as usize, dst_w as usize, 3), PAD_VALUE);
            padded
                .slice_mut(ndarray::s![..hn, ..wn, ..])
                .assign(&resized);
            Frame::U8(padded)
        }
        Frame::F32(src) => {
            let resized = resize_f32(src, w_new, h_new)?;
            let mut padded =
                Array3::from_elem((dst_h as usize, dst_w as usize, 3), u8_to_f32(PAD_VALUE));
            padded
                .slice_mut(ndarray::s![..hn, ..wn, ..])
                .assign(&resized);
            Frame::F32(padded)
        }
    };
    Ok((padded, letterbox))
}

/// 把帧转换为模型期望的数值域
pub fn convert_dtype(frame: Frame, dtype: &InputDtype) -> Result<Frame> {
    match (frame, dtype) {
        (f @ Frame::U8(_), InputDtype::U8) | (f @ Frame::F32(_), InputDtype::F32) => Ok(f),
        (Frame::U8(a), InputDtype::F32) => Ok(Frame::F32(a.mapv(u8_to_f32))),
        (Frame::F32(a), InputDtype::U8) => Ok(Frame::U8(a.mapv(f32_to_u8))),
        (f, InputDtype::Other(name)) => Err(TrackingError::value(format!(
            "cannot feed {:?} pixels to a model expecting {}",
            f.pixel_type(),
            name
        ))),
    }
}

/// Frame → 模型输入张量 (letterbox + dtype + batch 维 + 布局)
pub fn prepare(frame: &Frame, spec: &InputSpec) -> Result<(InputTensor, Letterbox)> {
    if let InputDtype::Other(name) = &spec.dtype {
        return Err(TrackingError::value(format!(
            "unsupported model input dtype {}",
            name
        )));
    }
    let (padded, letterbox) = resize_and_pad(frame, spec.width, spec.height)?;
    let converted = convert_dtype(padded, &spec.dtype)?;

    let tensor = match converted {
        Frame::U8(a) => {
            let xs = a.insert_axis(Axis(0));
            InputTensor::U8(match spec.layout {
                TensorLayout::Nhwc => xs.into_dyn(),
                TensorLayout::Nchw => xs
                    .permuted_axes([0, 3, 1, 2])
                    .as_standard_layout()
                    .into_owned()
                    .into_dyn(),
            })
        }
        Frame::F32(a) => {
            let xs = a.insert_axis(Axis(0));
            InputTensor::F32(match spec.layout {
                TensorLayout::Nhwc => xs.into_dyn(),
                TensorLayout::Nchw => xs
                    .permuted_axes([0, 3, 1, 2])
                    .as_standard_layout()
                    .into_owned()
                    .into_dyn(),
            })
        }
    };
    Ok((tensor, letterbox))
}
