// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 推理引擎 (Inference Engine)
//!
//! 检测器只依赖 `InferenceEngine` trait:
//! ```text
//! InputTensor → run → 原始输出 Vec<ArrayD<f32>> (按模型输出索引排序)
//! ```
//! 生产实现为 ONNX Runtime (`OrtEngine`)。

use std::path::Path;

use log::{info, warn};
use ndarray::ArrayD;
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionOutputs};
use ort::tensor::TensorElementType;
use ort::value::TensorRef;

use super::detector::DetectorOptions;
use crate::error::{Result, TrackingError};

/// 模型期望的输入数值类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputDtype {
    U8,
    F32,
    /// 其他类型 (int8/f16...), 预处理时报 Value 错误
    Other(String),
}

/// 输入张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// [1, H, W, 3] (TFLite 导出常见)
    Nhwc,
    /// [1, 3, H, W]
    Nchw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub dtype: InputDtype,
    pub layout: TensorLayout,
}

impl InputSpec {
    /// 从模型输入 shape 推断尺寸与布局 (batch 维必须存在)
    pub fn from_shape(shape: &[i64], dtype: InputDtype) -> Result<Self> {
        if shape.len() != 4 {
            return Err(TrackingError::model_load(format!(
                "expected a 4-D image input, got shape {:?}",
                shape
            )));
        }
        let (layout, h, w) = if shape[3] == 3 {
            (TensorLayout::Nhwc, shape[1], shape[2])
        } else if shape[1] == 3 {
            (TensorLayout::Nchw, shape[2], shape[3])
        } else {
            return Err(TrackingError::model_load(format!(
                "cannot find the RGB channel axis in input shape {:?}",
                shape
            )));
        };
        if h <= 0 || w <= 0 {
            return Err(TrackingError::model_load(format!(
                "dynamic input size is not supported: {:?}",
                shape
            )));
        }
        Ok(Self {
            width: w as u32,
            height: h as u32,
            dtype,
            layout,
        })
    }
}

/// 预处理后的输入 (已带 batch 维)
#[derive(Debug, Clone)]
pub enum InputTensor {
    U8(ArrayD<u8>),
    F32(ArrayD<f32>),
}

impl InputTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::U8(a) => a.shape(),
            InputTensor::F32(a) => a.shape(),
        }
    }
}

/// 统一的推理接口
pub trait InferenceEngine: Send {
    fn input_spec(&self) -> &InputSpec;

    /// 单次前向传播
    fn run(&mut self, input: InputTensor) -> Result<Vec<ArrayD<f32>>>;

    /// 模型内嵌的类别名 (如有)
    fn embedded_labels(&self) -> Option<Vec<String>> {
        None
    }
}

/// ONNX Runtime 后端
pub struct OrtEngine {
    session: Session,
    spec: InputSpec,
}

impl OrtEngine {
    pub fn build(model: &Path, options: &DetectorOptions) -> Result<Self> {
        let load_err = |e: ort::Error| TrackingError::model_load(e.to_string());

        let mut builder = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| TrackingError::model_load(e.to_string()))?
            .with_intra_threads(options.thread_count.max(1))
            .map_err(|e| TrackingError::model_load(e.to_string()))?;

        if options.enable_accelerator {
            let cuda = CUDAExecutionProvider::default();
            if !cuda.is_available().unwrap_or(false) {
                return Err(TrackingError::UnsupportedPlatform(format!(
                    "CUDA execution provider is not available on {}",
                    std::env::consts::OS
                )));
            }
            builder = builder
                .with_execution_providers([cuda.build().error_on_failure()])
                .map_err(|e| TrackingError::model_load(e.to_string()))?;
            info!("⚡ 硬件加速: CUDA");
        }

        let session = builder
            .commit_from_file(model)
            .map_err(|e| TrackingError::model_load(format!("{}: {}", model.display(), e)))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| TrackingError::model_load("model has no inputs"))?;
        let shape: Vec<i64> = input
            .input_type
            .tensor_shape()
            .map(|s| s.iter().copied().collect())
            .ok_or_else(|| TrackingError::model_load("model input is not a tensor"))?;
        let dtype = match input.input_type.tensor_type() {
            Some(TensorElementType::Float32) => InputDtype::F32,
            Some(TensorElementType::Uint8) => InputDtype::U8,
            other => InputDtype::Other(format!("{:?}", other)),
        };
        let spec = InputSpec::from_shape(&shape, dtype)?;
        info!(
            "✅ 模型加载成功: {} | 输入 {}x{} {:?} {:?} | 输出 {}",
            model.display(),
            spec.width,
            spec.height,
            spec.dtype,
            spec.layout,
            session.outputs.len()
        );

        Ok(Self { session, spec })
    }

    fn extract(outputs: &SessionOutputs) -> Result<Vec<ArrayD<f32>>> {
        let mut ys = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let value = &outputs[i];
            let y = if let Ok(view) = value.try_extract_array::<f32>() {
                view.into_owned()
            } else if let Ok(view) = value.try_extract_array::<i64>() {
                view.mapv(|v| v as f32)
            } else if let Ok(view) = value.try_extract_array::<i32>() {
                view.mapv(|v| v as f32)
            } else {
                return Err(TrackingError::inference(format!(
                    "output #{} has an unsupported element type",
                    i
                )));
            };
            ys.push(y);
        }
        Ok(ys)
    }
}

impl InferenceEngine for OrtEngine {
    fn input_spec(&self) -> &InputSpec {
        &self.spec
    }

    fn run(&mut self, input: InputTensor) -> Result<Vec<ArrayD<f32>>> {
        let infer_err = |e: ort::Error| TrackingError::inference(e.to_string());
        match input {
            InputTensor::F32(xs) => {
                let tensor = TensorRef::from_array_view(xs.view()).map_err(infer_err)?;
                let outputs = self
                    .session
                    .run(ort::inputs![tensor])
                    .map_err(|e| TrackingError::inference(e.to_string()))?;
                Self::extract(&outputs)
            }
            InputTensor::U8(xs) => {
                let tensor = TensorRef::from_array_view(xs.view()).map_err(infer_err)?;
                let outputs = self
                    .session
                    .run(ort::inputs![tensor])
                    .map_err(|e| TrackingError::inference(e.to_string()))?;
                Self::extract(&outputs)
            }
        }
    }

    fn embedded_labels(&self) -> Option<Vec<String>> {
        let metadata = match self.session.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("⚠️ 读取模型元数据失败: {}", e);
                return None;
            }
        };
        match metadata.custom("names") {
            Ok(Some(names)) => {
                let labels = super::labels::parse_names_metadata(&names);
                (!labels.is_empty()).then_some(labels)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 测试用的脚本化引擎: 返回固定输出, 可挂钩观察输入
    use super::*;
    use ndarray::{Array, IxDyn};

    pub(crate) type Hook = Box<dyn FnMut(&InputTensor) + Send>;

    pub(crate) struct FixedEngine {
        spec: InputSpec,
        outputs: Vec<ArrayD<f32>>,
        hook: Option<Hook>,
    }

    impl FixedEngine {
        pub(crate) fn new(spec: InputSpec, outputs: Vec<ArrayD<f32>>) -> Self {
            Self {
                spec,
                outputs,
                hook: None,
            }
        }

        pub(crate) fn with_hook(mut self, hook: Hook) -> Self {
            self.hook = Some(hook);
            self
        }
    }

    impl InferenceEngine for FixedEngine {
        fn input_spec(&self) -> &InputSpec {
            &self.spec
        }

        fn run(&mut self, input: InputTensor) -> Result<Vec<ArrayD<f32>>> {
            if let Some(hook) = self.hook.as_mut() {
                hook(&input);
            }
            Ok(self.outputs.clone())
        }
    }

    pub(crate) fn u8_spec(width: u32, height: u32) -> InputSpec {
        InputSpec {
            width,
            height,
            dtype: InputDtype::U8,
            layout: TensorLayout::Nhwc,
        }
    }

    /// SSD 风格的四个输出: boxes(yxyx) / classes / scores / count, 末尾补 padding 行
    pub(crate) fn ssd_outputs(dets: &[([f32; 4], u32, f32)], padding: usize) -> Vec<ArrayD<f32>> {
        let n = dets.len() + padding;
        let mut boxes = Array::zeros(IxDyn(&[1, n, 4]));
        let mut classes = Array::zeros(IxDyn(&[1, n]));
        let mut scores = Array::zeros(IxDyn(&[1, n]));
        for (i, (yxyx, class, score)) in dets.iter().enumerate() {
            for (k, v) in yxyx.iter().enumerate() {
                boxes[[0, i, k]] = *v;
            }
            classes[[0, i]] = *class as f32;
            scores[[0, i]] = *score;
        }
        // padding 行给高分, 验证 count 截断
        for i in dets.len()..n {
            scores[[0, i]] = 0.99;
        }
        let count = Array::from_elem(IxDyn(&[1]), dets.len() as f32);
        vec![boxes, classes, scores, count]
    }

    #[test]
    fn test_input_spec_layouts() {
        let nhwc = InputSpec::from_shape(&[1, 320, 256, 3], InputDtype::U8).unwrap();
        assert_eq!((nhwc.width, nhwc.height, nhwc.layout), (256, 320, TensorLayout::Nhwc));

        let nchw = InputSpec::from_shape(&[1, 3, 640, 480], InputDtype::F32).unwrap();
        assert_eq!((nchw.width, nchw.height, nchw.layout), (480, 640, TensorLayout::Nchw));

        assert!(InputSpec::from_shape(&[1, 3, -1, -1], InputDtype::F32).is_err());
        assert!(InputSpec::from_shape(&[1, 8400, 84], InputDtype::F32).is_err());
    }
}
