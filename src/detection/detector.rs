// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器 (Detector)
//! 职责: 加载模型 → 预处理 → 推理 → 后处理, 输出按置信度降序的检测结果
//!
//! 生命周期: Unloaded → Loading → Loaded → Unloaded

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::engine::{InferenceEngine, OrtEngine};
use super::frame::Frame;
use super::labels::read_label_list;
use super::postprocess::{postprocess, DetectorKind};
use super::preprocess::prepare;
use super::types::Detection;
use crate::download::{default_cache_dir, download, is_remote};
use crate::error::{Result, TrackingError};
use crate::progress::Progress;

/// 检测器配置, 构造后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    /// 请求硬件加速 (CUDA), 不可用时加载失败
    pub enable_accelerator: bool,
    pub label_allow_list: Option<HashSet<String>>,
    pub label_deny_list: Option<HashSet<String>>,
    pub thread_count: usize,
    /// None 表示不做 NMS
    pub nms_iou_threshold: Option<f32>,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            enable_accelerator: false,
            label_allow_list: None,
            label_deny_list: None,
            thread_count: cpus.min(4),
            nms_iou_threshold: Some(0.95),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Unloaded,
    Loading,
    Loaded,
}

pub struct Detector {
    name: String,
    kind: DetectorKind,
    /// 本地路径或 http(s) 地址
    source: String,
    options: DetectorOptions,
    /// 调用方提供的后备标签
    fallback_labels: Vec<String>,
    cache_dir: Option<PathBuf>,

    state: DetectorState,
    engine: Option<Box<dyn InferenceEngine>>,
    labels: Vec<String>,
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("state", &self.state)
            .field("labels", &self.labels.len())
            .finish()
    }
}

impl Detector {
    pub fn new(
        name: impl Into<String>,
        kind: DetectorKind,
        source: impl Into<String>,
        options: DetectorOptions,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            source: source.into(),
            options,
            fallback_labels: vec![],
            cache_dir: None,
            state: DetectorState::Unloaded,
            engine: None,
            labels: vec![],
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.fallback_labels = labels;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// 直接注入推理引擎 (跳过文件加载), 检测器立即进入 Loaded
    pub fn with_engine(mut self, engine: Box<dyn InferenceEngine>) -> Self {
        self.labels = engine
            .embedded_labels()
            .unwrap_or_else(|| self.fallback_labels.clone());
        self.engine = Some(engine);
        self.state = DetectorState::Loaded;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DetectorKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == DetectorState::Loaded
    }

    /// 加载模型; 进度单调不减, 成功时以恰好一次 1.0 结束, 失败时不会到达 1.0
    pub fn load(&mut self, callback: &mut dyn FnMut(f32)) -> Result<()> {
        let mut progress = Progress::new(callback);
        if self.is_loaded() {
            progress.finish();
            return Ok(());
        }
        let t_start = Instant::now();
        info!("🔍 加载检测器 {}: {}", self.name, self.source);
        self.state = DetectorState::Loading;

        match self.load_inner(&mut progress) {
            Ok(()) => {
                self.state = DetectorState::Loaded;
                progress.finish();
                info!(
                    "✅ 检测器 {} 就绪 ({} 个类别, {:.1?})",
                    self.name,
                    self.labels.len(),
                    t_start.elapsed()
                );
                Ok(())
            }
            Err(e) => {
                self.engine = None;
                self.state = DetectorState::Unloaded;
                Err(e)
            }
        }
    }

    fn load_inner(&mut self, progress: &mut Progress) -> Result<()> {
        progress.report(0.01);
        let path = if is_remote(&self.source) {
            let cache_dir = self.cache_dir.clone().unwrap_or_else(default_cache_dir);
            download(&self.source, &cache_dir, &mut |p| {
                progress.report_scaled(p, 0.01, 0.9)
            })?
        } else {
            PathBuf::from(&self.source)
        };
        if !path.is_file() {
            return Err(TrackingError::model_load(format!(
                "model file not found: {}",
                path.display()
            )));
        }
        progress.report(0.9);

        let container_labels = read_label_list(&path)?;
        let engine = OrtEngine::build(&path, &self.options)?;
        progress.report(0.95);

        self.labels = self.resolve_labels(container_labels, &engine, &path);
        self.engine = Some(Box::new(engine));
        Ok(())
    }

    fn resolve_labels(
        &self,
        container: Option<Vec<String>>,
        engine: &dyn InferenceEngine,
        path: &Path,
    ) -> Vec<String> {
        if let Some(labels) = container {
            return labels;
        }
        if let Some(labels) = engine.embedded_labels() {
            debug!("模型元数据标签: {}", labels.len());
            return labels;
        }
        if self.fallback_labels.is_empty() {
            warn!("⚠️ {} 没有可用的类别标签, 类别名将为空", path.display());
        }
        self.fallback_labels.clone()
    }

    /// 释放模型, 可重复调用
    pub fn unload(&mut self) {
        if self.engine.take().is_some() {
            info!("🧹 检测器 {} 已卸载", self.name);
        }
        self.state = DetectorState::Unloaded;
    }

    /// 单帧检测; max_results <= 0 表示不限数量
    pub fn detect(
        &mut self,
        frame: &Frame,
        min_confidence: f32,
        max_results: i32,
    ) -> Result<Vec<Detection>> {
        let engine = match (self.state, self.engine.as_mut()) {
            (DetectorState::Loaded, Some(engine)) => engine,
            _ => return Err(TrackingError::NotLoaded(self.name.clone())),
        };
        let spec = engine.input_spec().clone();
        let (xs, letterbox) = prepare(frame, &spec)?;
        let ys = engine.run(xs)?;
        let raw = self.kind.decode(&ys, &spec)?;
        Ok(postprocess(
            &raw,
            &letterbox,
            &self.labels,
            &self.options,
            min_confidence,
            max_results,
        ))
    }
}
