// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 类别标签来源
//!
//! 1. 模型容器 (zip) 的第一个条目: 每行一个标签
//! 2. 模型元数据 `names`: `{0: 'person', 1: 'bicycle', ...}`

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, warn};
use regex::Regex;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{Result, TrackingError};

/// 元数据中允许的最大类别数, 超出的索引视为损坏
const MAX_CLASSES: usize = 10_000;

/// 从模型容器读取标签列表
///
/// - 不是 zip: 容忍, 返回 `Ok(None)`
/// - 是 zip 但没有条目: 模型无效, 返回 `ModelLoad`
pub fn read_label_list(path: &Path) -> Result<Option<Vec<String>>> {
    let file = File::open(path)
        .map_err(|e| TrackingError::model_load(format!("{}: {}", path.display(), e)))?;
    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(ZipError::InvalidArchive(_)) | Err(ZipError::UnsupportedArchive(_)) => {
            warn!(
                "⚠️ 模型 {} 不含标签元数据, 使用模型内置或提供的标签",
                path.display()
            );
            return Ok(None);
        }
        Err(e) => {
            return Err(TrackingError::model_load(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    };

    if archive.is_empty() {
        return Err(TrackingError::model_load(format!(
            "invalid model container {}: no label file found",
            path.display()
        )));
    }

    let mut entry = archive
        .by_index(0)
        .map_err(|e| TrackingError::model_load(e.to_string()))?;
    debug!("标签文件: {}", entry.name());
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| TrackingError::model_load(format!("label file is not UTF-8: {}", e)))?;

    Ok(Some(text.lines().map(|l| l.trim().to_string()).collect()))
}

/// 解析 `names` 元数据, 按类别索引排列 (缺失的索引留空串)
pub fn parse_names_metadata(names: &str) -> Vec<String> {
    let re = match Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#) {
        Ok(re) => re,
        Err(_) => return vec![],
    };
    let pairs: Vec<(usize, String)> = re
        .captures_iter(names)
        .filter_map(|cap| {
            let id = cap.get(1)?.as_str().parse::<usize>().ok()?;
            Some((id, cap.get(2)?.as_str().to_string()))
        })
        .collect();

    let mut labels = Vec::new();
    for (id, name) in pairs {
        if id >= MAX_CLASSES {
            warn!("⚠️ names 元数据中的类别索引 {} 超出上限 {}, 已忽略", id, MAX_CLASSES);
            continue;
        }
        if labels.len() <= id {
            labels.resize(id + 1, String::new());
        }
        labels[id] = name;
    }
    labels
}
