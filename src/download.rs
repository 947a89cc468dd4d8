// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 模型权重下载与缓存
//!
//! 缓存文件名 = URL 文件名 + `_` + 清洗后的 ETag, 已存在则直接复用。
//! 下载先写入 `.part` 临时文件, 完成后再重命名, 避免半截文件被当成缓存。

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};

use crate::error::{Result, TrackingError};

const BLOCK_SIZE: usize = 64 * 1024;

/// 是否为需要下载的远程地址
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// 默认缓存目录: <系统缓存目录>/copilot-vision/models
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("copilot-vision")
        .join("models")
}

/// URL 最后一段 (去掉查询串和片段)
fn url_basename(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if name.is_empty() || name.contains(':') {
        "model"
    } else {
        name
    }
}

/// 缓存文件名: basename[_etag]
pub fn cache_file_name(url: &str, etag: Option<&str>) -> String {
    let base = url_basename(url);
    match etag {
        Some(tag) => {
            let clean: String = tag
                .chars()
                .filter(|c| *c != '"')
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            if clean.is_empty() {
                base.to_string()
            } else {
                format!("{}_{}", base, clean)
            }
        }
        None => base.to_string(),
    }
}

/// 把响应体写入 `.part` 文件, 返回写入的字节数
fn write_part(
    part: &Path,
    reader: &mut dyn Read,
    content_length: Option<u64>,
    progress: &mut dyn FnMut(f32),
) -> Result<u64> {
    let mut file = File::create(part)?;
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut received: u64 = 0;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        received += n as u64;
        match content_length {
            Some(total) if total > 0 => progress((received as f32 / total as f32).min(1.0)),
            _ => progress(0.5),
        }
    }
    file.flush()?;
    Ok(received)
}

/// 下载 (或复用缓存) 并返回本地路径; progress 取值 [0, 1]
pub fn download(url: &str, cache_dir: &Path, progress: &mut dyn FnMut(f32)) -> Result<PathBuf> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| TrackingError::model_load(format!("download {}: {}", url, e)))?;

    let etag = response.header("ETag").map(str::to_string);
    let content_length = response
        .header("Content-Length")
        .and_then(|v| v.trim().parse::<u64>().ok());

    fs::create_dir_all(cache_dir)?;
    let file_name = cache_file_name(url, etag.as_deref());
    let path = cache_dir.join(&file_name);
    if path.exists() {
        info!("📦 使用缓存模型: {}", path.display());
        return Ok(path);
    }

    info!("⬇️ 下载模型: {} → {}", url, path.display());
    let t_start = Instant::now();
    let part = cache_dir.join(format!("{}.part", file_name));
    let mut reader = response.into_reader();
    let received = match write_part(&part, &mut reader, content_length, progress) {
        Ok(n) => n,
        Err(e) => {
            if part.exists() {
                if let Err(rm) = fs::remove_file(&part) {
                    warn!("⚠️ 无法删除临时文件 {}: {}", part.display(), rm);
                }
            }
            return Err(match e {
                TrackingError::Io(io) => {
                    TrackingError::model_load(format!("download {}: {}", url, io))
                }
                other => other,
            });
        }
    };
    fs::rename(&part, &path)?;

    info!(
        "✅ 下载完成: {} ({:.1} MB, {:.1?})",
        path.display(),
        received as f64 / 1024.0 / 1024.0,
        t_start.elapsed()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_file_name() {
        assert_eq!(
            cache_file_name("https://host/a/b/model.tflite?lite-format=tflite", None),
            "model.tflite"
        );
        assert_eq!(
            cache_file_name("https://host/m/yolov5s.onnx", Some("\"abc/12=3\"")),
            "yolov5s.onnx_abc_12_3"
        );
        assert_eq!(cache_file_name("https://host/", Some("W/\"x\"")), "host_W_x");
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/m.onnx"));
        assert!(is_remote("http://example.com/m.onnx"));
        assert!(!is_remote("models/m.onnx"));
    }

    #[test]
    fn test_unreachable_url_is_model_load_error() {
        let dir = std::env::temp_dir().join("copilot-vision-download-test");
        let mut seen = vec![];
        let result = download("http://127.0.0.1:9/model.onnx", &dir, &mut |p| seen.push(p));
        assert!(matches!(result, Err(TrackingError::ModelLoad(_))));
        assert!(seen.is_empty());
    }

    /// 本地 HTTP 服务: 依次对每个连接返回 responses 中的一项, 写完后关闭连接
    fn serve(responses: Vec<Vec<u8>>) -> (String, std::thread::JoinHandle<()>) {
        use std::io::{BufRead, BufReader};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            for response in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                // 读完请求头
                while reader.read_line(&mut line).unwrap() > 0 {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                let mut stream = reader.into_inner();
                // 复用缓存时客户端不读响应体, 写失败可以忽略
                stream.write_all(&response).ok();
                stream.flush().ok();
            }
        });
        (format!("http://{}", addr), handle)
    }

    fn response(headers: &str, body: &[u8]) -> Vec<u8> {
        let mut out =
            format!("HTTP/1.1 200 OK\r\nConnection: close\r\n{}\r\n", headers).into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "copilot-vision-{}-{}",
            std::process::id(),
            name
        ));
        fs::remove_dir_all(&dir).ok();
        dir
    }

    #[test]
    fn test_download_then_reuse_cache() {
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let headers = format!("Content-Length: {}\r\nETag: \"abc123\"\r\n", body.len());
        let (base, server) = serve(vec![response(&headers, &body), response(&headers, &body)]);
        let dir = temp_dir("download-cache");
        let url = format!("{}/models/yolov5s.onnx", base);

        let mut seen = vec![];
        let path = download(&url, &dir, &mut |p| seen.push(p)).unwrap();
        assert_eq!(path, dir.join("yolov5s.onnx_abc123"));
        assert_eq!(fs::read(&path).unwrap(), body);
        assert!(!dir.join("yolov5s.onnx_abc123.part").exists());
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 1.0);

        // 第二次: 同一 ETag 直接复用, 不重写文件
        fs::write(&path, b"cached").unwrap();
        let mut seen = vec![];
        let again = download(&url, &dir, &mut |p| seen.push(p)).unwrap();
        assert_eq!(again, path);
        assert_eq!(fs::read(&path).unwrap(), b"cached");
        assert!(seen.is_empty());

        server.join().unwrap();
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_download_without_length_reports_half() {
        let body = vec![7u8; 1000];
        let (base, server) = serve(vec![response("", &body)]);
        let dir = temp_dir("download-nolength");

        let mut seen = vec![];
        let path = download(&format!("{}/m.onnx", base), &dir, &mut |p| seen.push(p)).unwrap();
        assert_eq!(path, dir.join("m.onnx"));
        assert_eq!(fs::read(&path).unwrap(), body);
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|p| *p == 0.5));

        server.join().unwrap();
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_truncated_download_removes_part_file() {
        // 声明 1000 字节, 只发送 10 字节后断开
        let (base, server) = serve(vec![response("Content-Length: 1000\r\n", &[1u8; 10])]);
        let dir = temp_dir("download-truncated");

        let result = download(&format!("{}/m.onnx", base), &dir, &mut |_| {});
        assert!(matches!(result, Err(TrackingError::ModelLoad(_))));
        assert!(!dir.join("m.onnx.part").exists());
        assert!(!dir.join("m.onnx").exists());

        server.join().unwrap();
        fs::remove_dir_all(&dir).ok();
    }
}
