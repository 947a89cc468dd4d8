// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 图片序列检测 + 跟踪
///
/// 每张图片作为一帧送入跟踪流水线, 等待结果后再送下一帧:
/// 1. 主线程:   读图 → feed()
/// 2. 跟踪线程: 检测 → 打分选择跟随目标 → 事件
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use copilot_vision::detection::registry::DETECTORS;
use copilot_vision::tracking::TRACKERS;
use copilot_vision::{Frame, PipelineConfig, PipelineEvent, PipelineRunner};

#[derive(Parser, Debug)]
#[command(author, version, about = "目标检测 + 跟踪 (图片序列)", long_about = None)]
struct Args {
    /// 配置文件 (JSON, 不存在时创建默认配置)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 检测器注册名
    #[arg(short, long)]
    detector: Option<String>,

    /// 跟踪器注册名 (Disabled / DetectorBasedTrackerAny)
    #[arg(short, long)]
    tracker: Option<String>,

    /// 模型路径或 URL (覆盖检测器默认模型)
    #[arg(short, long)]
    model: Option<String>,

    /// 最低置信度
    #[arg(long)]
    conf: Option<f32>,

    /// 最大结果数 (<= 0 不限)
    #[arg(long, allow_hyphen_values = true)]
    max_results: Option<i32>,

    /// 只跟踪该类别
    #[arg(long)]
    category: Option<u32>,

    /// 使用 CUDA 加速
    #[arg(long, default_value_t = false)]
    cuda: bool,

    /// 每帧等待结果的超时 (秒)
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// 列出可用的检测器和跟踪器
    #[arg(long, default_value_t = false)]
    list: bool,

    /// 输入图片
    images: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list {
        println!("📦 检测器:");
        for d in DETECTORS {
            println!("  {:<20} {:?} ({})", d.name, d.kind, d.model);
        }
        println!("🎯 跟踪器:");
        for t in TRACKERS {
            println!("  {}", t.name);
        }
        return Ok(());
    }
    if args.images.is_empty() {
        bail!("no input images, see --help");
    }

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(d) = args.detector {
        config.detector = d;
    }
    if let Some(t) = args.tracker {
        config.tracker = t;
    }
    if args.model.is_some() {
        config.model = args.model;
    }
    if let Some(c) = args.conf {
        config.confidence = c;
    }
    if let Some(m) = args.max_results {
        config.max_results = m;
    }
    if args.category.is_some() {
        config.scoring.category_filter = args.category;
    }
    if args.cuda {
        config.detector_options.enable_accelerator = true;
    }
    config.print_summary();

    let mut runner = PipelineRunner::new(config.build_tracker(), config.params())
        .with_stats_interval(config.stats_interval);
    let events = runner.subscribe();
    runner.start().context("failed to start tracking pipeline")?;

    // 等待模型加载
    let timeout = Duration::from_secs(args.timeout);
    loop {
        match events.recv_timeout(timeout).context("model load timed out")? {
            PipelineEvent::LoadProgress(p) if p >= 1.0 => break,
            PipelineEvent::LoadProgress(p) => info!("⏳ 加载进度 {:.0}%", p * 100.0),
            PipelineEvent::LoadFailed(e) => bail!("model load failed: {}", e),
            PipelineEvent::Stopped => bail!("tracking worker stopped during load"),
            PipelineEvent::Track(_) | PipelineEvent::TrackFailed { .. } => {}
        }
    }

    for path in &args.images {
        let img = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!("⚠️ 无法读取 {}: {}", path.display(), e);
                continue;
            }
        };
        let frame_id = runner.feed(Frame::from_rgb_image(&img));

        let result = loop {
            match events.recv_timeout(timeout) {
                Ok(PipelineEvent::Track(r)) if r.frame_id == frame_id => break Some(r),
                Ok(PipelineEvent::TrackFailed { frame_id: id, error }) if id == frame_id => {
                    warn!("⚠️ {} 处理失败: {}", path.display(), error);
                    break None;
                }
                Ok(PipelineEvent::Stopped) => bail!("tracking worker stopped unexpectedly"),
                Ok(_) => continue,
                Err(_) => {
                    warn!("⚠️ {} 在 {:?} 内没有结果", path.display(), timeout);
                    break None;
                }
            }
        };
        let Some(result) = result else {
            continue;
        };

        println!(
            "🖼️  {} ({}x{}) | {} 个目标 | {:.1?}",
            path.display(),
            img.width(),
            img.height(),
            result.detections.len(),
            result.elapsed
        );
        for d in &result.detections {
            let b = &d.bounding_box;
            println!(
                "   {:>3} {:<16} {:.2}  [{:.3}, {:.3}, {:.3}, {:.3}]",
                d.category.id, d.category.label, d.confidence, b.x_min, b.y_min, b.x_max, b.y_max
            );
        }
        match &result.tracked {
            Some(t) => println!(
                "   🎯 跟随: {} ({:.2}) 中心 ({:.3}, {:.3})",
                t.category.label,
                t.confidence,
                t.bounding_box.center().0,
                t.bounding_box.center().1
            ),
            None => println!("   🎯 跟随: 无"),
        }
    }

    runner.stop().context("failed to stop tracking pipeline")?;
    Ok(())
}
