// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 手势识别 (Gesture Recognition)
//!
//! 离线处理图片序列:
//! 1. 读取线程: 按文件名顺序解码图片 (独立工作线程)
//! 2. 主线程:   关键点检测 → 序列分类 → 平滑 → 输出结果
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use gesture_rs::models::{GestureClassifierConfig, HandLandmarkerConfig};
use gesture_rs::{
    gen_time_string, Args, GestureClassifier, GesturePipeline, HandLandmarker, OrtEP,
    PipelineConfig, PipelineState,
};
use image::DynamicImage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn list_frames(source: &str) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = fs::read_dir(source)
        .with_context(|| format!("无法读取图片目录 {}", source))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_lowercase().as_str(), "jpg" | "jpeg" | "png" | "bmp"))
                .unwrap_or(false)
        })
        .collect();
    frames.sort();
    Ok(frames)
}

/// 读取线程: `drop_frames` 时队列满即丢弃新帧, 否则阻塞等待
fn reader_thread(frames: Vec<PathBuf>, tx: Sender<(PathBuf, DynamicImage)>, drop_frames: bool) {
    let mut dropped = 0usize;
    for path in frames {
        let img = match image::open(&path) {
            Ok(img) => img,
            Err(e) => {
                warn!("⚠️  图片解码失败 {}: {}", path.display(), e);
                continue;
            }
        };
        if !drop_frames {
            if tx.send((path, img)).is_err() {
                break;
            }
            continue;
        }
        match tx.try_send((path, img)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => dropped += 1,
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    if dropped > 0 {
        warn!("⚠️  推理队列已满, 丢弃 {} 帧", dropped);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    let ep = if args.cuda {
        OrtEP::CUDA(args.device_id)
    } else {
        OrtEP::CPU
    };

    info!("🚀 手势识别启动");
    info!("📦 关键点模型: {}", args.detector);
    info!("📦 分类模型: {}", args.classifier);
    info!("📂 图片目录: {}", args.source);

    let detector = HandLandmarker::new(
        HandLandmarkerConfig {
            model: args.detector.clone(),
            ep,
            profile: args.profile,
            ..Default::default()
        },
        &config,
    )?;
    let classifier = GestureClassifier::new(
        GestureClassifierConfig {
            model: args.classifier.clone(),
            ep,
            profile: args.profile,
            ..Default::default()
        },
        &config,
    )?;

    let mut pipeline = GesturePipeline::new(config, detector, classifier)?;
    pipeline.summary();

    let frames = list_frames(&args.source)?;
    info!("🎞️  共 {} 帧", frames.len());

    let (tx, rx): (Sender<(PathBuf, DynamicImage)>, Receiver<(PathBuf, DynamicImage)>) =
        crossbeam_channel::bounded(args.queue.max(1));
    let drop_frames = args.drop_frames;
    let reader = std::thread::spawn(move || reader_thread(frames, tx, drop_frames));

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| format!("gesture-{}.jsonl", gen_time_string("")));
    let mut output = BufWriter::new(
        File::create(&output_path).with_context(|| format!("无法创建 {}", output_path))?,
    );

    let start = Instant::now();
    while let Ok((path, img)) = rx.recv() {
        let result = pipeline.process_frame(&img);
        let line = serde_json::to_string(&result)?;
        writeln!(output, "{}", line)?;

        if args.json {
            println!("{}", line);
        } else {
            match result.state {
                PipelineState::Ready => println!(
                    "🎯 {} | {} ({:.2}){}{}",
                    path.display(),
                    result.label.as_deref().unwrap_or("-"),
                    result.confidence,
                    if result.is_stable { " ✔ 稳定" } else { "" },
                    if result.low_confidence { " ❓ 低置信" } else { "" },
                ),
                PipelineState::Collecting => println!(
                    "⏳ {} | 收集中 {:.0}%",
                    path.display(),
                    result.buffer_progress * 100.0
                ),
                PipelineState::NoHand => println!("✋ {} | 未检测到手", path.display()),
                PipelineState::Error => error!(
                    "❌ {} | {}",
                    path.display(),
                    result.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }

        if args.profile {
            info!(
                "[Timing] 检测 {:.1}ms | 分类 {} | 总计 {:.1}ms",
                result.timing.detector_ms,
                result
                    .timing
                    .classifier_ms
                    .map(|ms| format!("{:.1}ms", ms))
                    .unwrap_or_else(|| "-".to_string()),
                result.timing.total_ms
            );
        }
    }

    if reader.join().is_err() {
        error!("❌ 读取线程异常退出");
    }
    output.flush()?;

    let stats = pipeline.stats().clone();
    pipeline.close();
    info!(
        "✅ 完成: {} 帧 | 无手 {} | 错误 {} | 缓冲重置 {} | 耗时 {:.2?}",
        stats.frames,
        stats.no_hand_frames,
        stats.error_frames,
        stats.buffer_resets,
        start.elapsed()
    );
    info!("💾 结果已保存到 {}", output_path);
    Ok(())
}
