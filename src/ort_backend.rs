// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ONNX Runtime 推理后端
//!
//! 一个会话对象对应一个模型文件: 构造时加载, `close()` 时释放 (仅释放一次)。

use anyhow::{anyhow, bail, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::{debug, info};

/// 执行设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: String,                 // 模型路径
    pub ep: OrtEP,                 // 执行设备
    pub input_name: String,        // 输入张量名
    pub output_names: Vec<String>, // 需要取回的输出张量名 (按顺序返回)
    pub intra_threads: usize,
}

pub struct OrtBackend {
    session: Option<Session>,
    config: OrtConfig,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        info!(model = %config.f, ep = ?config.ep, "📦 加载ONNX模型");

        let mut builder = Session::builder()
            .map_err(|e| anyhow!("Failed to create session builder: {}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Failed to set optimization level: {}", e))?
            .with_intra_threads(config.intra_threads.max(1))
            .map_err(|e| anyhow!("Failed to set intra threads: {}", e))?;

        if let OrtEP::CUDA(device_id) = config.ep {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build()])
                .map_err(|e| anyhow!("Failed to register CUDA provider: {}", e))?;
        }

        let session = builder
            .commit_from_file(&config.f)
            .map_err(|e| anyhow!("Failed to load model {}: {}", config.f, e))?;

        info!(
            input = %config.input_name,
            outputs = ?config.output_names,
            "✅ ONNX模型加载成功"
        );

        Ok(Self {
            session: Some(session),
            config,
        })
    }

    /// 推理: 单输入 → 按 `output_names` 顺序返回的输出张量
    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let session = match self.session.as_mut() {
            Some(s) => s,
            None => bail!("ONNX session for {} is closed", self.config.f),
        };

        let t_run = std::time::Instant::now();
        let shape: Vec<i64> = xs.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = xs.iter().copied().collect();
        let tensor = ort::value::Tensor::from_array((shape, data))
            .map_err(|e| anyhow!("Failed to create ORT tensor: {}", e))?;

        let outputs = session
            .run(ort::inputs![self.config.input_name.as_str() => tensor])
            .map_err(|e| anyhow!("Inference failed: {}", e))?;

        let mut ys = Vec::with_capacity(self.config.output_names.len());
        for name in &self.config.output_names {
            let output = outputs
                .get(name.as_str())
                .ok_or_else(|| anyhow!("Missing model output `{}`", name))?;
            let (shape, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Output `{}` is not a f32 tensor: {}", name, e))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            ys.push(Array::from_shape_vec(IxDyn(&dims), data.to_vec())?);
        }

        if profile {
            debug!("[ORT Inference] {}: {:?}", self.config.f, t_run.elapsed());
        }
        Ok(ys)
    }

    /// 释放会话, 可重复调用
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            info!("🔒 ONNX会话已释放: {}", self.config.f);
        }
    }
}
