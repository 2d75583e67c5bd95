// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/model/onnx_pose.rs - ONNX Runtime 姿态估计
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! # ONNX 姿态估计
//!
//! 通过 ONNX Runtime 运行 BlazePose 关键点模型，对每帧输出 33 个 MediaPipe 关键点。
//!
//! ## URL 格式
//!
//! `onnx:///path/to/pose_landmark_full.onnx?size=256&layout=nhwc&score=0.5`
//!
//! - `size`: 模型输入边长，默认 256
//! - `layout`: 输入张量布局，`nhwc`（默认）或 `nchw`
//! - `score`: 人体存在分数下限，低于该值视为未检测到，默认 0.5
//!
//! ## 模型输出
//!
//! 第一个输出为关键点张量，每个关键点 5 个值 `(x, y, z, visibility, presence)`，
//! 坐标以输入像素为单位，可见度为 logit。第二个输出（若存在）为人体存在分数。
//! 帧被直接缩放到模型输入尺寸，归一化坐标因此可以直接映射回原帧。

use std::{
  path::PathBuf,
  str::FromStr,
  sync::{Mutex, PoisonError},
};

use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  landmark::{BodyLandmark, Landmark, LandmarkSet},
  model::Model,
  utils::{query_map, query_parse},
};

const DEFAULT_INPUT_SIZE: u32 = 256;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
const VALUES_PER_LANDMARK: usize = 5;

#[derive(Error, Debug)]
pub enum OnnxPoseError {
  #[error("模型路径必须使用 {} 方案", OnnxPose::SCHEME)]
  SchemeMismatch,
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("未知的输入布局: {0}")]
  UnknownLayout(String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  RuntimeError(String),
  #[error("关键点输出过短: 需要 {expected} 个值, 实际 {actual} 个")]
  OutputTooShort { expected: usize, actual: usize },
}

impl OnnxPoseError {
  fn runtime<E: std::fmt::Display>(e: E) -> Self {
    OnnxPoseError::RuntimeError(e.to_string())
  }
}

/// 输入张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
  #[default]
  Nhwc,
  Nchw,
}

impl FromStr for TensorLayout {
  type Err = OnnxPoseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "nhwc" => Ok(TensorLayout::Nhwc),
      "nchw" => Ok(TensorLayout::Nchw),
      other => Err(OnnxPoseError::UnknownLayout(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnnxPoseBuilder {
  model_path: PathBuf,
  input_size: u32,
  layout: TensorLayout,
  score_threshold: f32,
}

impl FromUrlWithScheme for OnnxPoseBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxPoseBuilder {
  type Error = OnnxPoseError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxPoseError::SchemeMismatch);
    }

    let query = query_map(url);
    let layout = match query.get("layout") {
      Some(layout) => layout.parse()?,
      None => TensorLayout::default(),
    };

    Ok(OnnxPoseBuilder {
      model_path: PathBuf::from(url.path()),
      input_size: query_parse(&query, "size", DEFAULT_INPUT_SIZE).max(1),
      layout,
      score_threshold: query_parse(&query, "score", DEFAULT_SCORE_THRESHOLD),
    })
  }
}

impl OnnxPoseBuilder {
  pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
    Self {
      model_path: model_path.into(),
      input_size: DEFAULT_INPUT_SIZE,
      layout: TensorLayout::default(),
      score_threshold: DEFAULT_SCORE_THRESHOLD,
    }
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size.max(1);
    self
  }

  pub fn layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn score_threshold(mut self, score_threshold: f32) -> Self {
    self.score_threshold = score_threshold;
    self
  }

  pub fn build(self) -> Result<OnnxPose, OnnxPoseError> {
    info!("加载 ONNX 模型文件: {}", self.model_path.display());
    let metadata = std::fs::metadata(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 会话");
    let session = Session::builder()
      .map_err(OnnxPoseError::runtime)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(OnnxPoseError::runtime)?
      .commit_from_file(&self.model_path)
      .map_err(OnnxPoseError::runtime)?;

    if session.inputs.len() != 1 {
      return Err(OnnxPoseError::ModelInvalid(format!(
        "预期模型输入数量为 1, 实际为 {}",
        session.inputs.len()
      )));
    }
    if session.outputs.is_empty() {
      return Err(OnnxPoseError::ModelInvalid("模型没有输出".to_string()));
    }
    debug!(
      "模型输入: {}, 输出数量: {}",
      session.inputs[0].name,
      session.outputs.len()
    );
    info!(
      "模型加载完成，输入 {}x{} ({:?})，存在分数下限 {}",
      self.input_size, self.input_size, self.layout, self.score_threshold
    );

    Ok(OnnxPose {
      session: Mutex::new(session),
      input_size: self.input_size,
      layout: self.layout,
      score_threshold: self.score_threshold,
    })
  }
}

/// ONNX Runtime 上的 BlazePose 关键点模型
pub struct OnnxPose {
  session: Mutex<Session>,
  input_size: u32,
  layout: TensorLayout,
  score_threshold: f32,
}

impl FromUrlWithScheme for OnnxPose {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxPose {
  type Error = OnnxPoseError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    OnnxPoseBuilder::from_url(url)?.build()
  }
}

/// 缩放到模型输入尺寸并归一化到 [0, 1]
fn preprocess(frame: &Frame, input_size: u32, layout: TensorLayout) -> Array4<f32> {
  let resized = imageops::resize(&frame.image, input_size, input_size, FilterType::Triangle);
  let side = input_size as usize;
  let pixel = |x: usize, y: usize, c: usize| resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
  match layout {
    TensorLayout::Nhwc => Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| pixel(x, y, c)),
    TensorLayout::Nchw => Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| pixel(x, y, c)),
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 把关键点输出换算成归一化坐标；存在分数低于下限时返回 `None`
fn decode_landmarks(
  values: &[f32],
  score: f32,
  input_size: u32,
  score_threshold: f32,
) -> Result<Option<LandmarkSet>, OnnxPoseError> {
  let expected = BodyLandmark::COUNT * VALUES_PER_LANDMARK;
  if values.len() < expected {
    return Err(OnnxPoseError::OutputTooShort {
      expected,
      actual: values.len(),
    });
  }
  if score < score_threshold {
    return Ok(None);
  }

  let scale = input_size as f32;
  let landmarks: Vec<Landmark> = values[..expected]
    .chunks_exact(VALUES_PER_LANDMARK)
    .map(|v| Landmark::new(v[0] / scale, v[1] / scale, sigmoid(v[3])).with_depth(v[2] / scale))
    .collect();
  Ok(Some(LandmarkSet::from_ordered(&landmarks)))
}

impl Model for OnnxPose {
  type Input = Frame;
  type Output = Option<LandmarkSet>;
  type Error = OnnxPoseError;

  fn infer(&self, frame: &Frame) -> Result<Self::Output, Self::Error> {
    let input = preprocess(frame, self.input_size, self.layout);
    let tensor = Tensor::from_array(input).map_err(OnnxPoseError::runtime)?;

    let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
    let outputs = session
      .run(ort::inputs![tensor])
      .map_err(OnnxPoseError::runtime)?;

    let values: Vec<f32> = outputs[0]
      .try_extract_array::<f32>()
      .map_err(OnnxPoseError::runtime)?
      .iter()
      .copied()
      .collect();
    let score = if outputs.len() > 1 {
      outputs[1]
        .try_extract_array::<f32>()
        .map_err(OnnxPoseError::runtime)?
        .iter()
        .next()
        .copied()
        .unwrap_or(0.0)
    } else {
      1.0
    };

    let pose = decode_landmarks(&values, score, self.input_size, self.score_threshold)?;
    debug!(
      "第 {} 帧推理: 存在分数 {:.3}, {}",
      frame.index,
      score,
      if pose.is_some() { "检测到人体" } else { "未检测到人体" }
    );
    Ok(pose)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn raw_output(fill: impl Fn(usize) -> [f32; 5]) -> Vec<f32> {
    (0..39).flat_map(fill).collect()
  }

  #[test]
  fn url_sets_size_layout_and_score() {
    let url = Url::parse("onnx:///models/pose.onnx?size=192&layout=nchw&score=0.7").unwrap();
    let builder = OnnxPoseBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder,
      OnnxPoseBuilder::new("/models/pose.onnx")
        .input_size(192)
        .layout(TensorLayout::Nchw)
        .score_threshold(0.7)
    );

    let url = Url::parse("onnx:///models/pose.onnx").unwrap();
    assert_eq!(
      OnnxPoseBuilder::from_url(&url).unwrap(),
      OnnxPoseBuilder::new("/models/pose.onnx")
    );
  }

  #[test]
  fn bad_scheme_or_layout_is_rejected() {
    let url = Url::parse("landmarks:///models/pose.onnx").unwrap();
    assert!(matches!(
      OnnxPoseBuilder::from_url(&url),
      Err(OnnxPoseError::SchemeMismatch)
    ));
    let url = Url::parse("onnx:///models/pose.onnx?layout=chw").unwrap();
    assert!(matches!(
      OnnxPoseBuilder::from_url(&url),
      Err(OnnxPoseError::UnknownLayout(layout)) if layout == "chw"
    ));
  }

  #[test]
  fn missing_model_file_fails_before_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let builder = OnnxPoseBuilder::new(dir.path().join("absent.onnx"));
    assert!(matches!(
      builder.build(),
      Err(OnnxPoseError::ModelLoadError(_))
    ));
  }

  #[test]
  fn decode_normalises_coordinates_and_visibility() {
    let values = raw_output(|i| [2.0 * i as f32, 128.0, -64.0, 0.0, 5.0]);
    let pose = decode_landmarks(&values, 0.9, 256, 0.5).unwrap().unwrap();
    assert_eq!(pose.len(), BodyLandmark::COUNT);

    let shoulder = pose.get(BodyLandmark::LeftShoulder).unwrap();
    let i = BodyLandmark::LeftShoulder.index() as f32;
    assert!((shoulder.x - 2.0 * i / 256.0).abs() < 1e-6);
    assert!((shoulder.y - 0.5).abs() < 1e-6);
    assert_eq!(shoulder.z, Some(-0.25));
    assert!((shoulder.visibility - 0.5).abs() < 1e-6);
  }

  #[test]
  fn low_presence_score_means_no_pose() {
    let values = raw_output(|_| [128.0, 128.0, 0.0, 3.0, 3.0]);
    assert_eq!(decode_landmarks(&values, 0.2, 256, 0.5).unwrap(), None);
    assert!(decode_landmarks(&values, 0.5, 256, 0.5).unwrap().is_some());
  }

  #[test]
  fn short_output_is_rejected() {
    assert!(matches!(
      decode_landmarks(&[0.0; 20], 1.0, 256, 0.5),
      Err(OnnxPoseError::OutputTooShort { expected: 165, actual: 20 })
    ));
  }

  #[test]
  fn preprocess_follows_layout() {
    let frame = Frame::from(RgbImage::from_pixel(8, 4, Rgb([255, 0, 51])));
    let nhwc = preprocess(&frame, 4, TensorLayout::Nhwc);
    assert_eq!(nhwc.shape(), &[1, 4, 4, 3]);
    assert_eq!(nhwc[[0, 2, 1, 0]], 1.0);
    assert!((nhwc[[0, 2, 1, 2]] - 0.2).abs() < 1e-6);

    let nchw = preprocess(&frame, 4, TensorLayout::Nchw);
    assert_eq!(nchw.shape(), &[1, 3, 4, 4]);
    assert_eq!(nchw[[0, 1, 3, 3]], 0.0);
    assert!((nchw[[0, 2, 0, 0]] - 0.2).abs() < 1e-6);
  }
}
