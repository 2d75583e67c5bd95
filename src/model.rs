// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/model.rs - 姿态估计模型接口
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

use thiserror::Error;
use url::Url;

#[cfg(any(feature = "landmark_replay", feature = "model_onnx"))]
use crate::FromUrlWithScheme;
use crate::{
  FromUrl,
  evaluator::{FeedbackReport, PoseEvaluator},
  frame::Frame,
  landmark::LandmarkSet,
};

/// 姿态估计器。每帧输出 `Option<LandmarkSet>`，`None` 表示未检测到人体。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 一帧的检测结果与评估报告
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
  pub landmarks: Option<LandmarkSet>,
  pub report: FeedbackReport,
}

impl Assessment {
  pub fn detected(&self) -> bool {
    self.landmarks.is_some()
  }
}

/// 未检测到人体时直接给出哨兵报告，不调用评估器
pub fn assess(evaluator: &PoseEvaluator, detection: Option<LandmarkSet>) -> Assessment {
  let report = match &detection {
    Some(landmarks) => evaluator.evaluate(landmarks),
    None => FeedbackReport::no_pose_detected(evaluator.locale()),
  };
  Assessment {
    landmarks: detection,
    report,
  }
}

#[cfg(feature = "landmark_replay")]
mod landmark_replay;
#[cfg(feature = "landmark_replay")]
pub use self::landmark_replay::{LandmarkReplay, LandmarkReplayError};

#[cfg(feature = "model_onnx")]
mod onnx_pose;
#[cfg(feature = "model_onnx")]
pub use self::onnx_pose::{OnnxPose, OnnxPoseBuilder, OnnxPoseError, TensorLayout};

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "model_onnx")]
  #[error("ONNX 姿态估计错误: {0}")]
  OnnxPoseError(#[from] OnnxPoseError),
  #[cfg(feature = "landmark_replay")]
  #[error("关键点回放错误: {0}")]
  LandmarkReplayError(#[from] LandmarkReplayError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择姿态估计器
pub enum ModelWrapper {
  #[cfg(feature = "landmark_replay")]
  LandmarkReplay(LandmarkReplay),
  #[cfg(feature = "model_onnx")]
  OnnxPose(OnnxPose),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "landmark_replay")]
      LandmarkReplay::SCHEME => Ok(ModelWrapper::LandmarkReplay(LandmarkReplay::from_url(url)?)),
      #[cfg(feature = "model_onnx")]
      OnnxPose::SCHEME => Ok(ModelWrapper::OnnxPose(OnnxPose::from_url(url)?)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Model for ModelWrapper {
  type Input = Frame;
  type Output = Option<LandmarkSet>;
  type Error = ModelError;

  fn infer(&self, frame: &Frame) -> Result<Self::Output, Self::Error> {
    match self {
      #[cfg(feature = "landmark_replay")]
      ModelWrapper::LandmarkReplay(model) => model.infer(frame).map_err(|never| match never {}),
      #[cfg(feature = "model_onnx")]
      ModelWrapper::OnnxPose(model) => model.infer(frame).map_err(ModelError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::evaluator::{Criterion, Locale, Outcome, Thresholds, fixtures::ideal_pose};

  #[test]
  fn missing_detection_yields_sentinel() {
    let evaluator = PoseEvaluator::new(Thresholds::default(), Locale::English);
    let assessment = assess(&evaluator, None);
    assert!(!assessment.detected());
    assert!(assessment.report.is_no_pose());
    assert_eq!(assessment.report.len(), 1);
    assert_eq!(
      assessment.report.outcome(Criterion::PoseDetected),
      Some(Outcome::Fail)
    );
  }

  #[test]
  fn detection_is_evaluated() {
    let evaluator = PoseEvaluator::default();
    let assessment = assess(&evaluator, Some(ideal_pose()));
    assert!(assessment.detected());
    assert_eq!(assessment.report.len(), Criterion::EVALUATED.len());
    assert!(assessment.report.all_passed());
    assert_eq!(assessment.report, evaluator.evaluate(&ideal_pose()));
  }

  #[test]
  fn unknown_model_scheme_is_reported() {
    let url = Url::parse("rknn:///models/pose.rknn").unwrap();
    match ModelWrapper::from_url(&url) {
      Err(ModelError::SchemeMismatch(scheme)) => assert_eq!(scheme, "rknn"),
      _ => panic!("expected scheme mismatch"),
    }
  }

  #[cfg(feature = "landmark_replay")]
  #[test]
  fn landmarks_scheme_replays_by_frame_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.jsonl");
    std::fs::write(&path, "null\n{\"nose\":{\"x\":0.5,\"y\":0.1}}\n").unwrap();
    let url = Url::parse(&format!("landmarks://{}", path.display())).unwrap();
    let model = ModelWrapper::from_url(&url).unwrap();

    let frame = |index| Frame::new(index, 0, image::RgbImage::new(2, 2));
    assert_eq!(model.infer(&frame(0)).unwrap(), None);
    assert_eq!(model.infer(&frame(1)).unwrap().unwrap().len(), 1);
  }

  #[cfg(feature = "model_onnx")]
  #[test]
  fn onnx_scheme_reaches_the_onnx_loader() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("onnx://{}/absent.onnx", dir.path().display())).unwrap();
    assert!(matches!(
      ModelWrapper::from_url(&url),
      Err(ModelError::OnnxPoseError(OnnxPoseError::ModelLoadError(_)))
    ));
  }

  #[test]
  fn empty_detection_is_not_the_sentinel() {
    let assessment = assess(&PoseEvaluator::default(), Some(LandmarkSet::new()));
    assert!(!assessment.report.is_no_pose());
    assert!(
      assessment
        .report
        .iter()
        .all(|item| item.outcome == Outcome::Indeterminate)
    );
  }
}
