// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/output.rs - 输出定义
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

#[cfg(any(
  feature = "save_image_file",
  feature = "directory_record",
  feature = "gstreamer_output"
))]
use crate::FromUrlWithScheme;
use crate::{FromUrl, evaluator::DEFAULT_MIN_VISIBILITY, frame::Frame, model::Assessment};
use thiserror::Error;
use url::Url;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

#[cfg(feature = "draw")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{
  GStreamerVideoOutput, GStreamerVideoOutputBuilder, GStreamerVideoOutputError, VideoSink,
};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError, RecordMode};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideoOutput(GStreamerVideoOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with_visibility(url, DEFAULT_MIN_VISIBILITY)
  }
}

impl OutputWrapper {
  /// 骨架绘制沿用评估器的可见度下限，输出 URL 的 `min_visibility` 参数优先
  #[cfg_attr(
    not(any(
      feature = "save_image_file",
      feature = "directory_record",
      feature = "gstreamer_output"
    )),
    allow(unused_variables)
  )]
  pub fn from_url_with_visibility(url: &Url, min_visibility: f32) -> Result<Self, OutputError> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url_with_visibility(url, min_visibility)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "gstreamer_output")]
      GStreamerVideoOutput::SCHEME => {
        let output = GStreamerVideoOutput::from_url_with_visibility(url, min_visibility)?;
        Ok(OutputWrapper::GStreamerVideoOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url_with_visibility(url, min_visibility)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<Frame, Assessment> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &Frame, result: &Assessment) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_reported() {
    let url = Url::parse("rtsp://0.0.0.0:8554/live").unwrap();
    match OutputWrapper::from_url(&url) {
      Err(OutputError::SchemeMismatch(scheme)) => assert_eq!(scheme, "rtsp"),
      _ => panic!("expected scheme mismatch"),
    }
  }

  #[cfg(feature = "save_image_file")]
  #[test]
  fn skeleton_follows_evaluator_visibility() {
    use crate::{
      args::EvaluatorArgs,
      evaluator::Criterion,
      landmark::{BodyLandmark, Landmark, LandmarkSet},
      model::assess,
    };
    use image::{Rgb, RgbImage};

    let args = EvaluatorArgs {
      min_visibility: Some(0.3),
      ..EvaluatorArgs::default()
    };
    let evaluator = args.evaluator().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overlay.png");
    let url = Url::parse(&format!(
      "image://{}?font=/nonexistent/font.ttf",
      path.display()
    ))
    .unwrap();
    let output =
      OutputWrapper::from_url_with_visibility(&url, evaluator.thresholds().min_visibility).unwrap();

    let landmarks = LandmarkSet::new()
      .with(BodyLandmark::LeftShoulder, Landmark::new(0.3, 0.5, 0.4))
      .with(BodyLandmark::RightShoulder, Landmark::new(0.7, 0.5, 0.4));
    let assessment = assess(&evaluator, Some(landmarks));
    assert_eq!(
      assessment.report.outcome(Criterion::ShoulderLevel),
      Some(crate::evaluator::Outcome::Pass)
    );

    let frame = Frame::from(RgbImage::new(100, 100));
    output.render_result(&frame, &assessment).unwrap();
    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.get_pixel(50, 50), &Rgb([255, 0, 0]));
  }

  #[cfg(feature = "directory_record")]
  #[test]
  fn folder_scheme_selects_directory_record() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}?record", dir.path().display())).unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::DirectoryRecordOutput(_))
    ));
  }
}
