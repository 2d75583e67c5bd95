// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

//! 按日期分目录保存每一帧：`dir/YYYY/MM/DD/HH-MM-SS-XXXX.png`。
//!
//! - 默认保存标注后的图像
//! - `record`：保存原始帧，并在同名 `.json` 中写入判定报告
//! - `always`：未检测到人体的帧也保存

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  evaluator::{DEFAULT_MIN_VISIBILITY, FeedbackReport},
  frame::Frame,
  model::Assessment,
  output::{Render, draw::Draw},
  utils::{query_flag, query_map},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct RecordSidecar<'a> {
  frame: usize,
  timestamp_ms: u64,
  report: &'a FeedbackReport,
}

pub enum RecordMode {
  Draw(Box<Draw>),
  Record,
}

impl RecordMode {
  fn save(
    &self,
    path: &Path,
    frame: &Frame,
    result: &Assessment,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      RecordMode::Draw(draw) => {
        draw.draw_assessment(frame, result).save(path)?;
      }
      RecordMode::Record => {
        frame.image.save(path)?;
        let sidecar = RecordSidecar {
          frame: frame.index,
          timestamp_ms: frame.timestamp_ms,
          report: &result.report,
        };
        std::fs::write(
          path.with_extension("json"),
          serde_json::to_vec_pretty(&sidecar)?,
        )?;
      }
    }
    Ok(())
  }
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  mode: RecordMode,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    Self::from_url_with_visibility(uri, DEFAULT_MIN_VISIBILITY)
  }
}

impl DirectoryRecordOutput {
  /// `min_visibility` 为绘制骨架的默认可见度下限，URL 中的同名参数优先
  pub fn from_url_with_visibility(
    uri: &url::Url,
    min_visibility: f32,
  ) -> Result<Self, DirectoryRecordOutputError> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mode = if query_flag(uri, "record") {
      RecordMode::Record
    } else {
      RecordMode::Draw(Box::new(Draw::from_query(&query_map(uri), min_visibility)))
    };

    Ok(DirectoryRecordOutput::new(
      uri.path(),
      mode,
      query_flag(uri, "always"),
    ))
  }

  pub fn new<P: AsRef<Path>>(directory: P, mode: RecordMode, always: bool) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      mode,
      frame_counter: Mutex::new(0),
      always,
    }
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<Frame, Assessment> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &Assessment) -> Result<(), Self::Error> {
    if !self.always && !result.detected() {
      debug!("第 {} 帧未检测到人体，跳过保存", frame.index);
      return Ok(());
    }
    let path = self.frame_path()?;
    self.mode.save(&path, frame, result)?;
    debug!("保存第 {} 帧: {}", frame.index, path.display());
    Ok(())
  }
}
