// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/model/landmark_replay.rs - 关键点录制回放
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

//! # 关键点回放
//!
//! 读取外部姿态估计器预先导出的 JSON Lines 文件，按帧序号回放检测结果。
//! URL 格式为 `landmarks:///path/to/recording.jsonl`。
//!
//! 每行一个 JSON 值：
//!
//! - `null`：该帧未检测到人体
//! - 数组：按 MediaPipe 顺序排列的关键点，`[{"x":0.5,"y":0.2,"visibility":0.9}, ...]`
//! - 对象：以关键点名称为键，`{"left_shoulder":{"x":0.65,"y":0.3}, ...}`
//!
//! 空行等同于 `null`，超出文件末尾的帧同样视为未检测到。

use std::{
  collections::HashMap,
  convert::Infallible,
  fs::File,
  io::{BufRead, BufReader},
  path::Path,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  landmark::{BodyLandmark, Landmark, LandmarkSet},
  model::Model,
};

#[derive(Error, Debug)]
pub enum LandmarkReplayError {
  #[error("模型路径必须使用 {} 方案", LandmarkReplay::SCHEME)]
  SchemeMismatch,
  #[error("读取录制文件错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordedPose {
  Ordered(Vec<Landmark>),
  Named(HashMap<BodyLandmark, Landmark>),
}

impl From<RecordedPose> for LandmarkSet {
  fn from(pose: RecordedPose) -> Self {
    match pose {
      RecordedPose::Ordered(landmarks) => LandmarkSet::from_ordered(&landmarks),
      RecordedPose::Named(landmarks) => LandmarkSet::from_named(&landmarks),
    }
  }
}

/// 按帧序号回放的姿态估计器
#[derive(Debug, Clone, Default)]
pub struct LandmarkReplay {
  poses: Vec<Option<LandmarkSet>>,
}

impl FromUrlWithScheme for LandmarkReplay {
  const SCHEME: &'static str = "landmarks";
}

impl FromUrl for LandmarkReplay {
  type Error = LandmarkReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LandmarkReplayError::SchemeMismatch);
    }
    Self::load(url.path())
  }
}

impl LandmarkReplay {
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LandmarkReplayError> {
    let path = path.as_ref();
    info!("加载关键点录制文件: {}", path.display());
    let replay = Self::from_reader(BufReader::new(File::open(path)?))?;
    info!(
      "录制共 {} 帧，其中 {} 帧检测到人体",
      replay.len(),
      replay.poses.iter().filter(|pose| pose.is_some()).count()
    );
    Ok(replay)
  }

  pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, LandmarkReplayError> {
    let mut poses = Vec::new();
    for (number, line) in reader.lines().enumerate() {
      let line = line?;
      if line.trim().is_empty() {
        poses.push(None);
        continue;
      }
      let pose: Option<RecordedPose> =
        serde_json::from_str(&line).map_err(|source| LandmarkReplayError::ParseError {
          line: number + 1,
          source,
        })?;
      poses.push(pose.map(LandmarkSet::from));
    }
    Ok(Self { poses })
  }

  pub fn len(&self) -> usize {
    self.poses.len()
  }

  pub fn is_empty(&self) -> bool {
    self.poses.is_empty()
  }

  pub fn pose(&self, index: usize) -> Option<&LandmarkSet> {
    self.poses.get(index).and_then(Option::as_ref)
  }
}

impl Model for LandmarkReplay {
  type Input = Frame;
  type Output = Option<LandmarkSet>;
  type Error = Infallible;

  fn infer(&self, frame: &Frame) -> Result<Self::Output, Self::Error> {
    let pose = self.pose(frame.index).cloned();
    debug!(
      "第 {} 帧回放: {} 个关键点",
      frame.index,
      pose.as_ref().map(LandmarkSet::len).unwrap_or(0)
    );
    Ok(pose)
  }
}
