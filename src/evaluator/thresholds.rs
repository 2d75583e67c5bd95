// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/evaluator/thresholds.rs - 判定阈值配置
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

//! 所有阈值均为经验值，需要结合实际设备单独标定。

use std::{path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 关键点可见度下限，低于该值视为不可用
pub const DEFAULT_MIN_VISIBILITY: f32 = 0.5;
/// 两肩高度差 / 肩宽
pub const DEFAULT_SHOULDER_LEVEL_TOLERANCE: f32 = 0.05;
/// 鼻尖相对两肩中点的水平偏移 / 肩宽
pub const DEFAULT_HEAD_CENTER_TOLERANCE: f32 = 0.10;
/// 手腕到同侧髋部的距离 / 髋宽
pub const DEFAULT_HANDS_ON_HIPS_TOLERANCE: f32 = 0.6;
/// 两肩比两髋更靠近相机的深度差 / 肩宽
pub const DEFAULT_FORWARD_ROLL_MIN_DEPTH: f32 = 0.15;
/// 两肘水平跨度 / 肩宽
pub const DEFAULT_ELBOW_SPREAD_MAX: f32 = 1.6;

/// 判断肩部前倾所用的线索
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollCue {
  /// 比较两肩与两髋的深度，需要估计器提供 z
  #[default]
  Depth,
  /// 纯 2D 近似：比较两肘与两肩的水平跨度
  ElbowSpread,
}

impl FromStr for RollCue {
  type Err = ThresholdsError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "depth" => Ok(RollCue::Depth),
      "elbow-spread" | "elbow_spread" => Ok(RollCue::ElbowSpread),
      other => Err(ThresholdsError::UnknownRollCue(other.to_string())),
    }
  }
}

#[derive(Error, Debug)]
pub enum ThresholdsError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("阈值文件解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("未知的肩部前倾线索: {0}")]
  UnknownRollCue(String),
  #[error("阈值 {field} 无效: {value}")]
  Invalid { field: &'static str, value: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
  pub min_visibility: f32,
  pub shoulder_level_tolerance: f32,
  pub head_center_tolerance: f32,
  pub hands_on_hips_tolerance: f32,
  pub forward_roll_min_depth: f32,
  pub elbow_spread_max: f32,
  pub roll_cue: RollCue,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      min_visibility: DEFAULT_MIN_VISIBILITY,
      shoulder_level_tolerance: DEFAULT_SHOULDER_LEVEL_TOLERANCE,
      head_center_tolerance: DEFAULT_HEAD_CENTER_TOLERANCE,
      hands_on_hips_tolerance: DEFAULT_HANDS_ON_HIPS_TOLERANCE,
      forward_roll_min_depth: DEFAULT_FORWARD_ROLL_MIN_DEPTH,
      elbow_spread_max: DEFAULT_ELBOW_SPREAD_MAX,
      roll_cue: RollCue::default(),
    }
  }
}

impl FromStr for Thresholds {
  type Err = ThresholdsError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let thresholds: Thresholds = toml::from_str(s)?;
    thresholds.validate()
  }
}

impl Thresholds {
  /// 从 TOML 文件读取，未给出的字段使用默认值
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ThresholdsError> {
    let content = std::fs::read_to_string(path)?;
    content.parse()
  }

  /// 所有阈值必须是有限值，可见度下限必须落在 [0, 1]
  pub fn validate(self) -> Result<Self, ThresholdsError> {
    let fields = [
      ("min_visibility", self.min_visibility),
      ("shoulder_level_tolerance", self.shoulder_level_tolerance),
      ("head_center_tolerance", self.head_center_tolerance),
      ("hands_on_hips_tolerance", self.hands_on_hips_tolerance),
      ("forward_roll_min_depth", self.forward_roll_min_depth),
      ("elbow_spread_max", self.elbow_spread_max),
    ];
    if let Some((field, value)) = fields.into_iter().find(|(_, value)| !value.is_finite()) {
      return Err(ThresholdsError::Invalid { field, value });
    }
    if !(0.0..=1.0).contains(&self.min_visibility) {
      return Err(ThresholdsError::Invalid {
        field: "min_visibility",
        value: self.min_visibility,
      });
    }
    Ok(self)
  }

  pub fn with_roll_cue(mut self, roll_cue: RollCue) -> Self {
    self.roll_cue = roll_cue;
    self
  }

  pub fn with_min_visibility(mut self, min_visibility: f32) -> Self {
    self.min_visibility = min_visibility;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_file_keeps_defaults() {
    let thresholds: Thresholds = "shoulder_level_tolerance = 0.08\nroll_cue = \"elbow_spread\"\n"
      .parse()
      .unwrap();
    assert_eq!(thresholds.shoulder_level_tolerance, 0.08);
    assert_eq!(thresholds.roll_cue, RollCue::ElbowSpread);
    assert_eq!(thresholds.head_center_tolerance, DEFAULT_HEAD_CENTER_TOLERANCE);
    assert_eq!(thresholds.min_visibility, DEFAULT_MIN_VISIBILITY);
  }

  #[test]
  fn load_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thresholds.toml");
    std::fs::write(&path, "min_visibility = 0.3\n").unwrap();
    let thresholds = Thresholds::load(&path).unwrap();
    assert_eq!(thresholds.min_visibility, 0.3);
  }

  #[test]
  fn malformed_file_is_rejected() {
    assert!(matches!(
      "min_visibility = \"high\"".parse::<Thresholds>(),
      Err(ThresholdsError::ParseError(_))
    ));
  }

  #[test]
  fn non_finite_tolerance_is_rejected() {
    match "shoulder_level_tolerance = nan\nmin_visibility = 0.5".parse::<Thresholds>() {
      Err(ThresholdsError::Invalid { field, value }) => {
        assert_eq!(field, "shoulder_level_tolerance");
        assert!(value.is_nan());
      }
      other => panic!("expected invalid threshold, got {:?}", other),
    }
    assert!(matches!(
      "elbow_spread_max = inf".parse::<Thresholds>(),
      Err(ThresholdsError::Invalid {
        field: "elbow_spread_max",
        ..
      })
    ));
  }

  #[test]
  fn visibility_outside_unit_range_is_rejected() {
    for content in ["min_visibility = 7.0", "min_visibility = -0.1"] {
      assert!(matches!(
        content.parse::<Thresholds>(),
        Err(ThresholdsError::Invalid {
          field: "min_visibility",
          ..
        })
      ));
    }
    assert!("min_visibility = 0.0".parse::<Thresholds>().is_ok());
    assert!("min_visibility = 1.0".parse::<Thresholds>().is_ok());
    assert!(Thresholds::default().validate().is_ok());
  }

  #[test]
  fn roll_cue_parses_cli_spelling() {
    assert_eq!("elbow-spread".parse::<RollCue>().unwrap(), RollCue::ElbowSpread);
    assert_eq!("depth".parse::<RollCue>().unwrap(), RollCue::Depth);
    assert!("sideways".parse::<RollCue>().is_err());
  }
}
