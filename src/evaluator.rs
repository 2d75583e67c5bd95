// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/evaluator.rs - Chest PA 体位判定
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

//! # Chest PA 体位判定
//!
//! 根据一帧的人体关键点，依次判定四项标准：
//!
//! 1. 两肩水平
//! 2. 头部居中
//! 3. 双手叉腰
//! 4. 两肩前倾（近似判定）
//!
//! 所有距离都按肩宽或髋宽归一化，与被检者离相机的远近和画面分辨率无关。
//! 关键点缺失或可见度不足时，相关标准记为“无法判定”而不是“不通过”。
//!
//! 判定是纯函数，不保存跨帧状态，也不输出日志。
//!
//! ```
//! use chestpa::evaluator::{Outcome, PoseEvaluator};
//! use chestpa::landmark::LandmarkSet;
//!
//! let report = PoseEvaluator::default().evaluate(&LandmarkSet::new());
//! assert_eq!(report.len(), 4);
//! assert!(report.iter().all(|item| item.outcome == Outcome::Indeterminate));
//! ```

use std::fmt;

use serde::Serialize;

use crate::landmark::{BodyLandmark, Landmark, LandmarkSet};

mod geometry;
mod messages;
mod thresholds;

#[cfg(test)]
pub(crate) mod fixtures;

use self::geometry::{distance, horizontal_span, mid_x, ratio, vertical_span};
use self::messages::Note;
pub use self::messages::{Locale, UnknownLocale};
pub use self::thresholds::{
  DEFAULT_ELBOW_SPREAD_MAX, DEFAULT_FORWARD_ROLL_MIN_DEPTH, DEFAULT_HANDS_ON_HIPS_TOLERANCE,
  DEFAULT_HEAD_CENTER_TOLERANCE, DEFAULT_MIN_VISIBILITY, DEFAULT_SHOULDER_LEVEL_TOLERANCE,
  RollCue, Thresholds, ThresholdsError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
  ShoulderLevel,
  HeadCentered,
  HandsOnHips,
  ShoulderRoll,
  /// 仅用于“未检测到人体”的占位结果
  PoseDetected,
}

impl Criterion {
  /// 判定顺序，决定报告中条目的顺序
  pub const EVALUATED: [Criterion; 4] = [
    Criterion::ShoulderLevel,
    Criterion::HeadCentered,
    Criterion::HandsOnHips,
    Criterion::ShoulderRoll,
  ];

  pub fn id(self) -> &'static str {
    match self {
      Criterion::ShoulderLevel => "shoulder_level",
      Criterion::HeadCentered => "head_centered",
      Criterion::HandsOnHips => "hands_on_hips",
      Criterion::ShoulderRoll => "shoulder_roll",
      Criterion::PoseDetected => "pose_detected",
    }
  }
}

impl fmt::Display for Criterion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.id())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Pass,
  Fail,
  Indeterminate,
}

impl Outcome {
  pub fn marker(self) -> &'static str {
    match self {
      Outcome::Pass => "✅",
      Outcome::Fail => "❌",
      Outcome::Indeterminate => "❔",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackItem {
  pub criterion: Criterion,
  pub outcome: Outcome,
  /// 与阈值比较的归一化量
  #[serde(skip_serializing_if = "Option::is_none")]
  pub measure: Option<f32>,
  pub text: &'static str,
  /// 带结论标记前缀的文案
  pub message: String,
}

impl FeedbackItem {
  fn new(criterion: Criterion, outcome: Outcome, measure: Option<f32>, text: &'static str) -> Self {
    Self {
      criterion,
      outcome,
      measure,
      text,
      message: format!("{} {}", outcome.marker(), text),
    }
  }

  pub fn passed(&self) -> bool {
    self.outcome == Outcome::Pass
  }
}

impl fmt::Display for FeedbackItem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeedbackReport {
  items: Vec<FeedbackItem>,
}

impl FeedbackReport {
  /// 上游未检测到人体时由调用方替换使用的报告
  pub fn no_pose_detected(locale: Locale) -> Self {
    let criterion = Criterion::PoseDetected;
    let text = messages::text(locale, criterion, Note::Failed);
    Self {
      items: vec![FeedbackItem::new(criterion, Outcome::Fail, None, text)],
    }
  }

  pub fn items(&self) -> &[FeedbackItem] {
    &self.items
  }

  pub fn iter(&self) -> std::slice::Iter<'_, FeedbackItem> {
    self.items.iter()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn get(&self, criterion: Criterion) -> Option<&FeedbackItem> {
    self.items.iter().find(|item| item.criterion == criterion)
  }

  pub fn outcome(&self, criterion: Criterion) -> Option<Outcome> {
    self.get(criterion).map(|item| item.outcome)
  }

  pub fn all_passed(&self) -> bool {
    !self.items.is_empty() && self.items.iter().all(FeedbackItem::passed)
  }

  pub fn is_no_pose(&self) -> bool {
    matches!(self.items.as_slice(), [item] if item.criterion == Criterion::PoseDetected)
  }

  pub fn outcomes(&self) -> Vec<(Criterion, Outcome)> {
    self
      .items
      .iter()
      .map(|item| (item.criterion, item.outcome))
      .collect()
  }
}

impl<'a> IntoIterator for &'a FeedbackReport {
  type Item = &'a FeedbackItem;
  type IntoIter = std::slice::Iter<'a, FeedbackItem>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

/// 单项判定的中间结果
struct Judgement {
  note: Note,
  measure: Option<f32>,
}

impl Judgement {
  fn unseen() -> Self {
    Self {
      note: Note::Unseen,
      measure: None,
    }
  }

  fn at_most(measure: f32, tolerance: f32) -> Self {
    let note = if measure <= tolerance {
      Note::Passed
    } else {
      Note::Failed
    };
    Self {
      note,
      measure: Some(measure),
    }
  }

  fn at_least(measure: f32, minimum: f32) -> Self {
    let note = if measure >= minimum {
      Note::Passed
    } else {
      Note::Failed
    };
    Self {
      note,
      measure: Some(measure),
    }
  }

  fn outcome(&self) -> Outcome {
    match self.note {
      Note::Passed => Outcome::Pass,
      Note::Failed | Note::FailedLeft | Note::FailedRight => Outcome::Fail,
      Note::Unseen => Outcome::Indeterminate,
    }
  }
}

/// 只暴露可见度达标的关键点
struct Visible<'a> {
  landmarks: &'a LandmarkSet,
  threshold: f32,
}

impl Visible<'_> {
  fn get(&self, kind: BodyLandmark) -> Option<&Landmark> {
    self.landmarks.visible(kind, self.threshold)
  }

  fn pair(&self, left: BodyLandmark, right: BodyLandmark) -> Option<(&Landmark, &Landmark)> {
    Some((self.get(left)?, self.get(right)?))
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseEvaluator {
  thresholds: Thresholds,
  locale: Locale,
}

impl PoseEvaluator {
  pub fn new(thresholds: Thresholds, locale: Locale) -> Self {
    Self { thresholds, locale }
  }

  pub fn thresholds(&self) -> &Thresholds {
    &self.thresholds
  }

  pub fn locale(&self) -> Locale {
    self.locale
  }

  /// 判定一帧关键点，条目顺序与 [`Criterion::EVALUATED`] 一致
  pub fn evaluate(&self, landmarks: &LandmarkSet) -> FeedbackReport {
    let visible = Visible {
      landmarks,
      threshold: self.thresholds.min_visibility,
    };
    let items = Criterion::EVALUATED
      .iter()
      .map(|&criterion| {
        let judgement = match criterion {
          Criterion::ShoulderLevel => self.shoulder_level(&visible),
          Criterion::HeadCentered => self.head_centered(&visible),
          Criterion::HandsOnHips => self.hands_on_hips(&visible),
          Criterion::ShoulderRoll => self.shoulder_roll(&visible),
          Criterion::PoseDetected => None,
        }
        .unwrap_or_else(Judgement::unseen);
        let text = messages::text(self.locale, criterion, judgement.note);
        FeedbackItem::new(criterion, judgement.outcome(), judgement.measure, text)
      })
      .collect();
    FeedbackReport { items }
  }

  fn shoulder_level(&self, visible: &Visible<'_>) -> Option<Judgement> {
    let (ls, rs) = visible.pair(BodyLandmark::LeftShoulder, BodyLandmark::RightShoulder)?;
    let measure = ratio(vertical_span(ls, rs), horizontal_span(ls, rs))?;
    Some(Judgement::at_most(
      measure,
      self.thresholds.shoulder_level_tolerance,
    ))
  }

  fn head_centered(&self, visible: &Visible<'_>) -> Option<Judgement> {
    let nose = visible.get(BodyLandmark::Nose)?;
    let (ls, rs) = visible.pair(BodyLandmark::LeftShoulder, BodyLandmark::RightShoulder)?;
    let measure = ratio((nose.x - mid_x(ls, rs)).abs(), horizontal_span(ls, rs))?;
    Some(Judgement::at_most(
      measure,
      self.thresholds.head_center_tolerance,
    ))
  }

  fn hands_on_hips(&self, visible: &Visible<'_>) -> Option<Judgement> {
    let (lw, rw) = visible.pair(BodyLandmark::LeftWrist, BodyLandmark::RightWrist)?;
    let (lh, rh) = visible.pair(BodyLandmark::LeftHip, BodyLandmark::RightHip)?;
    let hip_width = distance(lh, rh);
    let left = ratio(distance(lw, lh), hip_width)?;
    let right = ratio(distance(rw, rh), hip_width)?;

    let tolerance = self.thresholds.hands_on_hips_tolerance;
    let note = match (left <= tolerance, right <= tolerance) {
      (true, true) => Note::Passed,
      (false, true) => Note::FailedLeft,
      (true, false) => Note::FailedRight,
      (false, false) => Note::Failed,
    };
    Some(Judgement {
      note,
      measure: Some(left.max(right)),
    })
  }

  fn shoulder_roll(&self, visible: &Visible<'_>) -> Option<Judgement> {
    let (ls, rs) = visible.pair(BodyLandmark::LeftShoulder, BodyLandmark::RightShoulder)?;
    match self.thresholds.roll_cue {
      RollCue::Depth => {
        let (lh, rh) = visible.pair(BodyLandmark::LeftHip, BodyLandmark::RightHip)?;
        let shoulder_z = (ls.z? + rs.z?) / 2.0;
        let hip_z = (lh.z? + rh.z?) / 2.0;
        let measure = ratio(hip_z - shoulder_z, distance(ls, rs))?;
        Some(Judgement::at_least(
          measure,
          self.thresholds.forward_roll_min_depth,
        ))
      }
      RollCue::ElbowSpread => {
        let (le, re) = visible.pair(BodyLandmark::LeftElbow, BodyLandmark::RightElbow)?;
        let measure = ratio(horizontal_span(le, re), horizontal_span(ls, rs))?;
        Some(Judgement::at_most(measure, self.thresholds.elbow_spread_max))
      }
    }
  }
}

/// 使用默认阈值与语言判定
pub fn evaluate(landmarks: &LandmarkSet) -> FeedbackReport {
  PoseEvaluator::default().evaluate(landmarks)
}
