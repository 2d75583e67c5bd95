// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/landmark.rs - 人体关键点定义
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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 人体关键点标识，顺序与 MediaPipe Pose 的 33 个关键点一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BodyLandmark {
  Nose = 0,
  LeftEyeInner = 1,
  LeftEye = 2,
  LeftEyeOuter = 3,
  RightEyeInner = 4,
  RightEye = 5,
  RightEyeOuter = 6,
  LeftEar = 7,
  RightEar = 8,
  MouthLeft = 9,
  MouthRight = 10,
  LeftShoulder = 11,
  RightShoulder = 12,
  LeftElbow = 13,
  RightElbow = 14,
  LeftWrist = 15,
  RightWrist = 16,
  LeftPinky = 17,
  RightPinky = 18,
  LeftIndex = 19,
  RightIndex = 20,
  LeftThumb = 21,
  RightThumb = 22,
  LeftHip = 23,
  RightHip = 24,
  LeftKnee = 25,
  RightKnee = 26,
  LeftAnkle = 27,
  RightAnkle = 28,
  LeftHeel = 29,
  RightHeel = 30,
  LeftFootIndex = 31,
  RightFootIndex = 32,
}

impl BodyLandmark {
  pub const COUNT: usize = 33;

  pub const ALL: [BodyLandmark; Self::COUNT] = [
    Self::Nose,
    Self::LeftEyeInner,
    Self::LeftEye,
    Self::LeftEyeOuter,
    Self::RightEyeInner,
    Self::RightEye,
    Self::RightEyeOuter,
    Self::LeftEar,
    Self::RightEar,
    Self::MouthLeft,
    Self::MouthRight,
    Self::LeftShoulder,
    Self::RightShoulder,
    Self::LeftElbow,
    Self::RightElbow,
    Self::LeftWrist,
    Self::RightWrist,
    Self::LeftPinky,
    Self::RightPinky,
    Self::LeftIndex,
    Self::RightIndex,
    Self::LeftThumb,
    Self::RightThumb,
    Self::LeftHip,
    Self::RightHip,
    Self::LeftKnee,
    Self::RightKnee,
    Self::LeftAnkle,
    Self::RightAnkle,
    Self::LeftHeel,
    Self::RightHeel,
    Self::LeftFootIndex,
    Self::RightFootIndex,
  ];

  pub fn index(self) -> usize {
    self as usize
  }

  pub fn from_index(index: usize) -> Option<Self> {
    Self::ALL.get(index).copied()
  }
}

/// 骨架连线，与 MediaPipe 的 POSE_CONNECTIONS 相同
pub const POSE_CONNECTIONS: [(BodyLandmark, BodyLandmark); 35] = {
  use BodyLandmark::*;
  [
    (Nose, LeftEyeInner),
    (LeftEyeInner, LeftEye),
    (LeftEye, LeftEyeOuter),
    (LeftEyeOuter, LeftEar),
    (Nose, RightEyeInner),
    (RightEyeInner, RightEye),
    (RightEye, RightEyeOuter),
    (RightEyeOuter, RightEar),
    (MouthLeft, MouthRight),
    (LeftShoulder, RightShoulder),
    (LeftShoulder, LeftElbow),
    (LeftElbow, LeftWrist),
    (LeftWrist, LeftPinky),
    (LeftWrist, LeftIndex),
    (LeftWrist, LeftThumb),
    (LeftPinky, LeftIndex),
    (RightShoulder, RightElbow),
    (RightElbow, RightWrist),
    (RightWrist, RightPinky),
    (RightWrist, RightIndex),
    (RightWrist, RightThumb),
    (RightPinky, RightIndex),
    (LeftShoulder, LeftHip),
    (RightShoulder, RightHip),
    (LeftHip, RightHip),
    (LeftHip, LeftKnee),
    (RightHip, RightKnee),
    (LeftKnee, LeftAnkle),
    (RightKnee, RightAnkle),
    (LeftAnkle, LeftHeel),
    (RightAnkle, RightHeel),
    (LeftHeel, LeftFootIndex),
    (RightHeel, RightFootIndex),
    (LeftAnkle, LeftFootIndex),
    (RightAnkle, RightFootIndex),
  ]
};

/// 单个关键点
///
/// `x`、`y` 为相对于画面宽高的归一化坐标；`z` 为估计器给出的相对深度，
/// 数值越小越靠近相机，纯 2D 估计器可以不提供。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
  pub x: f32,
  pub y: f32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub z: Option<f32>,
  #[serde(default = "full_visibility")]
  pub visibility: f32,
}

fn full_visibility() -> f32 {
  1.0
}

impl Landmark {
  pub fn new(x: f32, y: f32, visibility: f32) -> Self {
    Self {
      x,
      y,
      z: None,
      visibility,
    }
  }

  pub fn with_depth(mut self, z: f32) -> Self {
    self.z = Some(z);
    self
  }

  pub fn is_visible(&self, threshold: f32) -> bool {
    self.visibility >= threshold
  }

  /// 转换为像素坐标
  pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
    (self.x * width as f32, self.y * height as f32)
  }
}

/// 一帧图像中检测到的全部关键点
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
  points: [Option<Landmark>; BodyLandmark::COUNT],
}

impl Default for LandmarkSet {
  fn default() -> Self {
    Self {
      points: [None; BodyLandmark::COUNT],
    }
  }
}

impl LandmarkSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// 按 MediaPipe 顺序构造，多余的元素被忽略，不足的视为缺失
  pub fn from_ordered(landmarks: &[Landmark]) -> Self {
    let mut set = Self::new();
    for (slot, landmark) in set.points.iter_mut().zip(landmarks) {
      *slot = Some(*landmark);
    }
    set
  }

  pub fn from_named(landmarks: &HashMap<BodyLandmark, Landmark>) -> Self {
    let mut set = Self::new();
    for (kind, landmark) in landmarks {
      set.insert(*kind, *landmark);
    }
    set
  }

  pub fn with(mut self, kind: BodyLandmark, landmark: Landmark) -> Self {
    self.insert(kind, landmark);
    self
  }

  pub fn insert(&mut self, kind: BodyLandmark, landmark: Landmark) {
    self.points[kind.index()] = Some(landmark);
  }

  pub fn remove(&mut self, kind: BodyLandmark) -> Option<Landmark> {
    self.points[kind.index()].take()
  }

  pub fn get(&self, kind: BodyLandmark) -> Option<&Landmark> {
    self.points[kind.index()].as_ref()
  }

  /// 仅返回可见度不低于阈值的关键点
  pub fn visible(&self, kind: BodyLandmark, threshold: f32) -> Option<&Landmark> {
    self.get(kind).filter(|l| l.is_visible(threshold))
  }

  pub fn len(&self) -> usize {
    self.points.iter().filter(|p| p.is_some()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.points.iter().all(Option::is_none)
  }

  pub fn iter(&self) -> impl Iterator<Item = (BodyLandmark, &Landmark)> {
    BodyLandmark::ALL
      .iter()
      .zip(self.points.iter())
      .filter_map(|(kind, point)| point.as_ref().map(|p| (*kind, p)))
  }

  /// 对每个关键点应用同一个坐标变换，可见度保持不变
  pub fn map_points(&self, f: impl Fn(&Landmark) -> Landmark) -> Self {
    let mut set = Self::new();
    for (slot, point) in set.points.iter_mut().zip(self.points.iter()) {
      *slot = point.as_ref().map(&f);
    }
    set
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn index_round_trips_through_all() {
    for (i, kind) in BodyLandmark::ALL.iter().enumerate() {
      assert_eq!(kind.index(), i);
      assert_eq!(BodyLandmark::from_index(i), Some(*kind));
    }
    assert_eq!(BodyLandmark::from_index(BodyLandmark::COUNT), None);
  }

  #[test]
  fn from_ordered_fills_prefix_only() {
    let points = vec![Landmark::new(0.1, 0.2, 0.9); 13];
    let set = LandmarkSet::from_ordered(&points);
    assert_eq!(set.len(), 13);
    assert!(set.get(BodyLandmark::RightShoulder).is_some());
    assert!(set.get(BodyLandmark::LeftElbow).is_none());
  }

  #[test]
  fn visible_respects_threshold() {
    let set = LandmarkSet::new().with(BodyLandmark::Nose, Landmark::new(0.5, 0.1, 0.4));
    assert!(set.get(BodyLandmark::Nose).is_some());
    assert!(set.visible(BodyLandmark::Nose, 0.5).is_none());
    assert!(set.visible(BodyLandmark::Nose, 0.4).is_some());
  }

  #[test]
  fn named_landmarks_deserialize_with_defaults() {
    let json = r#"{"left_hip": {"x": 0.4, "y": 0.6}, "nose": {"x": 0.5, "y": 0.1, "z": -0.2, "visibility": 0.7}}"#;
    let named: HashMap<BodyLandmark, Landmark> = serde_json::from_str(json).unwrap();
    let set = LandmarkSet::from_named(&named);
    assert_eq!(set.len(), 2);
    let hip = set.get(BodyLandmark::LeftHip).unwrap();
    assert_eq!(hip.visibility, 1.0);
    assert_eq!(hip.z, None);
    assert_eq!(set.get(BodyLandmark::Nose).unwrap().z, Some(-0.2));
  }
}
