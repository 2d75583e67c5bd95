// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/evaluator/fixtures.rs - 测试用标准体位
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

use crate::landmark::{BodyLandmark, Landmark, LandmarkSet};

fn point(x: f32, y: f32, z: f32) -> Landmark {
  Landmark::new(x, y, 0.95).with_depth(z)
}

/// 标准 Chest PA 体位：肩宽 0.3、髋宽 0.2，两肩比两髋靠前 0.2
pub(crate) fn ideal_pose() -> LandmarkSet {
  use BodyLandmark::*;
  LandmarkSet::new()
    .with(Nose, point(0.5, 0.15, -0.25))
    .with(LeftShoulder, point(0.65, 0.3, -0.2))
    .with(RightShoulder, point(0.35, 0.3, -0.2))
    .with(LeftElbow, point(0.70, 0.45, -0.1))
    .with(RightElbow, point(0.26, 0.45, -0.1))
    .with(LeftWrist, point(0.62, 0.58, -0.05))
    .with(RightWrist, point(0.38, 0.58, -0.05))
    .with(LeftHip, point(0.6, 0.6, 0.0))
    .with(RightHip, point(0.4, 0.6, 0.0))
}

/// 以画面中心 (0.5, 0.5, 0) 为原点缩放后再平移
pub(crate) fn transform(set: &LandmarkSet, scale: f32, offset: (f32, f32, f32)) -> LandmarkSet {
  let (dx, dy, dz) = offset;
  set.map_points(|p| Landmark {
    x: 0.5 + (p.x - 0.5) * scale + dx,
    y: 0.5 + (p.y - 0.5) * scale + dy,
    z: p.z.map(|z| z * scale + dz),
    visibility: p.visibility,
  })
}
