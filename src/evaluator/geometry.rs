// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/evaluator/geometry.rs - 几何辅助函数
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

use crate::landmark::Landmark;

pub(crate) fn horizontal_span(a: &Landmark, b: &Landmark) -> f32 {
  (a.x - b.x).abs()
}

pub(crate) fn vertical_span(a: &Landmark, b: &Landmark) -> f32 {
  (a.y - b.y).abs()
}

/// 图像平面内的欧氏距离，忽略 z
pub(crate) fn distance(a: &Landmark, b: &Landmark) -> f32 {
  (a.x - b.x).hypot(a.y - b.y)
}

pub(crate) fn mid_x(a: &Landmark, b: &Landmark) -> f32 {
  (a.x + b.x) / 2.0
}

/// 归一化比值；分母退化（例如侧身）时无法判定
pub(crate) fn ratio(numerator: f32, denominator: f32) -> Option<f32> {
  if denominator <= f32::EPSILON || !denominator.is_finite() {
    return None;
  }
  let value = numerator / denominator;
  value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ratio_rejects_degenerate_denominator() {
    assert_eq!(ratio(0.1, 0.0), None);
    assert_eq!(ratio(0.1, f32::EPSILON / 2.0), None);
    assert_eq!(ratio(0.1, 0.2), Some(0.5));
  }

  #[test]
  fn distance_ignores_depth() {
    let a = Landmark::new(0.0, 0.0, 1.0).with_depth(5.0);
    let b = Landmark::new(0.3, 0.4, 1.0);
    assert!((distance(&a, &b) - 0.5).abs() < 1e-6);
  }
}
