// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/frame.rs - 视频帧定义
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

use image::{RgbImage, imageops};

/// 一帧 RGB 图像及其序号、采集时间
#[derive(Debug, Clone)]
pub struct Frame {
  /// 从 0 开始的帧序号
  pub index: usize,
  /// 相对采集开始的毫秒数
  pub timestamp_ms: u64,
  pub image: RgbImage,
}

impl Frame {
  pub fn new(index: usize, timestamp_ms: u64, image: RgbImage) -> Self {
    Self {
      index,
      timestamp_ms,
      image,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 水平翻转，去除前置摄像头的镜像效果
  pub fn mirrored(mut self) -> Self {
    imageops::flip_horizontal_in_place(&mut self.image);
    self
  }

  pub(crate) fn mirror_if(self, mirror: bool) -> Self {
    if mirror { self.mirrored() } else { self }
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Frame::new(0, 0, image)
  }
}
