// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/output/draw.rs - 骨架与判定结果可视化
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

use std::{collections::HashMap, path::Path};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut},
  rect::Rect,
};
use tracing::{debug, warn};

use crate::{
  evaluator::{DEFAULT_MIN_VISIBILITY, FeedbackReport, Outcome},
  frame::Frame,
  landmark::{LandmarkSet, POSE_CONNECTIONS},
  model::Assessment,
  utils::query_parse,
};

/// 泰文文案需要带泰文字形的字体
pub const DEFAULT_FONT_PATH: &str = "fonts/THSarabun.ttf";

const FONT_SIZE: f32 = 32.0;
const LINE_ORIGIN_X: i32 = 10;
const LINE_ORIGIN_Y: i32 = 30;
const LINE_SPACING: i32 = 40;
const MARKER_SIZE: u32 = 24;
const MARKER_GAP: i32 = 8;
const JOINT_RADIUS: i32 = 4;

const JOINT_COLOR: [u8; 3] = [0, 255, 0];
const BONE_COLOR: [u8; 3] = [255, 0, 0];
const PASS_COLOR: [u8; 3] = [0, 200, 0];
const FAIL_COLOR: [u8; 3] = [220, 0, 0];
const INDETERMINATE_COLOR: [u8; 3] = [255, 191, 0];

pub fn outcome_color(outcome: Outcome) -> Rgb<u8> {
  Rgb(match outcome {
    Outcome::Pass => PASS_COLOR,
    Outcome::Fail => FAIL_COLOR,
    Outcome::Indeterminate => INDETERMINATE_COLOR,
  })
}

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  min_visibility: f32,
}

impl Default for Draw {
  fn default() -> Self {
    Self::with_font_path(DEFAULT_FONT_PATH)
  }
}

impl Draw {
  /// 字体加载失败时只画骨架和标记，不画文字
  pub fn with_font_path<P: AsRef<Path>>(path: P) -> Self {
    let path = path.as_ref();
    let font = match std::fs::read(path) {
      Ok(data) => match FontVec::try_from_vec(data) {
        Ok(font) => {
          debug!("加载字体: {}", path.display());
          Some(font)
        }
        Err(e) => {
          warn!("字体文件 {} 无效，跳过文字绘制: {}", path.display(), e);
          None
        }
      },
      Err(e) => {
        warn!("无法读取字体文件 {}，跳过文字绘制: {}", path.display(), e);
        None
      }
    };

    Self {
      font,
      font_size: FONT_SIZE,
      min_visibility: DEFAULT_MIN_VISIBILITY,
    }
  }

  /// 读取输出 URL 中的 `font` 与 `min_visibility` 参数。
  /// 未给出 `min_visibility` 时沿用评估器的可见度下限。
  pub fn from_query(query: &HashMap<String, String>, min_visibility: f32) -> Self {
    let path = query
      .get("font")
      .map(String::as_str)
      .unwrap_or(DEFAULT_FONT_PATH);
    Self::with_font_path(path).with_min_visibility(query_parse(
      query,
      "min_visibility",
      min_visibility,
    ))
  }

  pub fn with_min_visibility(mut self, min_visibility: f32) -> Self {
    self.min_visibility = min_visibility;
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn draw_skeleton(&self, image: &mut RgbImage, landmarks: &LandmarkSet) {
    let (w, h) = image.dimensions();

    for (from, to) in POSE_CONNECTIONS.iter() {
      let (Some(a), Some(b)) = (
        landmarks.visible(*from, self.min_visibility),
        landmarks.visible(*to, self.min_visibility),
      ) else {
        continue;
      };
      let (start, end) = (a.to_pixel(w, h), b.to_pixel(w, h));
      // 两像素宽
      draw_line_segment_mut(image, start, end, Rgb(BONE_COLOR));
      draw_line_segment_mut(
        image,
        (start.0, start.1 + 1.0),
        (end.0, end.1 + 1.0),
        Rgb(BONE_COLOR),
      );
    }

    for (_, landmark) in landmarks.iter() {
      if !landmark.is_visible(self.min_visibility) {
        continue;
      }
      let (x, y) = landmark.to_pixel(w, h);
      draw_filled_circle_mut(
        image,
        (x.round() as i32, y.round() as i32),
        JOINT_RADIUS,
        Rgb(JOINT_COLOR),
      );
    }
  }

  /// 每条判定一行，行首为结论色块，随后是文案
  pub fn draw_report(&self, image: &mut RgbImage, report: &FeedbackReport) {
    let scale = PxScale::from(self.font_size);
    for (i, item) in report.iter().enumerate() {
      let y = LINE_ORIGIN_Y + LINE_SPACING * i as i32;
      let color = outcome_color(item.outcome);

      let marker = Rect::at(LINE_ORIGIN_X, y).of_size(MARKER_SIZE, MARKER_SIZE);
      draw_filled_rect_mut(image, marker, color);

      if let Some(font) = &self.font {
        let x = LINE_ORIGIN_X + MARKER_SIZE as i32 + MARKER_GAP;
        draw_text_mut(image, color, x, y, scale, font, item.text);
      }
    }
  }

  pub fn draw_assessment(&self, frame: &Frame, assessment: &Assessment) -> RgbImage {
    let mut image = frame.image.clone();
    if let Some(landmarks) = &assessment.landmarks {
      self.draw_skeleton(&mut image, landmarks);
    }
    self.draw_report(&mut image, &assessment.report);
    image
  }
}
