// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/evaluator/messages.rs - 反馈文案
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

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Criterion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
  #[default]
  Thai,
  English,
}

#[derive(Error, Debug)]
#[error("不支持的语言: {0}")]
pub struct UnknownLocale(String);

impl FromStr for Locale {
  type Err = UnknownLocale;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "th" | "thai" => Ok(Locale::Thai),
      "en" | "english" => Ok(Locale::English),
      _ => Err(UnknownLocale(s.to_string())),
    }
  }
}

/// 判定结论的细分，用于挑选文案
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Note {
  Passed,
  Failed,
  FailedLeft,
  FailedRight,
  Unseen,
}

pub(crate) fn text(locale: Locale, criterion: Criterion, note: Note) -> &'static str {
  match locale {
    Locale::Thai => thai(criterion, note),
    Locale::English => english(criterion, note),
  }
}

fn thai(criterion: Criterion, note: Note) -> &'static str {
  use Criterion::*;
  use Note::*;
  match (criterion, note) {
    (ShoulderLevel, Passed) => "ไหล่เท่ากัน",
    (ShoulderLevel, Unseen) => "มองไม่เห็นไหล่ทั้งสองข้าง",
    (ShoulderLevel, _) => "ไหล่ไม่เท่ากัน",
    (HeadCentered, Passed) => "ศีรษะอยู่ตรงกลาง",
    (HeadCentered, Unseen) => "มองไม่เห็นศีรษะหรือไหล่",
    (HeadCentered, _) => "ศีรษะไม่อยู่ตรงกลาง",
    (HandsOnHips, Passed) => "วางมือบริเวณสะโพก",
    (HandsOnHips, FailedLeft) => "กรุณาวางมือซ้ายบริเวณสะโพก",
    (HandsOnHips, FailedRight) => "กรุณาวางมือขวาบริเวณสะโพก",
    (HandsOnHips, Unseen) => "มองไม่เห็นมือหรือสะโพก",
    (HandsOnHips, _) => "กรุณาวางมือทั้งสองข้างบริเวณสะโพก",
    (ShoulderRoll, Passed) => "โน้มไหล่ไปด้านหน้า",
    (ShoulderRoll, Unseen) => "ประเมินการโน้มไหล่ไม่ได้",
    (ShoulderRoll, _) => "กรุณาโน้มไหล่ไปด้านหน้า",
    (PoseDetected, Passed) => "ตรวจพบท่าทาง",
    (PoseDetected, _) => "ไม่พบการตรวจจับท่าทาง",
  }
}

fn english(criterion: Criterion, note: Note) -> &'static str {
  use Criterion::*;
  use Note::*;
  match (criterion, note) {
    (ShoulderLevel, Passed) => "shoulders level",
    (ShoulderLevel, Unseen) => "shoulders not visible",
    (ShoulderLevel, _) => "shoulders uneven",
    (HeadCentered, Passed) => "head centered",
    (HeadCentered, Unseen) => "head or shoulders not visible",
    (HeadCentered, _) => "head off center",
    (HandsOnHips, Passed) => "hands on hips",
    (HandsOnHips, FailedLeft) => "left hand not on hip",
    (HandsOnHips, FailedRight) => "right hand not on hip",
    (HandsOnHips, Unseen) => "hands or hips not visible",
    (HandsOnHips, _) => "hands not on hips",
    (ShoulderRoll, Passed) => "shoulders rolled forward",
    (ShoulderRoll, Unseen) => "shoulder roll not measurable",
    (ShoulderRoll, _) => "roll shoulders forward",
    (PoseDetected, Passed) => "pose detected",
    (PoseDetected, _) => "no pose detected",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn locale_parses_codes() {
    assert_eq!("th".parse::<Locale>().unwrap(), Locale::Thai);
    assert_eq!("EN".parse::<Locale>().unwrap(), Locale::English);
    assert!("fr".parse::<Locale>().is_err());
  }

  #[test]
  fn hand_failures_name_the_side() {
    let left = text(Locale::English, Criterion::HandsOnHips, Note::FailedLeft);
    let right = text(Locale::English, Criterion::HandsOnHips, Note::FailedRight);
    assert!(left.contains("left"));
    assert!(right.contains("right"));
  }
}
