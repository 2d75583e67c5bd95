// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, utils::query_flag};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

fn load_rgb(path: &Path) -> Result<RgbImage, ImageFileInputError> {
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  Ok(image.to_rgb8())
}

/// 单张图片输入，只产生一帧
///
/// 文件输入默认不镜像，`?mirror` 开启水平翻转。
pub struct ImageFileInput {
  image: Option<RgbImage>,
  mirror: bool,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let image = load_rgb(Path::new(url.path()))?;
    info!(
      "读取图像 {}: {}x{}",
      url.path(),
      image.width(),
      image.height()
    );

    Ok(ImageFileInput {
      image: Some(image),
      mirror: query_flag(url, "mirror"),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let mirror = self.mirror;
    self
      .image
      .take()
      .map(|image| Frame::new(0, 0, image).mirror_if(mirror))
  }
}

/// 目录输入，按文件名顺序逐张读取
///
/// 帧序号等于文件在排序后列表中的位置；无法读取的文件被跳过，但仍占用一个序号，
/// 这样按帧序号回放的关键点录制与文件一一对应。
pub struct FolderInput {
  paths: std::iter::Enumerate<std::vec::IntoIter<PathBuf>>,
  started: Instant,
  mirror: bool,
}

impl FromUrlWithScheme for FolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for FolderInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(url.path())? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
      if path.is_file() && is_image {
        paths.push(path);
      }
    }
    paths.sort();

    if paths.is_empty() {
      warn!("目录 {} 中没有可读取的图像", url.path());
    } else {
      info!("目录 {} 中共有 {} 张图像", url.path(), paths.len());
    }

    Ok(FolderInput {
      paths: paths.into_iter().enumerate(),
      started: Instant::now(),
      mirror: query_flag(url, "mirror"),
    })
  }
}

impl Iterator for FolderInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    for (index, path) in self.paths.by_ref() {
      match load_rgb(&path) {
        Ok(image) => {
          debug!("读取图像 #{}: {}", index, path.display());
          let frame = Frame::new(index, self.started.elapsed().as_millis() as u64, image);
          return Some(frame.mirror_if(self.mirror));
        }
        Err(e) => {
          warn!("跳过无法读取的图像 {}: {}", path.display(), e);
        }
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn write_png(path: &Path, colour: [u8; 3]) {
    RgbImage::from_pixel(4, 3, Rgb(colour)).save(path).unwrap();
  }

  #[test]
  fn image_file_yields_single_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    write_png(&path, [10, 20, 30]);

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    let frame = input.next().unwrap();
    assert_eq!((frame.width(), frame.height()), (4, 3));
    assert_eq!(frame.image.get_pixel(0, 0), &Rgb([10, 20, 30]));
    assert!(input.next().is_none());
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("folder:///tmp").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }

  #[test]
  fn folder_reads_sorted_images_and_skips_others() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("b.png"), [2, 2, 2]);
    write_png(&dir.path().join("a.png"), [1, 1, 1]);
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
    std::fs::write(dir.path().join("c.png"), "broken").unwrap();

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let frames: Vec<Frame> = FolderInput::from_url(&url).unwrap().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].image.get_pixel(0, 0), &Rgb([1, 1, 1]));
    assert_eq!(frames[1].image.get_pixel(0, 0), &Rgb([2, 2, 2]));
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[1].index, 1);
  }

  #[test]
  fn unreadable_file_still_consumes_its_index() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("a.png"), [1, 1, 1]);
    std::fs::write(dir.path().join("b.png"), "broken").unwrap();
    write_png(&dir.path().join("c.png"), [3, 3, 3]);

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let frames: Vec<Frame> = FolderInput::from_url(&url).unwrap().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[1].index, 2);
    assert_eq!(frames[1].image.get_pixel(0, 0), &Rgb([3, 3, 3]));
  }

  #[test]
  fn file_inputs_mirror_only_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([9, 9, 9]));
    image.save(&path).unwrap();

    let plain = Url::parse(&format!("image://{}", path.display())).unwrap();
    let frame = ImageFileInput::from_url(&plain).unwrap().next().unwrap();
    assert_eq!(frame.image.get_pixel(0, 0), &Rgb([9, 9, 9]));

    let mirrored = Url::parse(&format!("image://{}?mirror", path.display())).unwrap();
    let frame = ImageFileInput::from_url(&mirrored).unwrap().next().unwrap();
    assert_eq!(frame.image.get_pixel(1, 0), &Rgb([9, 9, 9]));
  }
}
