// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入
//!
//! 摄像头或视频文件经 GStreamer 解码为 RGB 帧。
//!
//! ## URL 格式
//!
//! - 摄像头: `gst://camera/dev/video0?width=640&height=480&fps=15&format=YUY2`
//! - 视频文件: `gst://file/path/to/video.mp4?rotate=90&mirror`
//!
//! `mirror` 在管道内做水平翻转，`rotate` 取 0/90/180/270。
//! 摄像头默认镜像，画面与受检者所见一致，`mirror=false` 关闭；视频文件默认不镜像。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::collections::HashMap;
use std::time::Instant;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  utils::{query_flag_or, query_map, query_parse},
};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 15;

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineItem {
  FileSource(String),
  CameraSource {
    device: String,
    format: Option<String>,
    width: u32,
    height: u32,
    fps: u32,
  },
  Rotate(u32),
  Mirror,
  RgbOutput,
}

impl PipelineItem {
  fn to_pipeline(&self) -> String {
    match self {
      PipelineItem::FileSource(path) => format!("filesrc location={} ! decodebin", path),
      PipelineItem::CameraSource {
        device,
        format,
        width,
        height,
        fps,
      } => {
        let format = format
          .as_ref()
          .map(|f| format!(",format={}", f))
          .unwrap_or_default();
        format!(
          "v4l2src device={} ! video/x-raw{},width={},height={},framerate={}/1",
          device, format, width, height, fps
        )
      }
      PipelineItem::Rotate(degrees) => {
        let method = match degrees {
          90 => "clockwise",
          180 => "rotate-180",
          270 => "counterclockwise",
          _ => "none",
        };
        format!("videoflip method={}", method)
      }
      PipelineItem::Mirror => "videoflip method=horizontal-flip".to_string(),
      PipelineItem::RgbOutput => "videoconvert ! video/x-raw,format=RGB".to_string(),
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<PipelineItem>,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl GStreamerInputPipelineBuilder {
  pub fn camera(device: &str, width: u32, height: u32, fps: u32) -> Self {
    Self {
      items: vec![PipelineItem::CameraSource {
        device: device.to_string(),
        format: None,
        width,
        height,
        fps,
      }],
    }
  }

  pub fn file(path: &str) -> Self {
    Self {
      items: vec![PipelineItem::FileSource(path.to_string())],
    }
  }

  pub fn mirror(mut self) -> Self {
    self.items.push(PipelineItem::Mirror);
    self
  }

  pub fn rotate(mut self, degrees: u32) -> Self {
    if degrees % 360 != 0 {
      self.items.push(PipelineItem::Rotate(degrees % 360));
    }
    self
  }

  pub fn items(&self) -> &[PipelineItem] {
    &self.items
  }

  /// 完整的管道描述，末端固定为 RGB appsink
  pub fn description(&self) -> String {
    let mut parts: Vec<String> = self.items.iter().map(PipelineItem::to_pipeline).collect();
    parts.push(PipelineItem::RgbOutput.to_pipeline());
    parts.push("appsink max-buffers=2 drop=true name=sink".to_string());
    parts.join(" ! ")
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let description = self.description();
    info!("GStreamer 输入管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      index: 0,
      started: Instant::now(),
    })
  }
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = query_map(url);

    let (builder, mirror_default) = match url.host_str() {
      Some("camera") => {
        let mut builder = Self::camera(
          url.path(),
          query_parse(&query, "width", DEFAULT_WIDTH),
          query_parse(&query, "height", DEFAULT_HEIGHT),
          query_parse(&query, "fps", DEFAULT_FPS),
        );
        if let Some(PipelineItem::CameraSource { format, .. }) = builder.items.first_mut() {
          *format = query.get("format").cloned();
        }
        (builder, true)
      }
      Some("file") => (Self::file(url.path()), false),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    };

    let builder = builder.rotate(query_parse(&query, "rotate", 0));
    Ok(if query_flag_or(url, "mirror", mirror_default) {
      builder.mirror()
    } else {
      builder
    })
  }
}

/// GStreamer 视频输入，迭代产生 RGB 帧
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  index: usize,
  started: Instant,
}

impl FromUrlWithScheme for GStreamerInput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInput {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    GStreamerInputPipelineBuilder::from_url(url)?.build()
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  fn pull_sample(&self) -> Option<gst::Sample> {
    self
      .appsink
      .pull_sample()
      .map_err(|e| {
        error!("Failed to pull sample: {}", e);
        e
      })
      .ok()
  }
}

impl Iterator for GStreamerInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = self.pull_sample()?;
    let image = convert_sample_to_rgb(&sample)
      .map_err(|e| {
        error!("Failed to fetch sample: {}", e);
        e
      })
      .ok()?;
    let frame = Frame::new(
      self.index,
      self.started.elapsed().as_millis() as u64,
      image,
    );
    self.index += 1;
    Some(frame)
  }
}

fn convert_sample_to_rgb(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat(video_info.format()));
  }

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  // 行尾可能有对齐填充
  let expected = stride * height.saturating_sub(1) + width * 3;
  if height == 0 || data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(width * height * 3);
  for row in data.chunks(stride).take(height) {
    pixels.extend_from_slice(&row[..width * 3]);
  }

  RgbImage::from_raw(width as u32, height as u32, pixels).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: width * height * 3,
      actual: data.len(),
    },
  )
}
