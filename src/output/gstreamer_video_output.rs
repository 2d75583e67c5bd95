// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频输出
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

//! # GStreamer 视频输出
//!
//! 将标注后的帧送入窗口显示或编码为视频文件。
//!
//! ## URL 格式
//!
//! - 窗口显示: `gst://display?width=640&height=480&fps=15`
//! - 视频文件: `gst://file/path/to/output.mp4?width=1280&height=720&fps=30`
//!
//! 文件格式按扩展名选择：
//!
//! - **MP4** (H.264)
//! - **MKV** (Matroska, H.264)
//! - **AVI** (H.264)
//! - **WebM** (VP8)
//!
//! 其余扩展名按 MP4 处理。`font` 参数指定文字字体。
//!
//! ```no_run
//! use chestpa::{FromUrl, output::GStreamerVideoOutput};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("gst://file/tmp/session.mp4?width=1280&height=720&fps=30")?;
//! let output = GStreamerVideoOutput::from_url(&url)?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  evaluator::DEFAULT_MIN_VISIBILITY,
  frame::Frame,
  model::Assessment,
  output::{Render, draw::Draw},
  utils::{query_map, query_parse},
};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;

#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Buffer creation error")]
  BufferCreationError,
  #[error("Frame size {actual:?} does not match output size {expected:?}")]
  FrameSizeMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

#[derive(Debug, Clone, PartialEq)]
pub enum VideoSink {
  Display,
  File(String),
}

impl VideoSink {
  fn to_pipeline(&self) -> String {
    match self {
      VideoSink::Display => "videoconvert ! autovideosink sync=false".to_string(),
      VideoSink::File(path) => {
        let extension = Path::new(path)
          .extension()
          .and_then(|e| e.to_str())
          .map(str::to_ascii_lowercase);
        let encoder = match extension.as_deref() {
          Some("mkv") => {
            "videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux"
          }
          Some("avi") => "videoconvert ! video/x-raw,format=I420 ! x264enc ! avimux",
          Some("webm") => "videoconvert ! vp8enc ! webmmux",
          _ => {
            "videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
          }
        };
        format!("{} ! filesink location={}", encoder, path)
      }
    }
  }
}

/// 视频输出管道构建器
#[derive(Debug, Clone, PartialEq)]
pub struct GStreamerVideoOutputBuilder {
  sink: VideoSink,
  width: u32,
  height: u32,
  fps: u32,
}

impl FromUrlWithScheme for GStreamerVideoOutputBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerVideoOutputBuilder {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    let sink = match url.host_str() {
      Some("display") => VideoSink::Display,
      Some("file") => VideoSink::File(url.path().to_string()),
      _ => return Err(GStreamerVideoOutputError::SchemeMismatch),
    };

    let query = query_map(url);
    Ok(Self {
      sink,
      width: query_parse(&query, "width", DEFAULT_WIDTH),
      height: query_parse(&query, "height", DEFAULT_HEIGHT),
      fps: query_parse(&query, "fps", DEFAULT_FPS).max(1),
    })
  }
}

impl GStreamerVideoOutputBuilder {
  pub fn new(sink: VideoSink, width: u32, height: u32, fps: u32) -> Self {
    Self {
      sink,
      width,
      height,
      fps: fps.max(1),
    }
  }

  pub fn description(&self) -> String {
    format!("appsrc name=src ! {}", self.sink.to_pipeline())
  }

  pub fn build(self, draw: Draw) -> Result<GStreamerVideoOutput, GStreamerVideoOutputError> {
    gst::init()?;

    let description = self.description();
    info!("创建视频输出管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", self.width as i32)
      .field("height", self.height as i32)
      .field("framerate", gst::Fraction::new(self.fps as i32, 1))
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;
    info!(
      "视频输出就绪: {}x{} @ {} fps",
      self.width, self.height, self.fps
    );

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      size: (self.width, self.height),
      fps: self.fps as u64,
      frame_count: Mutex::new(0),
      draw,
    })
  }
}

pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  size: (u32, u32),
  fps: u64,
  frame_count: Mutex<u64>,
  draw: Draw,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with_visibility(url, DEFAULT_MIN_VISIBILITY)
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    // 文件容器需要 EOS 才能正确收尾
    if let Err(e) = self.appsrc.end_of_stream() {
      warn!("Failed to send EOS to video output: {:?}", e);
    }
    std::thread::sleep(std::time::Duration::from_millis(100));

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }

    let frame_count = self
      .frame_count
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    info!("视频输出关闭，共写入 {} 帧", *frame_count);
  }
}

impl GStreamerVideoOutput {
  /// `min_visibility` 为绘制骨架的默认可见度下限，URL 中的同名参数优先
  pub fn from_url_with_visibility(
    url: &Url,
    min_visibility: f32,
  ) -> Result<Self, GStreamerVideoOutputError> {
    let draw = Draw::from_query(&query_map(url), min_visibility);
    GStreamerVideoOutputBuilder::from_url(url)?.build(draw)
  }

  fn push_frame(&self, data: &[u8]) -> Result<(), GStreamerVideoOutputError> {
    let mut buffer = gst::Buffer::with_size(data.len())
      .map_err(|_| GStreamerVideoOutputError::BufferCreationError)?;

    let mut frame_count = self
      .frame_count
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    let timestamp = (*frame_count * 1_000_000_000) / self.fps;
    *frame_count += 1;

    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(timestamp));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(1_000_000_000 / self.fps));
      let mut buffer_map = buffer_ref.map_writable().map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to map buffer".to_string())
      })?;
      buffer_map.copy_from_slice(data);
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;

    Ok(())
  }
}

impl Render<Frame, Assessment> for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn render_result(&self, frame: &Frame, result: &Assessment) -> Result<(), Self::Error> {
    let actual = (frame.width(), frame.height());
    if actual != self.size {
      return Err(GStreamerVideoOutputError::FrameSizeMismatch {
        expected: self.size,
        actual,
      });
    }
    let image = self.draw.draw_assessment(frame, result);
    self.push_frame(image.as_raw())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_url_uses_autovideosink() {
    let url = Url::parse("gst://display?width=1280&height=720").unwrap();
    let builder = GStreamerVideoOutputBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder,
      GStreamerVideoOutputBuilder::new(VideoSink::Display, 1280, 720, DEFAULT_FPS)
    );
    assert_eq!(
      builder.description(),
      "appsrc name=src ! videoconvert ! autovideosink sync=false"
    );
  }

  #[test]
  fn file_encoder_follows_extension() {
    let webm = GStreamerVideoOutputBuilder::new(
      VideoSink::File("/tmp/session.webm".to_string()),
      640,
      480,
      15,
    );
    assert!(webm.description().contains("vp8enc ! webmmux"));
    assert!(
      webm
        .description()
        .ends_with("filesink location=/tmp/session.webm")
    );

    let url = Url::parse("gst://file/tmp/session.unknown").unwrap();
    let fallback = GStreamerVideoOutputBuilder::from_url(&url).unwrap();
    assert!(fallback.description().contains("mp4mux"));
  }

  #[test]
  fn unknown_host_is_rejected() {
    let url = Url::parse("gst://rtsp/stream").unwrap();
    assert!(matches!(
      GStreamerVideoOutputBuilder::from_url(&url),
      Err(GStreamerVideoOutputError::SchemeMismatch)
    ));
  }
}
