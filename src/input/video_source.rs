// 该文件是 Fuguang （浮光） 项目的一部分。
// src/input/video_source.rs - 视频文件片段输入
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

//! # 视频文件输入
//!
//! 通过 GStreamer 解码视频文件，播放到结尾后回到开头继续。
//!
//! 使用前需要安装 GStreamer 开发库，例如 Ubuntu/Debian 上：
//!
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! URL 形式为 `video:///path/to/clip.mp4?fps=30`。

use std::path::PathBuf;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{FrameSource, InputError};
use crate::{FromUrl, FromUrlWithScheme, frame::resize_cover_crop, url_file_path};

fn capture_error(e: impl std::fmt::Display) -> InputError {
  InputError::CaptureError(e.to_string())
}

/// 运行中的解码管道，析构时停止
struct VideoStream {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl Drop for VideoStream {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl VideoStream {
  fn open(path: &str) -> Result<Self, InputError> {
    gst::init().map_err(capture_error)?;

    let description = format!(
      "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
       appsink max-buffers=2 drop=true name=sink",
      path
    );
    info!("GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(&description)
      .map_err(capture_error)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| capture_error("无法创建管道"))?;
    let appsink = pipeline
      .by_name("sink")
      .ok_or_else(|| capture_error("找不到 appsink"))?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| capture_error("无法转换为 appsink"))?;

    pipeline
      .set_state(gst::State::Playing)
      .map_err(capture_error)?;
    Ok(Self { pipeline, appsink })
  }

  /// 取下一帧，到达结尾时回到开头
  fn pull(&self) -> Result<RgbImage, InputError> {
    let sample = match self.appsink.pull_sample() {
      Ok(sample) => sample,
      Err(_) if self.appsink.is_eos() => {
        debug!("视频播放结束，回到开头");
        self
          .pipeline
          .seek_simple(
            gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
            gst::ClockTime::ZERO,
          )
          .map_err(capture_error)?;
        self.appsink.pull_sample().map_err(|e| {
          error!("回到开头后取帧失败: {}", e);
          capture_error(e)
        })?
      }
      Err(e) => return Err(capture_error(e)),
    };
    sample_to_image(&sample)
  }
}

fn sample_to_image(sample: &gst::Sample) -> Result<RgbImage, InputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| capture_error("样本中没有缓冲区"))?;
  let caps = sample
    .caps()
    .ok_or_else(|| capture_error("样本中没有 caps"))?;
  let info = gst_video::VideoInfo::from_caps(caps).map_err(capture_error)?;

  let bgr = match info.format() {
    gst_video::VideoFormat::Rgb => false,
    gst_video::VideoFormat::Bgr => true,
    format => return Err(capture_error(format!("不支持的视频格式: {:?}", format))),
  };
  let stride = info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(capture_error)?;
  pack_rows(map.as_slice(), info.width(), info.height(), stride, bgr)
}

/// 把带行跨度的 RGB/BGR 数据整理成紧密排列的 RGB 图像
fn pack_rows(
  data: &[u8],
  width: u32,
  height: u32,
  stride: usize,
  bgr: bool,
) -> Result<RgbImage, InputError> {
  let row = width as usize * 3;
  let expected = match height as usize {
    0 => 0,
    h => stride * (h - 1) + row,
  };
  if stride < row || data.len() < expected {
    return Err(capture_error(format!(
      "缓冲区大小不匹配: 期望 {} 字节，实际 {} 字节",
      expected,
      data.len()
    )));
  }

  let mut pixels = Vec::with_capacity(row * height as usize);
  for y in 0..height as usize {
    let line = &data[y * stride..y * stride + row];
    if bgr {
      for px in line.chunks_exact(3) {
        pixels.extend_from_slice(&[px[2], px[1], px[0]]);
      }
    } else {
      pixels.extend_from_slice(line);
    }
  }
  RgbImage::from_raw(width, height, pixels).ok_or_else(|| capture_error("无法构造图像"))
}

/// 视频文件片段，循环播放
pub struct VideoClipSource {
  path: PathBuf,
  fps: Option<u32>,
  stream: Option<VideoStream>,
  current: Option<RgbImage>,
}

impl FromUrlWithScheme for VideoClipSource {
  const SCHEME: &'static str = "video";
}

impl FromUrl for VideoClipSource {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let fps = url
      .query_pairs()
      .find(|(k, _)| k == "fps")
      .and_then(|(_, v)| v.parse::<u32>().ok());

    Ok(Self::new(url_file_path(url)).with_frame_rate(fps))
  }
}

impl VideoClipSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      fps: None,
      stream: None,
      current: None,
    }
  }

  pub fn with_frame_rate(mut self, fps: Option<u32>) -> Self {
    self.fps = fps;
    self
  }
}

impl FrameSource for VideoClipSource {
  fn start(&mut self) -> Result<(), InputError> {
    if !self.path.is_file() {
      return Err(InputError::ClipUnset(self.path.display().to_string()));
    }
    self.stream = Some(VideoStream::open(&self.path.display().to_string())?);
    self.current = None;
    info!("视频片段 {} 已启动", self.path.display());
    Ok(())
  }

  fn stop(&mut self) {
    if self.stream.take().is_some() {
      self.current = None;
      info!("视频片段 {} 已停止", self.path.display());
    }
  }

  fn raw_frame(&mut self) -> Result<RgbImage, InputError> {
    let stream = self.stream.as_ref().ok_or(InputError::NotStarted)?;
    let image = stream.pull()?;
    self.current = Some(image.clone());
    Ok(image)
  }

  fn processed_frame(&mut self, width: u32, height: u32) -> Result<RgbImage, InputError> {
    if self.stream.is_none() {
      return Err(InputError::NotStarted);
    }
    let image = match &self.current {
      Some(image) => resize_cover_crop(image, width, height),
      None => {
        let image = self.raw_frame()?;
        resize_cover_crop(&image, width, height)
      }
    };
    Ok(image)
  }

  fn frame_rate(&self) -> Option<u32> {
    self.fps
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn test_pack_rows_skips_padding() {
    // 2x2 RGB，每行末尾 2 字节填充
    let data = [
      1, 2, 3, 4, 5, 6, 0, 0, //
      7, 8, 9, 10, 11, 12, 0, 0,
    ];
    let image = pack_rows(&data, 2, 2, 8, false).unwrap();
    assert_eq!(*image.get_pixel(1, 0), Rgb([4, 5, 6]));
    assert_eq!(*image.get_pixel(0, 1), Rgb([7, 8, 9]));
  }

  #[test]
  fn test_pack_rows_swaps_bgr() {
    let image = pack_rows(&[30, 20, 10], 1, 1, 3, true).unwrap();
    assert_eq!(*image.get_pixel(0, 0), Rgb([10, 20, 30]));
  }

  #[test]
  fn test_pack_rows_short_buffer() {
    assert!(matches!(
      pack_rows(&[0; 10], 2, 2, 8, false),
      Err(InputError::CaptureError(_))
    ));
  }

  #[test]
  fn test_from_url() {
    let url = Url::parse("video:///tmp/clip.mp4?fps=25").unwrap();
    let source = VideoClipSource::from_url(&url).unwrap();
    assert_eq!(source.frame_rate(), Some(25));
    assert_eq!(source.path, PathBuf::from("/tmp/clip.mp4"));

    let url = Url::parse("clip:///tmp/clip.mp4").unwrap();
    assert!(matches!(
      VideoClipSource::from_url(&url),
      Err(InputError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn test_missing_file_and_not_started() {
    let mut source = VideoClipSource::new("/nonexistent/clip.mp4");
    assert!(matches!(source.start(), Err(InputError::ClipUnset(_))));
    source.stop();
    assert!(matches!(source.raw_frame(), Err(InputError::NotStarted)));
    assert!(matches!(
      source.processed_frame(4, 4),
      Err(InputError::NotStarted)
    ));
  }
}
