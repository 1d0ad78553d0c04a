// 该文件是 Fuguang （浮光） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use image::RgbImage;
use thiserror::Error;

use crate::FromUrl;

/// 帧来源
///
/// `raw_frame` 取下一帧原始分辨率图像并作为当前帧；
/// `processed_frame` 把当前帧缩放裁剪到模型输入尺寸，尚无当前帧时先取一帧。
pub trait FrameSource {
  fn start(&mut self) -> Result<(), InputError>;

  /// 未启动时调用无效果
  fn stop(&mut self);

  fn raw_frame(&mut self) -> Result<RgbImage, InputError>;

  fn processed_frame(&mut self, width: u32, height: u32) -> Result<RgbImage, InputError>;

  /// 来源自带的帧率，没有则为 `None`
  fn frame_rate(&self) -> Option<u32> {
    None
  }
}

impl<T: FrameSource + ?Sized> FrameSource for &mut T {
  fn start(&mut self) -> Result<(), InputError> {
    (**self).start()
  }

  fn stop(&mut self) {
    (**self).stop()
  }

  fn raw_frame(&mut self) -> Result<RgbImage, InputError> {
    (**self).raw_frame()
  }

  fn processed_frame(&mut self, width: u32, height: u32) -> Result<RgbImage, InputError> {
    (**self).processed_frame(width, height)
  }

  fn frame_rate(&self) -> Option<u32> {
    (**self).frame_rate()
  }
}

#[cfg(feature = "clip_input")]
mod clip_source;
#[cfg(feature = "clip_input")]
pub use self::clip_source::ClipSource;

#[cfg(feature = "video_input")]
mod video_source;
#[cfg(feature = "video_input")]
pub use self::video_source::VideoClipSource;

#[cfg(feature = "v4l2_input")]
mod v4l2_source;
#[cfg(feature = "v4l2_input")]
pub use self::v4l2_source::CameraSource;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("片段路径中没有可用的帧: {0}")]
  ClipUnset(String),
  #[error("无法打开设备 {0}: {1}")]
  DeviceUnavailable(String, String),
  #[error("采集失败: {0}")]
  CaptureError(String),
  #[error("输入源尚未启动")]
  NotStarted,
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageError(#[from] image::ImageError),
}

pub enum SourceWrapper {
  #[cfg(feature = "clip_input")]
  Clip(ClipSource),
  #[cfg(feature = "video_input")]
  Video(VideoClipSource),
  #[cfg(feature = "v4l2_input")]
  Camera(CameraSource),
}

impl FromUrl for SourceWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "clip_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ClipSource::SCHEME {
        return Ok(SourceWrapper::Clip(ClipSource::from_url(url)?));
      }
    }
    #[cfg(feature = "video_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == VideoClipSource::SCHEME {
        return Ok(SourceWrapper::Video(VideoClipSource::from_url(url)?));
      }
    }
    #[cfg(feature = "v4l2_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == CameraSource::SCHEME {
        return Ok(SourceWrapper::Camera(CameraSource::from_url(url)?));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl FrameSource for SourceWrapper {
  fn start(&mut self) -> Result<(), InputError> {
    match self {
      #[cfg(feature = "clip_input")]
      SourceWrapper::Clip(source) => source.start(),
      #[cfg(feature = "video_input")]
      SourceWrapper::Video(source) => source.start(),
      #[cfg(feature = "v4l2_input")]
      SourceWrapper::Camera(source) => source.start(),
    }
  }

  fn stop(&mut self) {
    match self {
      #[cfg(feature = "clip_input")]
      SourceWrapper::Clip(source) => source.stop(),
      #[cfg(feature = "video_input")]
      SourceWrapper::Video(source) => source.stop(),
      #[cfg(feature = "v4l2_input")]
      SourceWrapper::Camera(source) => source.stop(),
    }
  }

  fn raw_frame(&mut self) -> Result<RgbImage, InputError> {
    match self {
      #[cfg(feature = "clip_input")]
      SourceWrapper::Clip(source) => source.raw_frame(),
      #[cfg(feature = "video_input")]
      SourceWrapper::Video(source) => source.raw_frame(),
      #[cfg(feature = "v4l2_input")]
      SourceWrapper::Camera(source) => source.raw_frame(),
    }
  }

  fn processed_frame(&mut self, width: u32, height: u32) -> Result<RgbImage, InputError> {
    match self {
      #[cfg(feature = "clip_input")]
      SourceWrapper::Clip(source) => source.processed_frame(width, height),
      #[cfg(feature = "video_input")]
      SourceWrapper::Video(source) => source.processed_frame(width, height),
      #[cfg(feature = "v4l2_input")]
      SourceWrapper::Camera(source) => source.processed_frame(width, height),
    }
  }

  fn frame_rate(&self) -> Option<u32> {
    match self {
      #[cfg(feature = "clip_input")]
      SourceWrapper::Clip(source) => source.frame_rate(),
      #[cfg(feature = "video_input")]
      SourceWrapper::Video(source) => source.frame_rate(),
      #[cfg(feature = "v4l2_input")]
      SourceWrapper::Camera(source) => source.frame_rate(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unknown_source_scheme() {
    let url = url::Url::parse("rtsp://camera.local/stream").unwrap();
    assert!(matches!(
      SourceWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }

  #[cfg(feature = "video_input")]
  #[test]
  fn test_video_scheme_selects_video_source() {
    let url = url::Url::parse("video:///tmp/clip.mp4?fps=24").unwrap();
    let source = SourceWrapper::from_url(&url).unwrap();
    assert!(matches!(source, SourceWrapper::Video(_)));
    assert_eq!(source.frame_rate(), Some(24));
  }
}
