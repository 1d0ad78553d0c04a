// 该文件是 Fuguang （浮光） 项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头输入源
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

use std::pin::Pin;

use image::RgbImage;
use tracing::{debug, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{FrameSource, InputError};
use crate::{FromUrl, FromUrlWithScheme, frame::resize_cover_crop, url_file_path};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;

/// V4L2 摄像头输入源
///
/// Stream 需要引用 Device，Device 用 Pin<Box> 固定在堆上，
/// 并保证 stream 先于 device 释放。
pub struct CameraSource {
  device_path: String,
  width: u32,
  height: u32,
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  device: Option<Pin<Box<Device>>>,
  current: Option<RgbImage>,
}

impl FromUrlWithScheme for CameraSource {
  const SCHEME: &'static str = "v4l2";
}

impl FromUrl for CameraSource {
  type Error = InputError;

  // v4l2:///dev/video0?width=640&height=480
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let query = |key: &str, default: u32| {
      url
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    Ok(CameraSource {
      device_path: url_file_path(url),
      width: query("width", DEFAULT_WIDTH),
      height: query("height", DEFAULT_HEIGHT),
      stream: None,
      device: None,
      current: None,
    })
  }
}

impl CameraSource {
  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks_exact(4) {
      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }

  fn unavailable(&self, err: impl std::fmt::Display) -> InputError {
    InputError::DeviceUnavailable(self.device_path.clone(), err.to_string())
  }
}

impl FrameSource for CameraSource {
  fn start(&mut self) -> Result<(), InputError> {
    if self.stream.is_some() {
      return Ok(());
    }

    let device = Box::pin(Device::with_path(&self.device_path).map_err(|e| self.unavailable(e))?);

    let mut format = device.format().map_err(|e| self.unavailable(e))?;
    format.width = self.width;
    format.height = self.height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format).map_err(|e| self.unavailable(e))?;
    self.width = format.width;
    self.height = format.height;

    // SAFETY: device 被 Pin<Box> 固定在堆上不会移动；
    // stream 在 stop/drop 中总是先于 device 释放
    let device_ref: &Device = &device;
    let device_static: &'static Device = unsafe { std::mem::transmute(device_ref) };
    let stream =
      Stream::with_buffers(device_static, Type::VideoCapture, 4).map_err(|e| self.unavailable(e))?;

    self.device = Some(device);
    self.stream = Some(stream);
    info!(
      "摄像头 {} 已启动: {}x{}",
      self.device_path, self.width, self.height
    );
    Ok(())
  }

  fn stop(&mut self) {
    if self.stream.take().is_some() {
      info!("摄像头 {} 已停止", self.device_path);
    }
    self.device.take();
    self.current = None;
  }

  fn raw_frame(&mut self) -> Result<RgbImage, InputError> {
    let stream = self.stream.as_mut().ok_or(InputError::NotStarted)?;
    let (buffer, meta) = stream
      .next()
      .map_err(|e| InputError::CaptureError(e.to_string()))?;
    debug!("采集帧 #{}", meta.sequence);

    let rgb = Self::yuyv_to_rgb(buffer, self.width, self.height);
    let image = RgbImage::from_raw(self.width, self.height, rgb)
      .ok_or_else(|| InputError::CaptureError("无法创建 RGB 图像".to_string()))?;
    self.current = Some(image.clone());
    Ok(image)
  }

  fn processed_frame(&mut self, width: u32, height: u32) -> Result<RgbImage, InputError> {
    if self.stream.is_none() {
      return Err(InputError::NotStarted);
    }
    match &self.current {
      Some(image) => Ok(resize_cover_crop(image, width, height)),
      None => {
        let image = self.raw_frame()?;
        Ok(resize_cover_crop(&image, width, height))
      }
    }
  }

  fn frame_rate(&self) -> Option<u32> {
    Some(DEFAULT_FPS)
  }
}

impl Drop for CameraSource {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_yuyv_gray() {
    // U = V = 128 时为灰度
    let rgb = CameraSource::yuyv_to_rgb(&[100, 128, 200, 128], 2, 1);
    assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
  }

  #[test]
  fn test_missing_device_is_unavailable() {
    let url = Url::parse("v4l2:///dev/fuguang-missing?width=320&height=240").unwrap();
    let mut source = CameraSource::from_url(&url).unwrap();
    assert_eq!((source.width, source.height), (320, 240));
    assert!(matches!(source.raw_frame(), Err(InputError::NotStarted)));
    assert!(matches!(
      source.start(),
      Err(InputError::DeviceUnavailable(..))
    ));
    source.stop();
  }
}
