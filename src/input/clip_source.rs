// 该文件是 Fuguang （浮光） 项目的一部分。
// src/input/clip_source.rs - 图像序列片段输入
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

use image::{ImageFormat, ImageReader, RgbImage};
use tracing::{debug, error, info};
use url::Url;

use super::{FrameSource, InputError};
use crate::{FromUrl, FromUrlWithScheme, frame::resize_cover_crop, url_file_path};

/// 图像序列片段
///
/// 路径可以是单张图像，也可以是目录（按文件名排序的图像序列），循环播放。
pub struct ClipSource {
  path: PathBuf,
  fps: Option<u32>,
  frames: Vec<PathBuf>,
  index: usize,
  current: Option<RgbImage>,
  started: bool,
}

impl FromUrlWithScheme for ClipSource {
  const SCHEME: &'static str = "clip";
}

impl FromUrl for ClipSource {
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

impl ClipSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      fps: None,
      frames: Vec::new(),
      index: 0,
      current: None,
      started: false,
    }
  }

  pub fn with_frame_rate(mut self, fps: Option<u32>) -> Self {
    self.fps = fps;
    self
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  fn list_frames(path: &Path) -> Result<Vec<PathBuf>, InputError> {
    if path.is_file() {
      return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
      return Ok(Vec::new());
    }

    let mut frames: Vec<PathBuf> = std::fs::read_dir(path)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|p| p.is_file() && ImageFormat::from_path(p).is_ok())
      .collect();
    frames.sort();
    Ok(frames)
  }
}

impl FrameSource for ClipSource {
  fn start(&mut self) -> Result<(), InputError> {
    let frames = Self::list_frames(&self.path)?;
    if frames.is_empty() {
      return Err(InputError::ClipUnset(self.path.display().to_string()));
    }
    info!("片段 {} 共 {} 帧", self.path.display(), frames.len());
    self.frames = frames;
    self.index = 0;
    self.current = None;
    self.started = true;
    Ok(())
  }

  fn stop(&mut self) {
    if !self.started {
      return;
    }
    self.started = false;
    self.current = None;
    info!("片段 {} 已停止", self.path.display());
  }

  fn raw_frame(&mut self) -> Result<RgbImage, InputError> {
    if !self.started {
      return Err(InputError::NotStarted);
    }

    let path = &self.frames[self.index];
    debug!("读取第 {} 帧: {}", self.index, path.display());
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    self.index = (self.index + 1) % self.frames.len();
    self.current = Some(image.clone());
    Ok(image)
  }

  fn processed_frame(&mut self, width: u32, height: u32) -> Result<RgbImage, InputError> {
    if !self.started {
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

  fn clip_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fuguang-clip-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn test_loops_sorted_frames() {
    let dir = clip_dir("loop");
    RgbImage::from_pixel(4, 2, Rgb([2, 2, 2])).save(dir.join("b.png")).unwrap();
    RgbImage::from_pixel(4, 2, Rgb([1, 1, 1])).save(dir.join("a.png")).unwrap();
    std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();

    let url = Url::parse(&format!("clip://{}?fps=15", dir.display())).unwrap();
    let mut source = ClipSource::from_url(&url).unwrap();
    assert_eq!(source.frame_rate(), Some(15));
    source.start().unwrap();
    assert_eq!(source.len(), 2);

    let values: Vec<u8> = (0..3)
      .map(|_| source.raw_frame().unwrap().get_pixel(0, 0).0[0])
      .collect();
    assert_eq!(values, vec![1, 2, 1]);

    let processed = source.processed_frame(2, 2).unwrap();
    assert_eq!(processed.dimensions(), (2, 2));
    assert_eq!(*processed.get_pixel(1, 1), Rgb([1, 1, 1]));

    source.stop();
    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn test_empty_clip_is_unset() {
    let dir = clip_dir("empty");
    let mut source = ClipSource::new(&dir);
    assert!(matches!(source.start(), Err(InputError::ClipUnset(_))));

    let mut missing = ClipSource::new(dir.join("missing"));
    assert!(matches!(missing.start(), Err(InputError::ClipUnset(_))));
    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn test_frames_require_start() {
    let mut source = ClipSource::new("/nonexistent");
    // 未启动时停止无效果
    source.stop();
    assert!(matches!(source.raw_frame(), Err(InputError::NotStarted)));
    assert!(matches!(
      source.processed_frame(4, 4),
      Err(InputError::NotStarted)
    ));
  }

  #[test]
  fn test_scheme_mismatch() {
    let url = Url::parse("image:///tmp/a.png").unwrap();
    assert!(matches!(
      ClipSource::from_url(&url),
      Err(InputError::SchemeMismatch(_))
    ));
  }
}
