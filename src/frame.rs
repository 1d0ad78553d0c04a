// 该文件是 Fuguang （浮光） 项目的一部分。
// src/frame.rs - RGBA 帧定义
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

use image::{
  Rgb, RgbImage, Rgba, RgbaImage,
  imageops::{self, FilterType},
};

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// RGBA 帧缓冲
///
/// 第 0 行是画面的最下方一行（纹理坐标约定），与模型输出的网格方向相反。
/// 与显示图像之间的转换只在 [`FromRgbImage`]/[`ToRgbImage`] 中翻转一次。
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaFrame {
  image: RgbaImage,
}

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

pub trait FromRgbImage {
  fn from_rgb_image(image: &RgbImage) -> Self;
}

impl RgbaFrame {
  /// 全透明帧
  pub fn new(width: u32, height: u32) -> Self {
    Self::filled(width, height, TRANSPARENT)
  }

  pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
    Self {
      image: RgbaImage::from_pixel(width, height, color),
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
    *self.image.get_pixel(x, y)
  }

  pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>) {
    self.image.put_pixel(x, y, color);
  }

  /// 清空为全透明，保留已分配的内存
  pub fn clear(&mut self) {
    for pixel in self.image.pixels_mut() {
      *pixel = TRANSPARENT;
    }
  }

  /// 底行在前的原始像素
  pub fn as_image(&self) -> &RgbaImage {
    &self.image
  }

  pub fn as_image_mut(&mut self) -> &mut RgbaImage {
    &mut self.image
  }

  /// 从显示方向（顶行在前）的 RGBA 图像构造
  pub fn from_rgba_image(image: &RgbaImage) -> Self {
    Self {
      image: imageops::flip_vertical(image),
    }
  }

  /// 转换为显示方向（顶行在前）的 RGBA 图像
  pub fn to_rgba_image(&self) -> RgbaImage {
    imageops::flip_vertical(&self.image)
  }
}

impl FromRgbImage for RgbaFrame {
  fn from_rgb_image(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let mut frame = RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
      let Rgb([r, g, b]) = *pixel;
      frame.put_pixel(x, height - 1 - y, Rgba([r, g, b, 255]));
    }
    Self { image: frame }
  }
}

impl ToRgbImage for RgbaFrame {
  fn to_rgb_image(&self) -> RgbImage {
    let (width, height) = self.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
      let Rgba([r, g, b, _]) = *self.image.get_pixel(x, height - 1 - y);
      Rgb([r, g, b])
    })
  }
}

impl ToRgbImage for RgbImage {
  fn to_rgb_image(&self) -> RgbImage {
    self.clone()
  }
}

impl FromRgbImage for RgbImage {
  fn from_rgb_image(image: &RgbImage) -> Self {
    image.clone()
  }
}

/// 等比缩放到完全覆盖目标尺寸，再居中裁剪（无黑边）
pub fn resize_cover_crop(image: &RgbImage, width: u32, height: u32) -> RgbImage {
  let (src_w, src_h) = image.dimensions();
  if (src_w, src_h) == (width, height) {
    return image.clone();
  }
  if src_w == 0 || src_h == 0 {
    return RgbImage::new(width, height);
  }

  let ratio = (width as f32 / src_w as f32).max(height as f32 / src_h as f32);
  let scaled_w = ((src_w as f32 * ratio).round() as u32).max(width);
  let scaled_h = ((src_h as f32 * ratio).round() as u32).max(height);

  let scaled = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);
  let x_offset = (scaled_w - width) / 2;
  let y_offset = (scaled_h - height) / 2;
  imageops::crop_imm(&scaled, x_offset, y_offset, width, height).to_image()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rgb_round_trip_flips_once() {
    let mut image = RgbImage::new(2, 3);
    image.put_pixel(0, 0, Rgb([10, 20, 30]));

    let frame = RgbaFrame::from_rgb_image(&image);
    // 显示图像的顶行在帧中位于最后一行
    assert_eq!(frame.pixel(0, 2), Rgba([10, 20, 30, 255]));
    assert_eq!(frame.pixel(0, 0), Rgba([0, 0, 0, 255]));

    let back = frame.to_rgb_image();
    assert_eq!(back, image);
  }

  #[test]
  fn test_clear() {
    let mut frame = RgbaFrame::filled(4, 4, Rgba([1, 2, 3, 4]));
    frame.clear();
    assert!(frame.as_image().pixels().all(|p| *p == TRANSPARENT));
  }

  #[test]
  fn test_resize_cover_crop_landscape() {
    let image = RgbImage::from_pixel(1280, 720, Rgb([50, 60, 70]));
    let out = resize_cover_crop(&image, 320, 320);
    assert_eq!(out.dimensions(), (320, 320));
    assert_eq!(*out.get_pixel(160, 160), Rgb([50, 60, 70]));
  }

  #[test]
  fn test_resize_cover_crop_keeps_center() {
    // 左半黑右半白，裁剪后中心列两侧颜色不同
    let image = RgbImage::from_fn(400, 100, |x, _| {
      if x < 200 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
    });
    let out = resize_cover_crop(&image, 100, 100);
    assert_eq!(out.dimensions(), (100, 100));
    assert_eq!(*out.get_pixel(10, 50), Rgb([0, 0, 0]));
    assert_eq!(*out.get_pixel(90, 50), Rgb([255, 255, 255]));
  }
}
