// 该文件是 Fuguang （浮光） 项目的一部分。
// src/output/mask.rs - 分割掩膜渲染
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

use image::{Rgb, Rgba};

use crate::{frame::RgbaFrame, model::Mask};

pub const DEFAULT_MASK_INTENSITY: f32 = 0.25;
pub const DEFAULT_MASK_THRESHOLD: f32 = 0.5;

const MIN_ALPHA: f32 = 0.3;
const MAX_ALPHA: f32 = 0.7;

/// 把掩膜作为权重叠加颜色到整帧上（不透明模式）
///
/// 每个像素按最近邻取掩膜值，R/G/B 各加上 `mask * color * intensity`，
/// 超出 255 时饱和；透明度不变。掩膜行方向与帧相反。
pub fn blend_mask_onto(frame: &mut RgbaFrame, mask: &Mask, color: Rgb<u8>, intensity: f32) {
  let (fw, fh) = frame.dimensions();
  if fw == 0 || fh == 0 {
    return;
  }
  let (mw, mh) = (mask.width() as u64, mask.height() as u64);
  let factor = color.0.map(|c| c as f32 * intensity);

  for (x, y, pixel) in frame.as_image_mut().enumerate_pixels_mut() {
    let mx = (x as u64 * mw / fw as u64) as u32;
    let my = ((fh - 1 - y) as u64 * mh / fh as u64) as u32;
    let weight = mask.value(mx, my);
    if weight == 0.0 || weight.is_nan() {
      continue;
    }
    for c in 0..3 {
      let value = pixel.0[c] as f32 + weight * factor[c];
      pixel.0[c] = value.round().clamp(0.0, 255.0) as u8;
    }
  }
}

/// 把掩膜盖到透明帧上（透明模式）
///
/// 掩膜值不低于 `threshold` 的单元写到 `(floor(x*sx), H-1-floor(y*sy))`，
/// 颜色不变，透明度在 0.3 到 0.7 之间随掩膜值变化。后写入的覆盖先写入的。
pub fn stamp_mask_onto(frame: &mut RgbaFrame, mask: &Mask, color: Rgb<u8>, threshold: f32) {
  let (fw, fh) = frame.dimensions();
  let scale_x = fw as f32 / mask.width() as f32;
  let scale_y = fh as f32 / mask.height() as f32;
  let Rgb([r, g, b]) = color;

  for y in 0..mask.height() {
    for x in 0..mask.width() {
      let value = mask.value(x, y);
      if value.is_nan() || value < threshold {
        continue;
      }

      let tx = (x as f32 * scale_x).floor() as i64;
      let ty = fh as i64 - 1 - (y as f32 * scale_y).floor() as i64;
      if tx < 0 || tx >= fw as i64 || ty < 0 || ty >= fh as i64 {
        continue;
      }

      let alpha = mask_alpha(value);
      frame.put_pixel(tx as u32, ty as u32, Rgba([r, g, b, alpha]));
    }
  }
}

/// 掩膜值线性映射为透明度，掩膜值先钳制到 [0, 1]
fn mask_alpha(value: f32) -> u8 {
  let t = value.clamp(0.0, 1.0);
  let alpha = MIN_ALPHA + (MAX_ALPHA - MIN_ALPHA) * t;
  (alpha * 255.0).round() as u8
}
