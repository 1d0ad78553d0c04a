// 该文件是 Fuguang （浮光） 项目的一部分。
// src/output/draw.rs - 检测框绘制
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

use image::Rgba;
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect as PixelRect};

use crate::{frame::RgbaFrame, geometry::Rect};

/// 在帧上绘制矩形边框
///
/// - `normalized`: 矩形为归一化坐标，先按帧尺寸缩放
/// - `invert_y`: 矩形的 y 轴与帧相反，先翻转
///
/// 四条边各为一根实心条，末端多出 `stroke` 以盖住角点。宽或高不为正时不绘制。
pub fn draw_outline(
  frame: &mut RgbaFrame,
  rect: Rect,
  color: Rgba<u8>,
  stroke: i32,
  normalized: bool,
  invert_y: bool,
) {
  let (w, h) = (frame.width() as f32, frame.height() as f32);

  let mut rect = rect;
  if normalized {
    rect = rect.scale(w, h);
  }
  if invert_y {
    rect = rect.invert_y(h);
  }
  if rect.is_degenerate() {
    return;
  }

  let s = stroke as f32;
  // 上、下
  fill_bar(frame, rect.x, rect.y, rect.width + s, s, color);
  fill_bar(frame, rect.x, rect.y_max(), rect.width + s, s, color);
  // 左、右
  fill_bar(frame, rect.x, rect.y, s, rect.height + s, color);
  fill_bar(frame, rect.x_max(), rect.y, s, rect.height + s, color);
}

/// 填充一根实心条，超出帧的部分被截断，截断后为空则跳过
fn fill_bar(
  frame: &mut RgbaFrame,
  mut x: f32,
  mut y: f32,
  mut width: f32,
  mut height: f32,
  color: Rgba<u8>,
) {
  let (fw, fh) = (frame.width() as f32, frame.height() as f32);

  if x > fw || y > fh {
    return;
  }

  if x < 0.0 {
    width += x;
    x = 0.0;
  }
  if y < 0.0 {
    height += y;
    y = 0.0;
  }

  if x + width > fw {
    width = fw - x;
  }
  if y + height > fh {
    height = fh - y;
  }

  // 截断取整
  let (x, y) = (x as i32, y as i32);
  let (width, height) = (width as i32, height as i32);
  if width <= 0 || height <= 0 {
    return;
  }

  let bar = PixelRect::at(x, y).of_size(width as u32, height as u32);
  draw_filled_rect_mut(frame.as_image_mut(), bar, color);
}
