// 该文件是 Fuguang （浮光） 项目的一部分。
// src/model/segment.rs - 分割掩膜合成
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

use crate::{
  geometry::Rect,
  model::{Mask, MaskPrototypes},
};

/// 用掩膜系数线性组合原型平面，经 sigmoid 得到该检测的掩膜
///
/// 掩膜分辨率与原型一致，检测框以外的单元置 0。
/// `coefficients` 的长度须等于原型通道数，由解码器保证。
pub fn assemble_mask(
  coefficients: &[f32],
  prototypes: &MaskPrototypes,
  rect: &Rect,
  input_width: u32,
  input_height: u32,
) -> Mask {
  let (width, height) = (prototypes.width(), prototypes.height());
  let plane = width * height;
  let protos = prototypes.as_slice();

  // 原型单元中心映射回输入像素坐标
  let scale_x = input_width as f32 / width as f32;
  let scale_y = input_height as f32 / height as f32;

  let mut data = vec![0.0f32; plane];
  for py in 0..height {
    let cy = (py as f32 + 0.5) * scale_y;
    if cy < rect.y || cy >= rect.y_max() {
      continue;
    }
    for px in 0..width {
      let cx = (px as f32 + 0.5) * scale_x;
      if cx < rect.x || cx >= rect.x_max() {
        continue;
      }
      let idx = py * width + px;
      let logit: f32 = coefficients
        .iter()
        .enumerate()
        .map(|(k, c)| c * protos[k * plane + idx])
        .sum();
      data[idx] = sigmoid(logit);
    }
  }

  Mask::from_plane(prototypes, data)
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_mask_cropped_to_rect() {
    let protos = MaskPrototypes::new(1, 4, 4, vec![10.0; 16]).unwrap();
    // 输入 16x16，检测框覆盖左上 8x8，对应原型的左上 2x2
    let rect = Rect::new(0.0, 0.0, 8.0, 8.0);
    let mask = assemble_mask(&[1.0], &protos, &rect, 16, 16);

    for y in 0..4 {
      for x in 0..4 {
        let inside = x < 2 && y < 2;
        let value = mask.value(x, y);
        if inside {
          assert!(value > 0.99, "({}, {}) = {}", x, y, value);
        } else {
          assert_eq!(value, 0.0, "({}, {})", x, y);
        }
      }
    }
  }

  #[test]
  fn test_coefficients_combine_planes() {
    // 两个平面：+1 与 -1，系数相同时相互抵消
    let mut data = vec![1.0; 4];
    data.extend(vec![-1.0; 4]);
    let protos = MaskPrototypes::new(2, 2, 2, data).unwrap();
    let rect = Rect::new(0.0, 0.0, 4.0, 4.0);
    let mask = assemble_mask(&[0.5, 0.5], &protos, &rect, 4, 4);
    assert!(mask.as_slice().iter().all(|&v| (v - 0.5).abs() < 1e-6));
  }

  #[test]
  fn test_degenerate_rect_gives_empty_mask() {
    let protos = MaskPrototypes::new(1, 2, 2, vec![5.0; 4]).unwrap();
    let rect = Rect::new(3.0, 3.0, 0.0, 0.0);
    let mask = assemble_mask(&[1.0], &protos, &rect, 4, 4);
    assert!(mask.as_slice().iter().all(|&v| v == 0.0));
  }
}
