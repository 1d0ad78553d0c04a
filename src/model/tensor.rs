// 该文件是 Fuguang （浮光） 项目的一部分。
// src/model/tensor.rs - 模型输出张量
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

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("张量维度不能为 0: {0:?}")]
  EmptyDimension(Vec<usize>),
}

fn check_len(dims: &[usize], actual: usize) -> Result<(), TensorError> {
  if dims.contains(&0) {
    return Err(TensorError::EmptyDimension(dims.to_vec()));
  }
  let expected = dims.iter().product();
  if expected != actual {
    return Err(TensorError::LengthMismatch { expected, actual });
  }
  Ok(())
}

/// 输出特征图形状（NHWC，批大小固定为 1）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorShape {
  pub height: usize,
  pub width: usize,
  pub channels: usize,
}

impl TensorShape {
  pub const fn new(height: usize, width: usize, channels: usize) -> Self {
    Self {
      height,
      width,
      channels,
    }
  }

  /// 网格单元数量
  pub fn cells(&self) -> usize {
    self.height * self.width
  }
}

/// 检测头原始输出
///
/// 按单元优先存放：`data[cell * channels + feature]`，
/// 特征顺序为 cx, cy, w, h, 各类别得分, 掩膜系数。
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
  shape: TensorShape,
  data: Box<[f32]>,
}

impl RawTensor {
  pub fn new(shape: TensorShape, data: Vec<f32>) -> Result<Self, TensorError> {
    check_len(&[shape.height, shape.width, shape.channels], data.len())?;
    Ok(Self {
      shape,
      data: data.into_boxed_slice(),
    })
  }

  /// 已经展平为 (cells, features) 的输出
  pub fn from_cells(cells: usize, features: usize, data: Vec<f32>) -> Result<Self, TensorError> {
    Self::new(TensorShape::new(1, cells, features), data)
  }

  /// 通道优先 (features, cells) 的输出转置为单元优先
  pub fn from_channel_major(
    features: usize,
    cells: usize,
    data: &[f32],
  ) -> Result<Self, TensorError> {
    check_len(&[features, cells], data.len())?;
    let mut out = vec![0.0f32; data.len()];
    for f in 0..features {
      for c in 0..cells {
        out[c * features + f] = data[f * cells + c];
      }
    }
    Self::from_cells(cells, features, out)
  }

  pub fn shape(&self) -> TensorShape {
    self.shape
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

/// 分割头的原型平面，(channels, height, width) 平面优先
#[derive(Debug, Clone, PartialEq)]
pub struct MaskPrototypes {
  channels: usize,
  height: usize,
  width: usize,
  data: Box<[f32]>,
}

impl MaskPrototypes {
  pub fn new(
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
  ) -> Result<Self, TensorError> {
    check_len(&[channels, height, width], data.len())?;
    Ok(Self {
      channels,
      height,
      width,
      data: data.into_boxed_slice(),
    })
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

/// 单个检测的掩膜
///
/// 原点与模型网格一致（第 0 行在画面上方），与帧缓冲的行方向相反。
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
  width: u32,
  height: u32,
  data: Box<[f32]>,
}

impl Mask {
  pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, TensorError> {
    check_len(&[width as usize, height as usize], data.len())?;
    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 尺寸取自已校验的原型张量，不再检查
  pub(crate) fn from_plane(prototypes: &MaskPrototypes, data: Vec<f32>) -> Self {
    debug_assert_eq!(data.len(), prototypes.width * prototypes.height);
    Self {
      width: prototypes.width as u32,
      height: prototypes.height as u32,
      data: data.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn value(&self, x: u32, y: u32) -> f32 {
    self.data[(y * self.width + x) as usize]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_raw_tensor_length_check() {
    let err = RawTensor::new(TensorShape::new(2, 2, 6), vec![0.0; 23]).unwrap_err();
    assert_eq!(
      err,
      TensorError::LengthMismatch {
        expected: 24,
        actual: 23
      }
    );
    assert!(RawTensor::new(TensorShape::new(2, 2, 6), vec![0.0; 24]).is_ok());
  }

  #[test]
  fn test_empty_dimension() {
    assert!(matches!(
      Mask::new(0, 4, vec![]),
      Err(TensorError::EmptyDimension(_))
    ));
  }

  #[test]
  fn test_from_channel_major() {
    // 2 个特征 × 3 个单元
    let data = [1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
    let tensor = RawTensor::from_channel_major(2, 3, &data).unwrap();
    assert_eq!(tensor.shape(), TensorShape::new(1, 3, 2));
    assert_eq!(tensor.as_slice(), &[1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
  }

  #[test]
  fn test_mask_value() {
    let mask = Mask::new(2, 2, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
    assert_eq!(mask.value(1, 0), 0.2);
    assert_eq!(mask.value(0, 1), 0.3);
  }
}
