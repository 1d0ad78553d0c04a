// 该文件是 Fuguang （浮光） 项目的一部分。
// src/model/decoder.rs - 检测头输出解码
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

use std::slice::ChunksExact;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  ConfigError,
  geometry::Rect,
  model::{DetectItem, Detection, MaskPrototypes, RawTensor, assemble_mask},
};

const BOX_FEATURES: usize = 4;
const BOX_CENTER_X: usize = 0;
const BOX_CENTER_Y: usize = 1;
const BOX_WIDTH: usize = 2;
const BOX_HEIGHT: usize = 3;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("张量特征数 {features} 小于 4 + 类别数 {class_count}")]
  ShapeMismatch { features: usize, class_count: usize },
  #[error("张量形状发生变化: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeChanged {
    expected: (usize, usize),
    actual: (usize, usize),
  },
  #[error("掩膜系数数量 {coefficients} 与原型通道数 {prototypes} 不一致")]
  MaskChannelMismatch {
    coefficients: usize,
    prototypes: usize,
  },
}

/// 每次解码使用的配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeConfig {
  pub class_count: usize,
  /// 低于该得分的单元被丢弃
  pub threshold: f32,
  pub input_width: u32,
  pub input_height: u32,
}

impl DecodeConfig {
  pub fn new(
    class_count: usize,
    threshold: f32,
    input_width: u32,
    input_height: u32,
  ) -> Result<Self, ConfigError> {
    if class_count == 0 {
      return Err(ConfigError::InvalidValue(
        "class_count".to_string(),
        "类别数必须大于 0".to_string(),
      ));
    }
    if !(0.0..=1.0).contains(&threshold) {
      return Err(ConfigError::InvalidValue(
        "threshold".to_string(),
        format!("阈值 {} 不在 [0, 1] 范围内", threshold),
      ));
    }
    if input_width == 0 || input_height == 0 {
      return Err(ConfigError::InvalidValue(
        "input_size".to_string(),
        format!("输入尺寸 {}x{} 无效", input_width, input_height),
      ));
    }
    Ok(Self {
      class_count,
      threshold,
      input_width,
      input_height,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GridDims {
  cells: usize,
  features: usize,
}

/// 检测头输出解码器
///
/// 网格单元数与特征数在第一次解码时确定，之后对同一模型保持不变。
#[derive(Debug, Default)]
pub struct OutputDecoder {
  dims: Option<GridDims>,
}

impl OutputDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// 解码一帧输出，返回按网格顺序惰性产生检测结果的迭代器
  pub fn decode<'a>(
    &mut self,
    tensor: &'a RawTensor,
    prototypes: Option<&'a MaskPrototypes>,
    config: &DecodeConfig,
  ) -> Result<Detections<'a>, DecodeError> {
    let shape = tensor.shape();
    let actual = GridDims {
      cells: shape.cells(),
      features: shape.channels,
    };

    let dims = match self.dims {
      Some(dims) if dims != actual => {
        return Err(DecodeError::ShapeChanged {
          expected: (dims.cells, dims.features),
          actual: (actual.cells, actual.features),
        });
      }
      Some(dims) => dims,
      None => {
        info!(
          "输出网格: {} 个单元, 每单元 {} 个特征",
          actual.cells, actual.features
        );
        self.dims = Some(actual);
        actual
      }
    };

    if dims.features < BOX_FEATURES + config.class_count {
      return Err(DecodeError::ShapeMismatch {
        features: dims.features,
        class_count: config.class_count,
      });
    }

    let coefficients = dims.features - BOX_FEATURES - config.class_count;
    if let Some(protos) = prototypes
      && (coefficients == 0 || coefficients != protos.channels())
    {
      return Err(DecodeError::MaskChannelMismatch {
        coefficients,
        prototypes: protos.channels(),
      });
    }

    debug!(
      "解码 {} 个单元, 阈值 {}, 掩膜: {}",
      dims.cells,
      config.threshold,
      prototypes.is_some()
    );

    Ok(Detections {
      cells: tensor.as_slice().chunks_exact(dims.features),
      config: *config,
      prototypes,
    })
  }
}

/// 解码结果迭代器，只能遍历一次
pub struct Detections<'a> {
  cells: ChunksExact<'a, f32>,
  config: DecodeConfig,
  prototypes: Option<&'a MaskPrototypes>,
}

impl Iterator for Detections<'_> {
  type Item = Detection;

  fn next(&mut self) -> Option<Self::Item> {
    for cell in self.cells.by_ref() {
      if let Some(detection) = decode_cell(cell, &self.config, self.prototypes) {
        return Some(detection);
      }
    }
    None
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (0, self.cells.size_hint().1)
  }
}

fn decode_cell(
  cell: &[f32],
  config: &DecodeConfig,
  prototypes: Option<&MaskPrototypes>,
) -> Option<Detection> {
  let class_end = BOX_FEATURES + config.class_count;
  let (class_id, score) = best_class(&cell[BOX_FEATURES..class_end]);

  if score < config.threshold {
    return None;
  }

  let rect = decode_rect(cell, config);
  let item = DetectItem {
    class_id,
    score,
    rect,
  };

  match prototypes {
    Some(protos) => {
      let mask = assemble_mask(
        &cell[class_end..],
        protos,
        &rect,
        config.input_width,
        config.input_height,
      );
      Some(Detection::Masked(item, mask))
    }
    None => Some(Detection::Plain(item)),
  }
}

/// 最高得分类别，得分相同取编号较小者
fn best_class(scores: &[f32]) -> (u32, f32) {
  let mut best = (0u32, 0.0f32);
  for (idx, &score) in scores.iter().enumerate() {
    if score > best.1 {
      best = (idx as u32, score);
    }
  }
  best
}

/// 中心点格式转为左上角格式；最小角只钳制到 0，最大角截断到输入尺寸
fn decode_rect(cell: &[f32], config: &DecodeConfig) -> Rect {
  Rect::from_center(
    cell[BOX_CENTER_X],
    cell[BOX_CENTER_Y],
    cell[BOX_WIDTH],
    cell[BOX_HEIGHT],
  )
  .clamp_min_to_origin()
  .cap_max(config.input_width as f32, config.input_height as f32)
}
