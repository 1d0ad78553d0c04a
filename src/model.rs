// 该文件是 Fuguang （浮光） 项目的一部分。
// src/model.rs - 模型与检测结果
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
use url::Url;

use crate::{FromUrl, geometry::Rect};

mod decoder;
mod labels;
mod segment;
mod tensor;

pub use self::decoder::{DecodeConfig, DecodeError, Detections, OutputDecoder};
pub use self::labels::{COCO_CLASSES, label_name};
pub use self::segment::assemble_mask;
pub use self::tensor::{Mask, MaskPrototypes, RawTensor, TensorError, TensorShape};

#[cfg(feature = "tensor_replay")]
mod tensor_replay;
#[cfg(feature = "tensor_replay")]
pub use self::tensor_replay::{ReplayDocument, TensorDump, TensorReplayError, TensorReplayModel};

#[cfg(feature = "rknpu_model")]
mod rknn_yolov8;
#[cfg(feature = "rknpu_model")]
pub use self::rknn_yolov8::{RknnYolov8, RknnYolov8Builder, RknnYolov8Error};

/// 一次推理的原始输出
#[derive(Debug, Clone)]
pub struct InferOutput {
  pub boxes: RawTensor,
  pub prototypes: Option<MaskPrototypes>,
}

pub trait Model {
  type Input;
  type Error;

  /// 模型输入的 (宽, 高)，解码前需写入 [`DecodeConfig`]
  fn input_size(&self) -> (u32, u32);

  fn infer(&self, input: &Self::Input) -> Result<InferOutput, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  /// 模型输入像素坐标，原点在左上
  pub rect: Rect,
}

/// 解码出的单个目标，带掩膜时独占该掩膜
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
  Plain(DetectItem),
  Masked(DetectItem, Mask),
}

impl Detection {
  pub fn item(&self) -> &DetectItem {
    match self {
      Detection::Plain(item) | Detection::Masked(item, _) => item,
    }
  }

  pub fn mask(&self) -> Option<&Mask> {
    match self {
      Detection::Plain(_) => None,
      Detection::Masked(_, mask) => Some(mask),
    }
  }

  pub fn into_parts(self) -> (DetectItem, Option<Mask>) {
    match self {
      Detection::Plain(item) => (item, None),
      Detection::Masked(item, mask) => (item, Some(mask)),
    }
  }
}

/// 不含掩膜的检测摘要，供记录与日志使用
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn summarize(detections: &[Detection]) -> Self {
    Self {
      items: detections.iter().map(|d| d.item().clone()).collect(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "tensor_replay")]
  #[error("张量回放模型错误: {0}")]
  TensorReplayError(#[from] TensorReplayError),
  #[cfg(feature = "rknpu_model")]
  #[error("RKNN 模型错误: {0}")]
  RknnYolov8Error(#[from] RknnYolov8Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URI 方案选择的模型
pub enum ModelWrapper {
  #[cfg(feature = "tensor_replay")]
  TensorReplay(TensorReplayModel),
  #[cfg(feature = "rknpu_model")]
  RknnYolov8(RknnYolov8),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "tensor_replay")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == TensorReplayModel::SCHEME {
        return Ok(ModelWrapper::TensorReplay(TensorReplayModel::from_url(url)?));
      }
    }
    #[cfg(feature = "rknpu_model")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == RknnYolov8Builder::SCHEME {
        let model = RknnYolov8Builder::from_url(url)?.build()?;
        return Ok(ModelWrapper::RknnYolov8(model));
      }
    }
    Err(ModelError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Model for ModelWrapper {
  type Input = image::RgbImage;
  type Error = ModelError;

  fn input_size(&self) -> (u32, u32) {
    match self {
      #[cfg(feature = "tensor_replay")]
      ModelWrapper::TensorReplay(model) => model.input_size(),
      #[cfg(feature = "rknpu_model")]
      ModelWrapper::RknnYolov8(model) => model.input_size(),
    }
  }

  fn infer(&self, input: &Self::Input) -> Result<InferOutput, Self::Error> {
    match self {
      #[cfg(feature = "tensor_replay")]
      ModelWrapper::TensorReplay(model) => model.infer(input).map_err(ModelError::from),
      #[cfg(feature = "rknpu_model")]
      ModelWrapper::RknnYolov8(model) => model.infer(input).map_err(ModelError::from),
    }
  }
}
