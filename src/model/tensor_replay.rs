// 该文件是 Fuguang （浮光） 项目的一部分。
// src/model/tensor_replay.rs - 回放已录制的模型输出
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
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{InferOutput, MaskPrototypes, Model, RawTensor, TensorError, TensorShape},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum TensorReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
  #[error("{0} 的形状 {1:?} 不受支持")]
  UnsupportedShape(&'static str, Vec<usize>),
}

/// 录制的单个张量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorDump {
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

/// 录制文件内容
///
/// `boxes` 的形状为 `[cells, features]` 或 `[height, width, features]`，
/// `prototypes` 的形状为 `[channels, height, width]`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDocument {
  pub input_width: u32,
  pub input_height: u32,
  pub boxes: TensorDump,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prototypes: Option<TensorDump>,
}

/// 每次推理都返回同一份录制输出的模型
pub struct TensorReplayModel {
  input_width: u32,
  input_height: u32,
  output: InferOutput,
}

impl FromUrlWithScheme for TensorReplayModel {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorReplayModel {
  type Error = TensorReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TensorReplayError::SchemeMismatch(format!(
        "期望方案 '{}', 实际方案 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = url_file_path(url);
    info!("加载张量录制文件: {}", path);
    let text = std::fs::read_to_string(&path)?;
    Self::from_json(&text)
  }
}

impl TensorReplayModel {
  pub fn from_json(text: &str) -> Result<Self, TensorReplayError> {
    let document: ReplayDocument = serde_json::from_str(text)?;
    Self::from_document(document)
  }

  pub fn from_document(document: ReplayDocument) -> Result<Self, TensorReplayError> {
    let TensorDump { shape, data } = document.boxes;
    let boxes = match shape[..] {
      [cells, features] => RawTensor::from_cells(cells, features, data)?,
      [height, width, features] => {
        RawTensor::new(TensorShape::new(height, width, features), data)?
      }
      _ => return Err(TensorReplayError::UnsupportedShape("boxes", shape.clone())),
    };

    let prototypes = match document.prototypes {
      Some(TensorDump { shape, data }) => match shape[..] {
        [channels, height, width] => Some(MaskPrototypes::new(channels, height, width, data)?),
        _ => return Err(TensorReplayError::UnsupportedShape("prototypes", shape.clone())),
      },
      None => None,
    };

    debug!(
      "录制输出: {:?}, 原型: {}",
      boxes.shape(),
      prototypes.is_some()
    );

    Ok(Self {
      input_width: document.input_width,
      input_height: document.input_height,
      output: InferOutput { boxes, prototypes },
    })
  }
}

impl Model for TensorReplayModel {
  type Input = RgbImage;
  type Error = TensorReplayError;

  fn input_size(&self) -> (u32, u32) {
    (self.input_width, self.input_height)
  }

  fn infer(&self, input: &Self::Input) -> Result<InferOutput, Self::Error> {
    if input.dimensions() != self.input_size() {
      debug!(
        "输入尺寸 {:?} 与录制尺寸 {:?} 不一致",
        input.dimensions(),
        self.input_size()
      );
    }
    Ok(self.output.clone())
  }
}
