// 该文件是 Fuguang （浮光） 项目的一部分。
// src/model/rknn_yolov8.rs - RKNN 上的 YOLOv8 检测/分割模型
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
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{InferOutput, MaskPrototypes, Model, RawTensor, TensorError},
  url_file_path,
};

const YOLOV8_NUM_INPUTS: u32 = 1;
const YOLOV8_STRIDES: [u32; 3] = [8, 16, 32];
const YOLOV8_DEFAULT_INPUT: u32 = 640;
const YOLOV8_PROTO_STRIDE: u32 = 4;

#[derive(Error, Debug)]
pub enum RknnYolov8Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("输入尺寸 {actual:?} 与模型尺寸 {expected:?} 不一致")]
  InputSizeMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
}

pub struct RknnYolov8Builder {
  model_path: String,
  input_width: u32,
  input_height: u32,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnYolov8Builder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnYolov8Builder {
  type Error = RknnYolov8Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnYolov8Error::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = RknnYolov8Builder {
      model_path: url_file_path(url),
      input_width: YOLOV8_DEFAULT_INPUT,
      input_height: YOLOV8_DEFAULT_INPUT,
      flags: InitFlags::default(),
    };
    for (k, v) in url.query_pairs() {
      let value = v
        .parse::<u32>()
        .map_err(|e| RknnYolov8Error::ModelInvalid(format!("参数 {}={} 无效: {}", k, v, e)))?;
      match k.as_ref() {
        "width" => builder.input_width = value,
        "height" => builder.input_height = value,
        _ => debug!("忽略未知参数: {}", k),
      }
    }
    Ok(builder)
  }
}

impl RknnYolov8Builder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnYolov8, RknnYolov8Error> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context.num_inputs()?;
    let num_outputs = context.num_outputs()?;
    if num_inputs != YOLOV8_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        YOLOV8_NUM_INPUTS, num_inputs
      );
      return Err(RknnYolov8Error::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        YOLOV8_NUM_INPUTS, num_inputs
      )));
    }
    let segment = has_prototypes(num_outputs)?;
    info!(
      "模型加载完成: 输入 {}x{}, 分割头: {}",
      self.input_width, self.input_height, segment
    );

    Ok(RknnYolov8 {
      context,
      input_width: self.input_width,
      input_height: self.input_height,
      segment,
    })
  }
}

/// 一个输出为纯检测模型，两个输出时第二个为掩膜原型
fn has_prototypes(num_outputs: u32) -> Result<bool, RknnYolov8Error> {
  match num_outputs {
    1 => Ok(false),
    2 => Ok(true),
    n => Err(RknnYolov8Error::ModelInvalid(format!(
      "预期模型输出数量为 1 或 2, 实际为 {}",
      n
    ))),
  }
}

/// 原型输出为通道优先 (channels, h/4, w/4)
fn prototypes_from(
  data: &[f32],
  input_width: u32,
  input_height: u32,
) -> Result<MaskPrototypes, RknnYolov8Error> {
  let height = (input_height / YOLOV8_PROTO_STRIDE) as usize;
  let width = (input_width / YOLOV8_PROTO_STRIDE) as usize;
  let plane = height * width;
  if plane == 0 || data.len() % plane != 0 {
    return Err(RknnYolov8Error::ModelInvalid(format!(
      "原型输出长度 {} 与 {}x{} 不匹配",
      data.len(),
      width,
      height
    )));
  }
  Ok(MaskPrototypes::new(
    data.len() / plane,
    height,
    width,
    data.to_vec(),
  )?)
}

pub struct RknnYolov8 {
  context: Context,
  input_width: u32,
  input_height: u32,
  /// 第二个输出为掩膜原型
  segment: bool,
}

impl RknnYolov8 {
  /// 三个检测头的网格单元总数
  fn cells(&self) -> usize {
    YOLOV8_STRIDES
      .iter()
      .map(|s| ((self.input_width / s) * (self.input_height / s)) as usize)
      .sum()
  }
}

impl Model for RknnYolov8 {
  type Input = RgbImage;
  type Error = RknnYolov8Error;

  fn input_size(&self) -> (u32, u32) {
    (self.input_width, self.input_height)
  }

  fn infer(&self, input: &Self::Input) -> Result<InferOutput, Self::Error> {
    if input.dimensions() != self.input_size() {
      return Err(RknnYolov8Error::InputSizeMismatch {
        expected: self.input_size(),
        actual: input.dimensions(),
      });
    }

    debug!("设置模型输入");
    self
      .context
      .set_input(0, input.as_raw(), TensorFormat::NHWC, TensorType::UInt8)?;
    debug!("执行模型推理");
    self.context.run()?;
    let output = self.context.get_outputs()?;

    // 检测头输出为通道优先 (features, cells)
    let head = output.get_f32(0)?;
    let cells = self.cells();
    if cells == 0 || head.len() % cells != 0 {
      return Err(RknnYolov8Error::ModelInvalid(format!(
        "检测头输出长度 {} 不能被单元数 {} 整除",
        head.len(),
        cells
      )));
    }
    let boxes = RawTensor::from_channel_major(head.len() / cells, cells, head)?;

    let prototypes = if self.segment {
      let protos = output.get_f32(1).map_err(|e| {
        error!("获取第 {} 个输出失败: {}", 1, e);
        e
      })?;
      Some(prototypes_from(protos, self.input_width, self.input_height)?)
    } else {
      None
    };

    Ok(InferOutput { boxes, prototypes })
  }
}
