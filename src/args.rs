// 该文件是 Fuguang （浮光） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Args;
use url::Url;

use crate::{
  ConfigError,
  output::{CompositeConfig, CompositeMode},
  task::PipelineSettings,
};

/// 各程序共用的管线参数
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 模型来源
  /// - 张量回放: tensor:///path/to/dump.json
  /// - RKNN: rknn:///path/to/model.rknn?width=640&height=640
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// - 图像序列或单张图像: clip:///path/to/frames?fps=30
  /// - 视频文件: video:///path/to/clip.mp4?fps=30
  /// - V4L2: v4l2:///dev/video0
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出路径
  /// - 图像文件: image:///path/to/out.png
  /// - 目录记录: folder:///path/to/dir?record=name&always
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)，同时决定边框粗细
  #[arg(long, default_value = "0.3", value_name = "THRESHOLD")]
  pub threshold: f32,

  /// 模型类别数
  #[arg(long, default_value = "80", value_name = "COUNT")]
  pub classes: usize,

  /// 合成模式: overlay 或 transparent
  #[arg(long, default_value = "overlay", value_name = "MODE")]
  pub mode: String,

  /// 边框最大粗细，不设置则不限制
  #[arg(long, value_name = "PIXELS")]
  pub max_stroke: Option<u32>,
}

impl PipelineArgs {
  pub fn settings(&self) -> Result<PipelineSettings, ConfigError> {
    let mode: CompositeMode = self.mode.parse()?;
    let composite =
      CompositeConfig::new(mode, self.threshold)?.with_max_stroke_width(self.max_stroke);
    Ok(PipelineSettings {
      class_count: self.classes,
      threshold: self.threshold,
      composite,
    })
  }
}
