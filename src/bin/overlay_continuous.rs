// 该文件是 Fuguang （浮光） 项目的一部分。
// src/bin/overlay_continuous.rs - 连续检测叠加
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use fuguang::{
  FromUrl,
  args::PipelineArgs,
  input::SourceWrapper,
  model::ModelWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

/// 持续采集、推理并合成检测结果，Ctrl-C 退出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,

  /// 处理帧率，0 表示不限制
  #[arg(long, default_value = "0", value_name = "FPS")]
  pub pipeline_fps: u32,

  /// 采集帧率，不设置时使用输入源自带的帧率
  #[arg(long, value_name = "FPS")]
  pub camera_fps: Option<u32>,

  /// 原始帧输出路径，按采集帧率写入未经处理的画面
  #[arg(long, value_name = "OUTPUT")]
  pub raw_output: Option<Url>,

  /// 处理指定帧数后退出
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frames: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let pipeline = &args.pipeline;

  info!("模型来源: {}", pipeline.model);
  info!("输入来源: {}", pipeline.input);
  info!("输出路径: {}", pipeline.output);

  let settings = pipeline.settings().context("参数无效")?;
  let input = SourceWrapper::from_url(&pipeline.input).context("无法创建输入源")?;
  let model = ModelWrapper::from_url(&pipeline.model).context("无法加载模型")?;
  let output = OutputWrapper::from_url(&pipeline.output).context("无法创建输出")?;
  let raw_output = args
    .raw_output
    .as_ref()
    .map(|url| {
      info!("原始帧输出路径: {}", url);
      OutputWrapper::from_url(url)
    })
    .transpose()
    .context("无法创建原始帧输出")?;

  ContinuousTask::new(settings)
    .with_frame_number(args.frames)
    .with_pipeline_fps(args.pipeline_fps)
    .with_camera_fps(args.camera_fps)
    .with_raw_output(raw_output)
    .run_task(input, model, output)?;

  Ok(())
}
