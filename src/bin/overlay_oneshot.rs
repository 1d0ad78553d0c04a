// 该文件是 Fuguang （浮光） 项目的一部分。
// src/bin/overlay_oneshot.rs - 单帧检测叠加
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

use fuguang::{
  FromUrl,
  args::PipelineArgs,
  input::SourceWrapper,
  model::ModelWrapper,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};

/// 取一帧，推理并把检测结果合成到画面上
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,
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

  OneShotTask::new(settings).run_task(input, model, output)?;

  Ok(())
}
