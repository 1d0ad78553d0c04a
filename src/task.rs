// 该文件是 Fuguang （浮光） 项目的一部分。
// src/task.rs - 任务调度
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

use std::{
  thread,
  time::{Duration, Instant},
};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  ConfigError,
  frame::{FromRgbImage, RgbaFrame},
  input::{FrameSource, InputError},
  model::{DecodeConfig, DecodeError, DetectResult, Detection, Model, OutputDecoder, label_name},
  output::{CompositeConfig, OutputWrapper, Render, ResultCompositor},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 帧率门限
///
/// 帧率为 0 时总是放行；否则距上次放行至少经过 `1/fps` 秒才再次放行。
/// 计时从创建时开始，因此限速时第一次放行在一个间隔之后。
#[derive(Debug, Clone)]
pub struct FrameRateGate {
  interval: Option<Duration>,
  last: Instant,
}

impl FrameRateGate {
  pub fn new(fps: u32) -> Self {
    Self::new_at(fps, Instant::now())
  }

  pub fn new_at(fps: u32, now: Instant) -> Self {
    Self {
      interval: Self::interval_of(fps),
      last: now,
    }
  }

  fn interval_of(fps: u32) -> Option<Duration> {
    (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64))
  }

  /// 运行时调整帧率，不重置计时
  pub fn set_frame_rate(&mut self, fps: u32) {
    self.interval = Self::interval_of(fps);
  }

  /// 当前帧率，不限制时为 0
  pub fn frame_rate(&self) -> u32 {
    self
      .interval
      .map(|i| (1.0 / i.as_secs_f64()).round() as u32)
      .unwrap_or(0)
  }

  pub fn should_update(&mut self) -> bool {
    self.should_update_at(Instant::now())
  }

  pub fn should_update_at(&mut self, now: Instant) -> bool {
    let Some(interval) = self.interval else {
      return true;
    };
    if now.saturating_duration_since(self.last) < interval {
      return false;
    }
    self.last = now;
    true
  }
}

/// 单帧处理失败的原因
#[derive(Error, Debug)]
pub enum TickError {
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("推理错误: {0}")]
  Infer(anyhow::Error),
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("渲染错误: {0}")]
  Render(anyhow::Error),
}

impl TickError {
  /// 形状错误说明模型与配置不匹配，继续处理没有意义
  pub fn is_fatal(&self) -> bool {
    matches!(self, TickError::Decode(_))
  }
}

/// 管线参数，输入尺寸在运行时取自模型
#[derive(Debug, Clone)]
pub struct PipelineSettings {
  pub class_count: usize,
  pub threshold: f32,
  pub composite: CompositeConfig,
}

/// 推理、解码、合成、渲染
pub struct Pipeline {
  decoder: OutputDecoder,
  config: DecodeConfig,
  compositor: ResultCompositor,
}

impl Pipeline {
  /// 边框粗细以解码阈值为基准，合成配置中的阈值被覆盖
  pub fn new(
    settings: &PipelineSettings,
    (width, height): (u32, u32),
  ) -> Result<Self, ConfigError> {
    let config = DecodeConfig::new(settings.class_count, settings.threshold, width, height)?;
    let mut composite = settings.composite.clone();
    composite.threshold = settings.threshold;
    Ok(Self {
      decoder: OutputDecoder::new(),
      config,
      compositor: ResultCompositor::new(composite),
    })
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.config.input_width, self.config.input_height)
  }

  pub fn tick<M, O>(
    &mut self,
    model: &M,
    output: &O,
    image: &RgbImage,
  ) -> Result<DetectResult, TickError>
  where
    M: Model<Input = RgbImage>,
    M::Error: std::error::Error + Send + Sync + 'static,
    O: Render<RgbaFrame, DetectResult>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let infer = model
      .infer(image)
      .map_err(|e| TickError::Infer(e.into()))?;
    let detections: Vec<Detection> = self
      .decoder
      .decode(&infer.boxes, infer.prototypes.as_ref(), &self.config)?
      .collect();
    let result = DetectResult::summarize(&detections);

    let mut frame = RgbaFrame::from_rgb_image(image);
    let composed = self.compositor.composite(detections, &mut frame);
    output
      .render_result(composed, &result)
      .map_err(|e| TickError::Render(e.into()))?;
    Ok(result)
  }
}

fn log_result(result: &DetectResult) {
  for item in result.items.iter() {
    let label = label_name(item.class_id)
      .map(str::to_string)
      .unwrap_or_else(|| item.class_id.to_string());
    info!(
      "检测到 {} ({:.2}) @ [{:.1}, {:.1}, {:.1}, {:.1}]",
      label, item.score, item.rect.x, item.rect.y, item.rect.width, item.rect.height
    );
  }
}

pub struct OneShotTask {
  settings: PipelineSettings,
}

impl OneShotTask {
  pub fn new(settings: PipelineSettings) -> Self {
    Self { settings }
  }
}

impl<I, M, O> Task<I, M, O> for OneShotTask
where
  I: FrameSource,
  M: Model<Input = RgbImage>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<RgbaFrame, DetectResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut pipeline = Pipeline::new(&self.settings, model.input_size())?;
    let (width, height) = pipeline.input_size();

    input.start()?;
    let frame = input.processed_frame(width, height);
    input.stop();
    let frame = frame?;
    info!("输入帧获取成功，开始推理...");

    let now = Instant::now();
    let result = pipeline.tick(&model, &output, &frame)?;
    info!(
      "处理完成，耗时: {:.2?}，共 {} 个目标",
      now.elapsed(),
      result.len()
    );
    log_result(&result);

    Ok(())
  }
}

/// 持续处理任务
///
/// 采集按采集帧率取原始帧，处理按处理帧率取当前帧。
/// 设置了原始输出时，每次采集到的原始帧都会原样送入该输出。
#[derive(Debug, Clone)]
pub struct ContinuousTask<R = OutputWrapper> {
  settings: PipelineSettings,
  frame_number: Option<usize>,
  pipeline_fps: u32,
  camera_fps: Option<u32>,
  raw_output: Option<R>,
}

impl ContinuousTask {
  pub fn new(settings: PipelineSettings) -> Self {
    Self {
      settings,
      frame_number: None,
      pipeline_fps: 0,
      camera_fps: None,
      raw_output: None,
    }
  }
}

impl<R> ContinuousTask<R> {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_pipeline_fps(mut self, fps: u32) -> Self {
    self.pipeline_fps = fps;
    self
  }

  /// 未设置时使用输入源自带的帧率
  pub fn with_camera_fps(mut self, fps: Option<u32>) -> Self {
    self.camera_fps = fps;
    self
  }

  pub fn with_raw_output<T>(self, raw_output: Option<T>) -> ContinuousTask<T> {
    ContinuousTask {
      settings: self.settings,
      frame_number: self.frame_number,
      pipeline_fps: self.pipeline_fps,
      camera_fps: self.camera_fps,
      raw_output,
    }
  }
}

fn install_interrupt_handler() -> Result<std::sync::mpsc::Receiver<()>, ctrlc::Error> {
  let (tx, rx) = std::sync::mpsc::channel();

  let installed = ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  });
  match installed {
    Ok(()) => {}
    Err(ctrlc::Error::MultipleHandlers) => warn!("中断信号处理已安装，沿用已有处理"),
    Err(e) => return Err(e),
  }
  Ok(rx)
}

impl<I, M, O, R> Task<I, M, O> for ContinuousTask<R>
where
  I: FrameSource,
  M: Model<Input = RgbImage>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<RgbaFrame, DetectResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
  R: Render<RgbaFrame, DetectResult>,
  R::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut pipeline = Pipeline::new(&self.settings, model.input_size())?;
    let (width, height) = pipeline.input_size();
    let rx = install_interrupt_handler()?;

    input.start()?;
    let camera_fps = self.camera_fps.or(input.frame_rate()).unwrap_or(0);
    let mut camera_gate = FrameRateGate::new(camera_fps);
    let mut pipeline_gate = FrameRateGate::new(self.pipeline_fps);
    info!(
      "采集帧率: {}，处理帧率: {}",
      camera_fps, self.pipeline_fps
    );

    let mut frame_index = 0usize;
    let mut skipped = 0usize;
    loop {
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if let Some(n) = self.frame_number
        && frame_index >= n
      {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }

      let now = Instant::now();
      if camera_gate.should_update_at(now) {
        match input.raw_frame() {
          Ok(raw) => {
            if let Some(raw_output) = self.raw_output.as_ref() {
              let frame = RgbaFrame::from_rgb_image(&raw);
              if let Err(e) = raw_output.render_result(&frame, &DetectResult::default()) {
                warn!("原始帧输出失败: {}", e);
              }
            }
          }
          Err(e) => warn!("采集失败: {}", e),
        }
      }

      if !pipeline_gate.should_update_at(now) {
        thread::sleep(Duration::from_millis(1));
        continue;
      }

      frame_index += 1;
      let tick = input
        .processed_frame(width, height)
        .map_err(TickError::from)
        .and_then(|frame| pipeline.tick(&model, &output, &frame));
      match tick {
        Ok(result) => debug!(
          "第 {} 帧完成，耗时: {:.2?}，{} 个目标",
          frame_index,
          now.elapsed(),
          result.len()
        ),
        Err(e) if e.is_fatal() => {
          input.stop();
          return Err(e.into());
        }
        Err(e) => {
          skipped += 1;
          error!("第 {} 帧处理失败，跳过: {}", frame_index, e);
        }
      }
    }

    input.stop();
    info!("任务完成，共 {} 帧，跳过 {} 帧", frame_index, skipped);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{InferOutput, RawTensor},
    output::CompositeMode,
  };
  use std::cell::RefCell;

  #[test]
  fn test_gate_zero_fps_always_open() {
    let mut gate = FrameRateGate::new(0);
    let now = Instant::now();
    assert!((0..5).all(|_| gate.should_update_at(now)));
  }

  #[test]
  fn test_gate_cadence() {
    let start = Instant::now();
    let mut gate = FrameRateGate::new_at(10, start);
    // 计时从创建开始，满一个间隔才第一次放行
    assert!(!gate.should_update_at(start));
    assert!(!gate.should_update_at(start + Duration::from_millis(50)));
    assert!(gate.should_update_at(start + Duration::from_millis(100)));
    assert!(!gate.should_update_at(start + Duration::from_millis(150)));
    assert!(gate.should_update_at(start + Duration::from_millis(260)));
  }

  #[test]
  fn test_gate_set_frame_rate() {
    let start = Instant::now();
    let mut gate = FrameRateGate::new_at(10, start);
    assert_eq!(gate.frame_rate(), 10);

    gate.set_frame_rate(0);
    assert_eq!(gate.frame_rate(), 0);
    assert!(gate.should_update_at(start));

    gate.set_frame_rate(2);
    assert_eq!(gate.frame_rate(), 2);
    assert!(!gate.should_update_at(start + Duration::from_millis(400)));
    assert!(gate.should_update_at(start + Duration::from_millis(500)));
  }

  struct StaticSource {
    started: bool,
    starts: usize,
  }

  impl FrameSource for StaticSource {
    fn start(&mut self) -> Result<(), InputError> {
      self.started = true;
      self.starts += 1;
      Ok(())
    }

    fn stop(&mut self) {
      self.started = false;
    }

    fn raw_frame(&mut self) -> Result<RgbImage, InputError> {
      if !self.started {
        return Err(InputError::NotStarted);
      }
      Ok(RgbImage::new(16, 12))
    }

    fn processed_frame(&mut self, width: u32, height: u32) -> Result<RgbImage, InputError> {
      if !self.started {
        return Err(InputError::NotStarted);
      }
      Ok(RgbImage::new(width, height))
    }
  }

  struct FixedModel {
    features: usize,
  }

  impl Model for FixedModel {
    type Input = RgbImage;
    type Error = std::io::Error;

    fn input_size(&self) -> (u32, u32) {
      (8, 8)
    }

    fn infer(&self, _input: &RgbImage) -> Result<InferOutput, Self::Error> {
      // 一个单元，类别 0 得分 0.9，中心 (4, 4)，尺寸 4x4
      let mut data = vec![4.0, 4.0, 4.0, 4.0];
      data.extend(std::iter::repeat_n(0.0, self.features - 4));
      data[4] = 0.9;
      Ok(InferOutput {
        boxes: RawTensor::from_cells(1, self.features, data).unwrap(),
        prototypes: None,
      })
    }
  }

  #[derive(Default)]
  struct Collect {
    results: RefCell<Vec<(u32, u32, usize)>>,
    /// 每帧非黑像素数
    painted: RefCell<Vec<usize>>,
    fail: bool,
  }

  impl Render<RgbaFrame, DetectResult> for &Collect {
    type Error = std::io::Error;

    fn render_result(&self, frame: &RgbaFrame, result: &DetectResult) -> Result<(), Self::Error> {
      if self.fail {
        return Err(std::io::Error::other("sink closed"));
      }
      self
        .results
        .borrow_mut()
        .push((frame.width(), frame.height(), result.len()));
      let painted = frame
        .as_image()
        .pixels()
        .filter(|p| p.0[..3] != [0, 0, 0])
        .count();
      self.painted.borrow_mut().push(painted);
      Ok(())
    }
  }

  fn settings(class_count: usize) -> PipelineSettings {
    PipelineSettings {
      class_count,
      threshold: 0.5,
      composite: CompositeConfig::default(),
    }
  }

  #[test]
  fn test_stroke_width_follows_decode_threshold() {
    let settings = PipelineSettings {
      class_count: 2,
      threshold: 0.3,
      composite: CompositeConfig::new(CompositeMode::Overlay, 0.95).unwrap(),
    };
    let mut pipeline = Pipeline::new(&settings, (8, 8)).unwrap();
    assert_eq!(pipeline.compositor.config().threshold, 0.3);

    let sink = Collect::default();
    let result = pipeline
      .tick(&FixedModel { features: 6 }, &&sink, &RgbImage::new(8, 8))
      .unwrap();
    assert_eq!(result.len(), 1);
    // 得分 0.9 在阈值 0.3 下画出边框，阈值 0.95 时边框粗细为 0
    assert!(sink.painted.borrow()[0] > 0);
  }

  #[test]
  fn test_one_shot() {
    let sink = Collect::default();
    let source = StaticSource {
      started: false,
      starts: 0,
    };
    OneShotTask::new(settings(2))
      .run_task(source, FixedModel { features: 6 }, &sink)
      .unwrap();
    assert_eq!(*sink.results.borrow(), vec![(8, 8, 1)]);
  }

  #[test]
  fn test_continuous_frame_limit_and_skips() {
    let sink = Collect::default();
    let source = StaticSource {
      started: false,
      starts: 0,
    };
    ContinuousTask::new(settings(2))
      .with_frame_number(Some(3))
      .run_task(source, FixedModel { features: 6 }, &sink)
      .unwrap();
    assert_eq!(sink.results.borrow().len(), 3);

    // 渲染失败的帧被跳过，任务正常结束
    let failing = Collect {
      fail: true,
      ..Collect::default()
    };
    let source = StaticSource {
      started: false,
      starts: 0,
    };
    ContinuousTask::new(settings(2))
      .with_frame_number(Some(2))
      .run_task(source, FixedModel { features: 6 }, &failing)
      .unwrap();
  }

  #[test]
  fn test_continuous_raw_output_cadence() {
    let sink = Collect::default();
    let raw = Collect::default();
    let source = StaticSource {
      started: false,
      starts: 0,
    };
    // 采集不限速，处理每 20ms 一帧
    ContinuousTask::new(settings(2))
      .with_frame_number(Some(3))
      .with_pipeline_fps(50)
      .with_camera_fps(Some(0))
      .with_raw_output(Some(&raw))
      .run_task(source, FixedModel { features: 6 }, &sink)
      .unwrap();

    assert_eq!(*sink.results.borrow(), vec![(8, 8, 1); 3]);
    let raw_results = raw.results.borrow();
    assert!(raw_results.len() > 3, "原始帧 {} 帧", raw_results.len());
    assert!(raw_results.iter().all(|r| *r == (16, 12, 0)));
  }

  #[test]
  fn test_continuous_aborts_on_shape_error() {
    let sink = Collect::default();
    let source = StaticSource {
      started: false,
      starts: 0,
    };
    // 6 个特征放不下 4 个类别
    let err = ContinuousTask::new(settings(4))
      .with_frame_number(Some(5))
      .run_task(source, FixedModel { features: 6 }, &sink)
      .unwrap_err();
    assert!(err.downcast_ref::<TickError>().is_some());
    assert!(sink.results.borrow().is_empty());
  }

  #[test]
  fn test_invalid_settings_fail_before_start() {
    let sink = Collect::default();
    let mut source = StaticSource {
      started: false,
      starts: 0,
    };
    let err = OneShotTask::new(settings(0))
      .run_task(&mut source, FixedModel { features: 6 }, &sink)
      .unwrap_err();
    assert!(err.downcast_ref::<ConfigError>().is_some());
    assert_eq!(source.starts, 0);
  }
}
