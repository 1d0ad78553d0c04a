// 该文件是 Fuguang （浮光） 项目的一部分。
// src/output/compositor.rs - 检测结果合成
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

use std::{fmt, str::FromStr};

use image::{Rgb, Rgba};
use tracing::debug;

use crate::{
  ConfigError,
  frame::RgbaFrame,
  model::Detection,
  output::{
    draw::draw_outline,
    mask::{DEFAULT_MASK_INTENSITY, DEFAULT_MASK_THRESHOLD, blend_mask_onto, stamp_mask_onto},
  },
};

/// 红、绿、蓝、青、品红、黄，按类别编号循环取用
pub const DEFAULT_PALETTE: [Rgb<u8>; 6] = [
  Rgb([255, 0, 0]),
  Rgb([0, 255, 0]),
  Rgb([0, 0, 255]),
  Rgb([0, 255, 255]),
  Rgb([255, 0, 255]),
  Rgb([255, 235, 4]),
];

pub const DEFAULT_BOX_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeMode {
  /// 直接画在源帧上
  #[default]
  Overlay,
  /// 画在单独的透明帧上，源帧不变
  Transparent,
}

impl FromStr for CompositeMode {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "overlay" => Ok(CompositeMode::Overlay),
      "transparent" => Ok(CompositeMode::Transparent),
      other => Err(ConfigError::UnknownMode(other.to_string())),
    }
  }
}

impl fmt::Display for CompositeMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CompositeMode::Overlay => write!(f, "overlay"),
      CompositeMode::Transparent => write!(f, "transparent"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeConfig {
  pub mode: CompositeMode,
  /// 边框粗细为 floor(score / threshold)
  pub threshold: f32,
  pub mask_intensity: f32,
  pub mask_threshold: f32,
  pub max_stroke_width: Option<u32>,
  pub palette: Vec<Rgb<u8>>,
}

impl Default for CompositeConfig {
  fn default() -> Self {
    Self {
      mode: CompositeMode::default(),
      threshold: DEFAULT_BOX_THRESHOLD,
      mask_intensity: DEFAULT_MASK_INTENSITY,
      mask_threshold: DEFAULT_MASK_THRESHOLD,
      max_stroke_width: None,
      palette: DEFAULT_PALETTE.to_vec(),
    }
  }
}

impl CompositeConfig {
  pub fn new(mode: CompositeMode, threshold: f32) -> Result<Self, ConfigError> {
    if !(0.0..=1.0).contains(&threshold) {
      return Err(ConfigError::InvalidValue(
        "threshold".to_string(),
        format!("阈值 {} 不在 [0, 1] 范围内", threshold),
      ));
    }
    Ok(Self {
      mode,
      threshold,
      ..Self::default()
    })
  }

  pub fn with_max_stroke_width(mut self, max_stroke_width: Option<u32>) -> Self {
    self.max_stroke_width = max_stroke_width;
    self
  }

  pub fn with_palette(mut self, palette: Vec<Rgb<u8>>) -> Result<Self, ConfigError> {
    if palette.is_empty() {
      return Err(ConfigError::InvalidValue(
        "palette".to_string(),
        "调色板不能为空".to_string(),
      ));
    }
    self.palette = palette;
    Ok(self)
  }

  pub fn color(&self, class_id: u32) -> Rgb<u8> {
    self.palette[class_id as usize % self.palette.len()]
  }

  /// 得分越高边框越粗；阈值为 0 时固定为 1
  pub fn stroke_width(&self, score: f32) -> i32 {
    let width = if self.threshold > 0.0 {
      (score / self.threshold).floor() as i32
    } else {
      1
    };
    match self.max_stroke_width {
      Some(max) => width.min(max as i32),
      None => width,
    }
  }
}

/// 检测结果合成器
///
/// 透明模式下保留上一帧的输出缓冲，尺寸不变时清空后复用。
pub struct ResultCompositor {
  config: CompositeConfig,
  canvas: Option<RgbaFrame>,
}

impl ResultCompositor {
  pub fn new(config: CompositeConfig) -> Self {
    Self {
      config,
      canvas: None,
    }
  }

  pub fn config(&self) -> &CompositeConfig {
    &self.config
  }

  /// 只能在两次合成之间修改
  pub fn config_mut(&mut self) -> &mut CompositeConfig {
    &mut self.config
  }

  /// 按输入顺序渲染每个检测，先掩膜后边框；掩膜在渲染后立即释放
  pub fn composite<'a, I>(&'a mut self, detections: I, source: &'a mut RgbaFrame) -> &'a RgbaFrame
  where
    I: IntoIterator<Item = Detection>,
  {
    let Self { config, canvas } = self;
    let mut count = 0usize;

    let output = match config.mode {
      CompositeMode::Overlay => {
        for detection in detections {
          render_overlay(config, detection, source);
          count += 1;
        }
        &*source
      }
      CompositeMode::Transparent => {
        let canvas = prepare_canvas(canvas, source.dimensions());
        for detection in detections {
          render_transparent(config, detection, canvas);
          count += 1;
        }
        &*canvas
      }
    };

    debug!("合成 {} 个检测结果, 模式: {}", count, config.mode);
    output
  }
}

fn prepare_canvas(canvas: &mut Option<RgbaFrame>, (width, height): (u32, u32)) -> &mut RgbaFrame {
  match canvas {
    Some(frame) if frame.dimensions() == (width, height) => {
      frame.clear();
    }
    _ => {
      debug!("分配透明输出缓冲: {}x{}", width, height);
      *canvas = Some(RgbaFrame::new(width, height));
    }
  }
  canvas.get_or_insert_with(|| RgbaFrame::new(width, height))
}

fn render_overlay(config: &CompositeConfig, detection: Detection, frame: &mut RgbaFrame) {
  let (item, mask) = detection.into_parts();
  let color = config.color(item.class_id);

  if let Some(mask) = mask {
    blend_mask_onto(frame, &mask, color, config.mask_intensity);
  }
  draw_outline(
    frame,
    item.rect,
    opaque(color),
    config.stroke_width(item.score),
    false,
    true,
  );
}

fn render_transparent(config: &CompositeConfig, detection: Detection, frame: &mut RgbaFrame) {
  let (item, mask) = detection.into_parts();
  let color = config.color(item.class_id);

  if let Some(mask) = mask {
    stamp_mask_onto(frame, &mask, color, config.mask_threshold);
  }
  draw_outline(
    frame,
    item.rect,
    opaque(color),
    config.stroke_width(item.score),
    false,
    true,
  );
}

fn opaque(Rgb([r, g, b]): Rgb<u8>) -> Rgba<u8> {
  Rgba([r, g, b, 255])
}
