// 该文件是 Fuguang （浮光） 项目的一部分。
// src/geometry.rs - 矩形坐标计算
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

/// 以左下（或左上）角为原点的浮点矩形
///
/// 与纹理矩形语义一致：设置 `x_max`/`y_max` 时以当前的 `x`/`y` 重新推导宽高，
/// 而修改 `x`/`y` 不会改变宽高。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl Rect {
  pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由中心点与尺寸构造，左上角坐标可能为负
  pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
    Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
  }

  pub fn x_max(&self) -> f32 {
    self.x + self.width
  }

  pub fn y_max(&self) -> f32 {
    self.y + self.height
  }

  pub fn set_x_max(&mut self, x_max: f32) {
    self.width = x_max - self.x;
  }

  pub fn set_y_max(&mut self, y_max: f32) {
    self.height = y_max - self.y;
  }

  /// 最小角钳制到 0，宽高保持不变
  pub fn clamp_min_to_origin(mut self) -> Self {
    self.x = self.x.max(0.0);
    self.y = self.y.max(0.0);
    self
  }

  /// 最大角钳制到给定范围，只截断超出的一侧
  pub fn cap_max(mut self, max_x: f32, max_y: f32) -> Self {
    if self.x_max() > max_x {
      self.set_x_max(max_x);
    }
    if self.y_max() > max_y {
      self.set_y_max(max_y);
    }
    self
  }

  /// 沿 y 轴翻转到高度为 `extent` 的坐标系
  pub fn invert_y(mut self, extent: f32) -> Self {
    self.y = -self.y + extent - self.height;
    self
  }

  /// 归一化坐标转换为像素坐标
  pub fn scale(self, sx: f32, sy: f32) -> Self {
    Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
  }

  /// 宽或高不为正时视为退化矩形
  pub fn is_degenerate(&self) -> bool {
    self.width <= 0.0 || self.height <= 0.0
  }

  /// [x_min, y_min, x_max, y_max]
  pub fn to_corners(&self) -> [f32; 4] {
    [self.x, self.y, self.x_max(), self.y_max()]
  }
}
