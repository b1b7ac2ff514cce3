// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/geometry.rs - 边界框几何运算
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
  #[error("横坐标顺序错误: x_min={0}, x_max={1}")]
  InvertedX(f64, f64),
  #[error("纵坐标顺序错误: y_min={0}, y_max={1}")]
  InvertedY(f64, f64),
  #[error("坐标不是有限数值")]
  NonFinite,
  #[error("置信度超出 [0, 1] 范围: {0}")]
  ConfidenceOutOfRange(f32),
  #[error("缩放因子必须位于 (0, 1] 区间: {0}")]
  InvalidScale(f64),
}

fn check_confidence(confidence: f32) -> Result<(), GeometryError> {
  // NaN 也会被拒绝
  if (0.0..=1.0).contains(&confidence) {
    Ok(())
  } else {
    Err(GeometryError::ConfidenceOutOfRange(confidence))
  }
}

/// 原始分辨率下的轴对齐边界框，坐标为整数像素
///
/// 构造时校验 `x_min <= x_max`、`y_min <= y_max` 以及置信度范围，之后不可修改。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BBoxRepr", into = "BBoxRepr")]
pub struct BBox {
  x_min: u32,
  y_min: u32,
  x_max: u32,
  y_max: u32,
  confidence: f32,
}

#[derive(Serialize, Deserialize)]
struct BBoxRepr {
  x_min: u32,
  y_min: u32,
  x_max: u32,
  y_max: u32,
  confidence: f32,
}

impl TryFrom<BBoxRepr> for BBox {
  type Error = GeometryError;

  fn try_from(repr: BBoxRepr) -> Result<Self, Self::Error> {
    BBox::new(repr.x_min, repr.y_min, repr.x_max, repr.y_max, repr.confidence)
  }
}

impl From<BBox> for BBoxRepr {
  fn from(bbox: BBox) -> Self {
    BBoxRepr {
      x_min: bbox.x_min,
      y_min: bbox.y_min,
      x_max: bbox.x_max,
      y_max: bbox.y_max,
      confidence: bbox.confidence,
    }
  }
}

impl BBox {
  pub fn new(
    x_min: u32,
    y_min: u32,
    x_max: u32,
    y_max: u32,
    confidence: f32,
  ) -> Result<Self, GeometryError> {
    if x_min > x_max {
      return Err(GeometryError::InvertedX(x_min.into(), x_max.into()));
    }
    if y_min > y_max {
      return Err(GeometryError::InvertedY(y_min.into(), y_max.into()));
    }
    check_confidence(confidence)?;
    Ok(Self {
      x_min,
      y_min,
      x_max,
      y_max,
      confidence,
    })
  }

  pub fn x_min(&self) -> u32 {
    self.x_min
  }

  pub fn y_min(&self) -> u32 {
    self.y_min
  }

  pub fn x_max(&self) -> u32 {
    self.x_max
  }

  pub fn y_max(&self) -> u32 {
    self.y_max
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn width(&self) -> u32 {
    self.x_max - self.x_min
  }

  pub fn height(&self) -> u32 {
    self.y_max - self.y_min
  }

  /// `(x_max - x_min) * (y_max - y_min)`，恒为非负
  pub fn area(&self) -> u64 {
    u64::from(self.width()) * u64::from(self.height())
  }

  /// 同时包含两个框的最小框
  ///
  /// 结果沿用 `self` 的置信度，合并后的置信度由调用方决定。
  pub fn union(&self, other: &BBox) -> BBox {
    BBox {
      x_min: self.x_min.min(other.x_min),
      y_min: self.y_min.min(other.y_min),
      x_max: self.x_max.max(other.x_max),
      y_max: self.y_max.max(other.y_max),
      confidence: self.confidence,
    }
  }

  /// `min(y_max) - max(y_min)`：正数表示纵向重叠，非正数表示分离或相接
  pub fn vertical_overlap(&self, other: &BBox) -> i64 {
    i64::from(self.y_max.min(other.y_max)) - i64::from(self.y_min.max(other.y_min))
  }

  pub fn contains(&self, other: &BBox) -> bool {
    self.x_min <= other.x_min
      && self.y_min <= other.y_min
      && self.x_max >= other.x_max
      && self.y_max >= other.y_max
  }

  pub fn with_confidence(self, confidence: f32) -> Result<Self, GeometryError> {
    check_confidence(confidence)?;
    Ok(Self { confidence, ..self })
  }

  // 仅用于聚合结果，输入均已校验
  pub(crate) fn with_confidence_clamped(self, confidence: f32) -> Self {
    Self {
      confidence: confidence.clamp(0.0, 1.0),
      ..self
    }
  }
}

/// 推理分辨率下的原始检测框，浮点坐标
///
/// 协作模型直接产出此类型。坐标可以为负或超出画面，裁剪在 [`ScaleTransform::rescale`] 中完成。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoxRepr", into = "RawBoxRepr")]
pub struct RawBox {
  x_min: f32,
  y_min: f32,
  x_max: f32,
  y_max: f32,
  confidence: f32,
}

#[derive(Serialize, Deserialize)]
struct RawBoxRepr {
  x_min: f32,
  y_min: f32,
  x_max: f32,
  y_max: f32,
  confidence: f32,
}

impl TryFrom<RawBoxRepr> for RawBox {
  type Error = GeometryError;

  fn try_from(repr: RawBoxRepr) -> Result<Self, Self::Error> {
    RawBox::new(repr.x_min, repr.y_min, repr.x_max, repr.y_max, repr.confidence)
  }
}

impl From<RawBox> for RawBoxRepr {
  fn from(raw: RawBox) -> Self {
    RawBoxRepr {
      x_min: raw.x_min,
      y_min: raw.y_min,
      x_max: raw.x_max,
      y_max: raw.y_max,
      confidence: raw.confidence,
    }
  }
}

impl RawBox {
  pub fn new(
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
    confidence: f32,
  ) -> Result<Self, GeometryError> {
    if ![x_min, y_min, x_max, y_max].iter().all(|v| v.is_finite()) {
      return Err(GeometryError::NonFinite);
    }
    if x_min > x_max {
      return Err(GeometryError::InvertedX(x_min.into(), x_max.into()));
    }
    if y_min > y_max {
      return Err(GeometryError::InvertedY(y_min.into(), y_max.into()));
    }
    check_confidence(confidence)?;
    Ok(Self {
      x_min,
      y_min,
      x_max,
      y_max,
      confidence,
    })
  }

  /// 多边形（通常是 OCR 给出的四个角点）的外接框
  pub fn enclosing(points: &[(f32, f32)], confidence: f32) -> Result<Self, GeometryError> {
    if points.is_empty() {
      return Err(GeometryError::NonFinite);
    }
    let (mut x_min, mut y_min) = (f32::INFINITY, f32::INFINITY);
    let (mut x_max, mut y_max) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for &(x, y) in points {
      x_min = x_min.min(x);
      y_min = y_min.min(y);
      x_max = x_max.max(x);
      y_max = y_max.max(y);
    }
    RawBox::new(x_min, y_min, x_max, y_max, confidence)
  }

  pub fn x_min(&self) -> f32 {
    self.x_min
  }

  pub fn y_min(&self) -> f32 {
    self.y_min
  }

  pub fn x_max(&self) -> f32 {
    self.x_max
  }

  pub fn y_max(&self) -> f32 {
    self.y_max
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn width(&self) -> f32 {
    self.x_max - self.x_min
  }

  pub fn height(&self) -> f32 {
    self.y_max - self.y_min
  }

  /// 所有坐标乘以 `factor`，`factor` 必须为正
  pub fn scaled(&self, factor: f32) -> Result<RawBox, GeometryError> {
    if !(factor.is_finite() && factor > 0.0) {
      return Err(GeometryError::InvalidScale(factor.into()));
    }
    RawBox::new(
      self.x_min * factor,
      self.y_min * factor,
      self.x_max * factor,
      self.y_max * factor,
      self.confidence,
    )
  }
}

/// 推理前缩小图像所用的比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTransform {
  scale_factor: f64,
}

impl Default for ScaleTransform {
  fn default() -> Self {
    Self::IDENTITY
  }
}

impl ScaleTransform {
  pub const IDENTITY: ScaleTransform = ScaleTransform { scale_factor: 1.0 };

  pub fn new(scale_factor: f64) -> Result<Self, GeometryError> {
    if scale_factor.is_finite() && scale_factor > 0.0 && scale_factor <= 1.0 {
      Ok(Self { scale_factor })
    } else {
      Err(GeometryError::InvalidScale(scale_factor))
    }
  }

  /// 长边不超过 `max_side` 时不缩放，否则按 `max_side / 长边` 缩小；`max_side == 0` 表示关闭
  pub fn fit(width: u32, height: u32, max_side: u32) -> Self {
    let longest = width.max(height);
    if max_side == 0 || longest <= max_side {
      return Self::IDENTITY;
    }
    Self {
      scale_factor: f64::from(max_side) / f64::from(longest),
    }
  }

  pub fn scale_factor(&self) -> f64 {
    self.scale_factor
  }

  pub fn is_identity(&self) -> bool {
    self.scale_factor == 1.0
  }

  /// 推理分辨率，向下取整且至少为 1 像素
  pub fn working_size(&self, width: u32, height: u32) -> (u32, u32) {
    let scale = |v: u32| ((f64::from(v) * self.scale_factor) as u32).max(1);
    (scale(width), scale(height))
  }

  /// 把推理分辨率下的框映射回原始分辨率
  ///
  /// 每个坐标乘以 `1 / scale_factor` 后截断为整数，再裁剪到 `[0, W] x [0, H]`。
  /// 裁剪后宽或高为零的框依然保留。
  pub fn rescale(&self, raw: &RawBox, original_width: u32, original_height: u32) -> BBox {
    let map = |v: f32, bound: u32| -> u32 {
      let v = (f64::from(v) / self.scale_factor).trunc();
      v.clamp(0.0, f64::from(bound)) as u32
    };
    // 映射单调，原有的坐标顺序保持不变
    BBox {
      x_min: map(raw.x_min, original_width),
      y_min: map(raw.y_min, original_height),
      x_max: map(raw.x_max, original_width),
      y_max: map(raw.y_max, original_height),
      confidence: raw.confidence,
    }
  }
}

/// 以 `scale_factor` 把框映射回原始分辨率
pub fn rescale(
  raw: &RawBox,
  scale_factor: f64,
  original_width: u32,
  original_height: u32,
) -> Result<BBox, GeometryError> {
  Ok(ScaleTransform::new(scale_factor)?.rescale(raw, original_width, original_height))
}

/// 截断并裁剪到画面内，不做缩放
pub fn clip(raw: &RawBox, width: u32, height: u32) -> BBox {
  ScaleTransform::IDENTITY.rescale(raw, width, height)
}
