// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/frame.rs - 推理帧定义
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
use image::imageops::{self, FilterType};
use tracing::debug;

use crate::geometry::ScaleTransform;
use crate::input::SourceImage;
use crate::record::ImageSize;

/// 送入模型的帧，分辨率可能低于原图
#[derive(Debug, Clone)]
pub struct WorkingFrame {
  image_id: String,
  original_size: ImageSize,
  scale: ScaleTransform,
  image: RgbImage,
}

impl WorkingFrame {
  /// 长边超过 `max_side` 时用三角滤波缩小，`max_side == 0` 时保持原尺寸
  pub fn from_source(source: &SourceImage, max_side: u32) -> Self {
    let size = source.size();
    let scale = ScaleTransform::fit(size.width, size.height, max_side);
    let image = if scale.is_identity() {
      source.image().clone()
    } else {
      let (w, h) = scale.working_size(size.width, size.height);
      debug!(
        "缩小 {}: {}x{} -> {}x{}",
        source.image_id(),
        size.width,
        size.height,
        w,
        h
      );
      imageops::resize(source.image(), w, h, FilterType::Triangle)
    };

    Self {
      image_id: source.image_id().to_string(),
      original_size: size,
      scale,
      image,
    }
  }

  pub fn new(
    image_id: impl Into<String>,
    original_size: ImageSize,
    scale: ScaleTransform,
    image: RgbImage,
  ) -> Self {
    Self {
      image_id: image_id.into(),
      original_size,
      scale,
      image,
    }
  }

  pub fn image_id(&self) -> &str {
    &self.image_id
  }

  pub fn original_size(&self) -> ImageSize {
    self.original_size
  }

  pub fn scale(&self) -> ScaleTransform {
    self.scale
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}
