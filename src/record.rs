// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/record.rs - 单张图片的检测记录
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

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::BBox;
use crate::grouping::Banner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
  pub width: u32,
  pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
  pub people: Vec<BBox>,
  pub banners: Vec<Banner>,
}

/// 一张成功处理的图片的结果，坐标均为原始分辨率
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  image_id: String,
  image_size: ImageSize,
  detections: Detections,
}

impl DetectionRecord {
  pub fn new(image_id: impl Into<String>, image_size: ImageSize, detections: Detections) -> Self {
    Self {
      image_id: image_id.into(),
      image_size,
      detections,
    }
  }

  pub fn image_id(&self) -> &str {
    &self.image_id
  }

  pub fn image_size(&self) -> ImageSize {
    self.image_size
  }

  pub fn people(&self) -> &[BBox] {
    &self.detections.people
  }

  pub fn banners(&self) -> &[Banner] {
    &self.detections.banners
  }

  pub fn people_count(&self) -> usize {
    self.detections.people.len()
  }

  pub fn banner_count(&self) -> usize {
    self.detections.banners.len()
  }
}

/// 图片处理失败的原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
  Unreadable(String),
  TooSmall {
    width: u32,
    height: u32,
    min_width: u32,
    min_height: u32,
  },
  PersonDetector(String),
  TextRecognizer(String),
  Output(String),
}

impl fmt::Display for FailureReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailureReason::Unreadable(e) => write!(f, "无法读取图片: {e}"),
      FailureReason::TooSmall {
        width,
        height,
        min_width,
        min_height,
      } => write!(
        f,
        "图片尺寸 {width}x{height} 小于下限 {min_width}x{min_height}"
      ),
      FailureReason::PersonDetector(e) => write!(f, "行人检测失败: {e}"),
      FailureReason::TextRecognizer(e) => write!(f, "文字识别失败: {e}"),
      FailureReason::Output(e) => write!(f, "结果输出失败: {e}"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedImage {
  pub image_id: String,
  pub path: PathBuf,
  pub reason: FailureReason,
}

/// 每张图片的处理结果，二者必居其一
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
  Detected(DetectionRecord),
  Failed(FailedImage),
}
