// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/model.rs - 检测模型
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

use thiserror::Error;
use url::Url;

use crate::frame::WorkingFrame;
use crate::geometry::{GeometryError, RawBox};
use crate::{FromUrl, FromUrlWithScheme};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// OCR 模型给出的一段文字，坐标为推理分辨率
#[derive(Debug, Clone, PartialEq)]
pub struct RawText {
  region: RawBox,
  text: String,
}

impl RawText {
  pub fn new(region: RawBox, text: impl Into<String>) -> Self {
    Self {
      region,
      text: text.into(),
    }
  }

  /// 由四边形角点构造，区域取其外接框
  pub fn from_quad(
    quad: &[(f32, f32)],
    text: impl Into<String>,
    confidence: f32,
  ) -> Result<Self, GeometryError> {
    Ok(Self::new(RawBox::enclosing(quad, confidence)?, text))
  }

  pub fn region(&self) -> &RawBox {
    &self.region
  }

  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn confidence(&self) -> f32 {
    self.region.confidence()
  }
}

mod replay;
pub use self::replay::{AnnotationStore, ReplayError, ReplayPeople, ReplayText};

#[cfg(feature = "model_yolo_onnx")]
mod yolo;
#[cfg(feature = "model_yolo_onnx")]
pub use self::yolo::{YoloError, YoloPersonDetector};

#[cfg(feature = "model_ocr_onnx")]
mod ocr;
#[cfg(feature = "model_ocr_onnx")]
pub use self::ocr::{OcrError, OcrTextRecognizer};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("标注回放错误: {0}")]
  ReplayError(#[from] ReplayError),
  #[cfg(feature = "model_yolo_onnx")]
  #[error("YOLO 模型错误: {0}")]
  YoloError(#[from] YoloError),
  #[cfg(feature = "model_ocr_onnx")]
  #[error("OCR 模型错误: {0}")]
  OcrError(#[from] OcrError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 行人检测模型，按 URL 方案选择实现
pub enum PersonModel {
  Replay(ReplayPeople),
  #[cfg(feature = "model_yolo_onnx")]
  Yolo(YoloPersonDetector),
}

impl FromUrl for PersonModel {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayPeople::SCHEME => Ok(PersonModel::Replay(ReplayPeople::from_url(url)?)),
      #[cfg(feature = "model_yolo_onnx")]
      YoloPersonDetector::SCHEME => Ok(PersonModel::Yolo(YoloPersonDetector::from_url(url)?)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl PersonModel {
  /// 低于该置信度的行人框不会返回
  pub fn with_min_confidence(self, min_confidence: f32) -> Self {
    match self {
      PersonModel::Replay(m) => PersonModel::Replay(m.with_min_confidence(min_confidence)),
      #[cfg(feature = "model_yolo_onnx")]
      PersonModel::Yolo(m) => PersonModel::Yolo(m.with_min_confidence(min_confidence)),
    }
  }
}

impl Model for PersonModel {
  type Input = WorkingFrame;
  type Output = Vec<RawBox>;
  type Error = ModelError;

  fn infer(&self, input: &WorkingFrame) -> Result<Vec<RawBox>, ModelError> {
    match self {
      PersonModel::Replay(m) => m.infer(input).map_err(ModelError::from),
      #[cfg(feature = "model_yolo_onnx")]
      PersonModel::Yolo(m) => m.infer(input).map_err(ModelError::from),
    }
  }
}

/// 文字识别模型
pub enum TextModel {
  Replay(ReplayText),
  #[cfg(feature = "model_ocr_onnx")]
  Ocr(OcrTextRecognizer),
}

impl FromUrl for TextModel {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayText::SCHEME => Ok(TextModel::Replay(ReplayText::from_url(url)?)),
      #[cfg(feature = "model_ocr_onnx")]
      OcrTextRecognizer::SCHEME => Ok(TextModel::Ocr(OcrTextRecognizer::from_url(url)?)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Model for TextModel {
  type Input = WorkingFrame;
  type Output = Vec<RawText>;
  type Error = ModelError;

  fn infer(&self, input: &WorkingFrame) -> Result<Vec<RawText>, ModelError> {
    match self {
      TextModel::Replay(m) => m.infer(input).map_err(ModelError::from),
      #[cfg(feature = "model_ocr_onnx")]
      TextModel::Ocr(m) => m.infer(input).map_err(ModelError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rknn:///opt/models/person.rknn").unwrap();
    assert!(matches!(
      PersonModel::from_url(&url),
      Err(ModelError::SchemeMismatch(s)) if s == "rknn"
    ));
    assert!(TextModel::from_url(&url).is_err());
  }

  #[test]
  fn quad_text_region() {
    let text = RawText::from_quad(&[(1.0, 2.0), (9.0, 2.5), (9.5, 8.0), (0.5, 7.0)], "OPEN", 0.8)
      .unwrap();
    let r = text.region();
    assert_eq!((r.x_min(), r.y_min(), r.x_max(), r.y_max()), (0.5, 2.0, 9.5, 8.0));
    assert_eq!(text.confidence(), 0.8);
  }
}
