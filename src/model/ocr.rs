// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/model/ocr.rs - ONNX 文字检测与识别
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

use std::path::Path;
use std::sync::{Arc, Mutex};

use image::ImageFormat;
use oar_ocr::core::OCRError;
use oar_ocr::pipeline::{OAROCR, OAROCRBuilder};
use oar_ocr::processors::BoundingBox;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::frame::WorkingFrame;
use crate::model::{Model, RawText};
use crate::{FromUrl, FromUrlWithScheme, url_to_path};

const OCR_DEFAULT_DET: &str = "det.onnx";
const OCR_DEFAULT_REC: &str = "rec.onnx";
const OCR_DEFAULT_DICT: &str = "dict.txt";

#[derive(Error, Debug)]
pub enum OcrError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("OCR 流水线错误: {0}")]
  Pipeline(#[from] OCRError),
  #[error("临时图像读写失败: {0}")]
  IoError(#[from] std::io::Error),
  #[error("临时图像编码失败: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("OCR 流水线锁已损坏")]
  Poisoned,
}

/// 基于 oar-ocr 的文字检测加识别，不做任何置信度过滤
///
/// `ocr:///models/ppocr?det=det.onnx&rec=rec.onnx&dict=dict.txt`，
/// 参数是相对模型目录的文件名，省略时使用 `det.onnx`、`rec.onnx`、`dict.txt`。
pub struct OcrTextRecognizer {
  // predict 需要 &mut OAROCR
  pipeline: Mutex<OAROCR>,
}

impl FromUrlWithScheme for OcrTextRecognizer {
  const SCHEME: &'static str = "ocr";
}

impl FromUrl for OcrTextRecognizer {
  type Error = OcrError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OcrError::SchemeMismatch);
    }
    let directory = url_to_path(url);
    let file = |key: &str, default: &str| {
      let name = url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| default.to_string());
      directory.join(name).to_string_lossy().into_owned()
    };
    let (det, rec, dict) = (
      file("det", OCR_DEFAULT_DET),
      file("rec", OCR_DEFAULT_REC),
      file("dict", OCR_DEFAULT_DICT),
    );
    info!("加载 OCR 模型: 检测 {}，识别 {}，字典 {}", det, rec, dict);

    let pipeline = OAROCRBuilder::new(det, rec, dict)
      .text_detection_batch_size(1)
      .text_recognition_batch_size(1)
      .text_rec_score_thresh(0.0)
      .build()?;
    info!("OCR 模型加载完成");
    Ok(Self {
      pipeline: Mutex::new(pipeline),
    })
  }
}

/// 每个文字区域取多边形外接框，无效区域被跳过
///
/// 识别分数截断到 [0, 1]。
pub(crate) fn recognized_texts(boxes: &[BoundingBox], texts: &[Arc<str>], scores: &[f32]) -> Vec<RawText> {
  boxes
    .iter()
    .zip(texts)
    .zip(scores)
    .filter_map(|((region, text), &score)| {
      let quad: Vec<(f32, f32)> = region.points.iter().map(|p| (p.x, p.y)).collect();
      match RawText::from_quad(&quad, text.to_string(), score.clamp(0.0, 1.0)) {
        Ok(raw) => Some(raw),
        Err(e) => {
          warn!("跳过无效文字区域 \"{}\": {}", text, e);
          None
        }
      }
    })
    .collect()
}

impl OcrTextRecognizer {
  fn predict_file(&self, path: &Path) -> Result<Vec<RawText>, OcrError> {
    let mut pipeline = self.pipeline.lock().map_err(|_| OcrError::Poisoned)?;
    let result = pipeline.predict(path)?;
    Ok(recognized_texts(&result.text_boxes, &result.rec_texts, &result.rec_scores))
  }
}

impl Model for OcrTextRecognizer {
  type Input = WorkingFrame;
  type Output = Vec<RawText>;
  type Error = OcrError;

  // 流水线只接受文件路径，推理分辨率的帧先写入临时文件
  fn infer(&self, frame: &WorkingFrame) -> Result<Vec<RawText>, OcrError> {
    let file = tempfile::Builder::new()
      .prefix("zhaopai-ocr-")
      .suffix(".png")
      .tempfile()?;
    frame.image().save_with_format(file.path(), ImageFormat::Png)?;
    let texts = self.predict_file(file.path())?;
    debug!("{}: 识别到 {} 段文字", frame.image_id(), texts.len());
    Ok(texts)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use oar_ocr::processors::Point;

  fn quad(points: &[(f32, f32)]) -> BoundingBox {
    BoundingBox::new(points.iter().map(|&(x, y)| Point { x, y }).collect())
  }

  #[test]
  fn polygons_become_enclosing_regions() {
    let boxes = vec![
      quad(&[(10.0, 4.0), (60.0, 6.0), (59.0, 24.0), (9.5, 22.0)]),
      quad(&[]),
      quad(&[(70.0, 5.0), (120.0, 5.0), (120.0, 25.0), (70.0, 25.0)]),
    ];
    let texts: Vec<Arc<str>> = vec!["招牌".into(), "丢失".into(), "OPEN".into()];
    let scores = vec![0.93, 0.5, 1.02];

    let raw = recognized_texts(&boxes, &texts, &scores);
    assert_eq!(raw.len(), 2);
    let r = raw[0].region();
    assert_eq!((r.x_min(), r.y_min(), r.x_max(), r.y_max()), (9.5, 4.0, 60.0, 24.0));
    assert_eq!(raw[0].text(), "招牌");
    assert_eq!(raw[0].confidence(), 0.93);
    assert_eq!(raw[1].text(), "OPEN");
    assert_eq!(raw[1].confidence(), 1.0);
  }

  #[test]
  fn other_schemes_are_rejected() {
    let url = Url::parse("replay:///data/labels").unwrap();
    assert!(matches!(
      OcrTextRecognizer::from_url(&url),
      Err(OcrError::SchemeMismatch)
    ));
  }
}
