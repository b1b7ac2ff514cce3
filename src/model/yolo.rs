// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/model/yolo.rs - YOLOv8 行人检测器 (ONNX Runtime)
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

use std::sync::Mutex;

use image::imageops::{self, FilterType};
use ort::session::Session;
use ort::value::Tensor;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::frame::WorkingFrame;
use crate::geometry::{GeometryError, RawBox};
use crate::model::Model;
use crate::{FromUrl, FromUrlWithScheme, url_to_path};

const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_NUM_CLASSES: usize = 80;
const YOLO_PERSON_CLASS: usize = 0;
const YOLO_NMS_THRESH: f32 = 0.45;
const YOLO_DEFAULT_CONF: f32 = 0.45;

#[derive(Error, Debug)]
pub enum YoloError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("输出张量形状不符: {0:?}")]
  UnexpectedShape(Vec<i64>),
  #[error("推理会话锁已损坏")]
  Poisoned,
  #[error("检测框无效: {0}")]
  Geometry(#[from] GeometryError),
}

/// COCO 预训练的 YOLOv8 模型，只保留 person 类
pub struct YoloPersonDetector {
  // ort 的 run 需要 &mut Session
  session: Mutex<Session>,
  min_confidence: f32,
  nms_threshold: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
  x_min: f32,
  y_min: f32,
  x_max: f32,
  y_max: f32,
  score: f32,
}

impl Candidate {
  fn area(&self) -> f32 {
    (self.x_max - self.x_min).max(0.0) * (self.y_max - self.y_min).max(0.0)
  }

  fn iou(&self, other: &Candidate) -> f32 {
    let w = (self.x_max.min(other.x_max) - self.x_min.max(other.x_min)).max(0.0);
    let h = (self.y_max.min(other.y_max) - self.y_min.max(other.y_min)).max(0.0);
    let intersection = w * h;
    let union = self.area() + other.area() - intersection;
    if union > 0.0 { intersection / union } else { 0.0 }
  }
}

fn nms(mut candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
  let mut kept: Vec<Candidate> = Vec::new();
  for candidate in candidates {
    if kept.iter().all(|k| k.iou(&candidate) < threshold) {
      kept.push(candidate);
    }
  }
  kept
}

impl FromUrlWithScheme for YoloPersonDetector {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for YoloPersonDetector {
  type Error = YoloError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloError::SchemeMismatch);
    }
    let path = url_to_path(url);
    info!("加载 ONNX 模型: {}", path.display());
    let session = Session::builder()?.commit_from_file(&path)?;
    info!("模型加载完成");
    Ok(Self {
      session: Mutex::new(session),
      min_confidence: YOLO_DEFAULT_CONF,
      nms_threshold: YOLO_NMS_THRESH,
    })
  }
}

impl YoloPersonDetector {
  pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
    self.min_confidence = min_confidence;
    self
  }

  /// 缩放到 640x640，转为 NCHW 并归一化到 [0, 1]
  fn preprocess(&self, frame: &WorkingFrame) -> Result<Tensor<f32>, YoloError> {
    let resized = imageops::resize(
      frame.image(),
      YOLO_INPUT_SIZE,
      YOLO_INPUT_SIZE,
      FilterType::Triangle,
    );
    let plane = (YOLO_INPUT_SIZE * YOLO_INPUT_SIZE) as usize;
    let mut data = vec![0f32; 3 * plane];
    for (idx, pixel) in resized.pixels().enumerate() {
      for c in 0..3 {
        data[c * plane + idx] = f32::from(pixel[c]) / 255.0;
      }
    }
    let shape = [1usize, 3, YOLO_INPUT_SIZE as usize, YOLO_INPUT_SIZE as usize];
    Ok(Tensor::from_array((shape, data.into_boxed_slice()))?)
  }

  /// 输出布局 [1, 4 + 80, N]，按列存放
  fn postprocess(&self, shape: &[i64], data: &[f32], frame: &WorkingFrame) -> Result<Vec<RawBox>, YoloError> {
    let &[1, rows, proposals] = shape else {
      return Err(YoloError::UnexpectedShape(shape.to_vec()));
    };
    if rows as usize != 4 + YOLO_NUM_CLASSES {
      return Err(YoloError::UnexpectedShape(shape.to_vec()));
    }
    let proposals = proposals as usize;
    let at = |row: usize, i: usize| data[row * proposals + i];

    let scale_x = frame.width() as f32 / YOLO_INPUT_SIZE as f32;
    let scale_y = frame.height() as f32 / YOLO_INPUT_SIZE as f32;
    let mut candidates = Vec::new();
    for i in 0..proposals {
      let score = at(4 + YOLO_PERSON_CLASS, i);
      if score < self.min_confidence {
        continue;
      }
      let best = (0..YOLO_NUM_CLASSES)
        .map(|c| at(4 + c, i))
        .fold(f32::MIN, f32::max);
      if score < best {
        continue;
      }
      let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
      candidates.push(Candidate {
        x_min: ((cx - w / 2.0) * scale_x).max(0.0),
        y_min: ((cy - h / 2.0) * scale_y).max(0.0),
        x_max: ((cx + w / 2.0) * scale_x).min(frame.width() as f32),
        y_max: ((cy + h / 2.0) * scale_y).min(frame.height() as f32),
        score: score.min(1.0),
      });
    }

    let total = candidates.len();
    let kept = nms(candidates, self.nms_threshold);
    debug!("{}: 候选 {} 个，NMS 后 {} 个", frame.image_id(), total, kept.len());

    kept
      .into_iter()
      .filter(|c| c.x_min <= c.x_max && c.y_min <= c.y_max)
      .map(|c| RawBox::new(c.x_min, c.y_min, c.x_max, c.y_max, c.score).map_err(YoloError::from))
      .collect()
  }
}

impl Model for YoloPersonDetector {
  type Input = WorkingFrame;
  type Output = Vec<RawBox>;
  type Error = YoloError;

  fn infer(&self, frame: &WorkingFrame) -> Result<Vec<RawBox>, YoloError> {
    let input = self.preprocess(frame)?;
    let mut session = self.session.lock().map_err(|_| YoloError::Poisoned)?;
    let outputs = session.run(ort::inputs!["images" => input])?;
    let (shape, data) = outputs["output0"].try_extract_tensor::<f32>()?;
    self.postprocess(shape, data, frame)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(x: f32, score: f32) -> Candidate {
    Candidate {
      x_min: x,
      y_min: 0.0,
      x_max: x + 10.0,
      y_max: 10.0,
      score,
    }
  }

  #[test]
  fn nms_keeps_best_of_overlapping() {
    let kept = nms(
      vec![candidate(0.0, 0.6), candidate(1.0, 0.9), candidate(50.0, 0.5)],
      0.45,
    );
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].x_min, 50.0);
  }

  #[test]
  fn disjoint_boxes_have_zero_iou() {
    assert_eq!(candidate(0.0, 0.5).iou(&candidate(20.0, 0.5)), 0.0);
    assert!((candidate(0.0, 0.5).iou(&candidate(0.0, 0.5)) - 1.0).abs() < 1e-6);
  }
}
