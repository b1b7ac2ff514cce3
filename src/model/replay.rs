// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/model/replay.rs - 标注回放模型
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

//! 回放预先计算好的检测结果。
//!
//! 标注目录中每张图片对应一个 `<文件名去扩展名>.json`：
//!
//! ```json
//! {
//!   "people": [{"x_min": 10, "y_min": 20, "x_max": 80, "y_max": 200, "confidence": 0.91}],
//!   "texts": [
//!     {"text": "OPEN", "confidence": 0.8, "quad": [[0, 0], [50, 0], [50, 20], [0, 20]]},
//!     {"text": "24H", "confidence": 0.7, "x_min": 60, "y_min": 0, "x_max": 90, "y_max": 20}
//!   ]
//! }
//! ```
//!
//! 文件中的坐标为原始分辨率，回放时按帧的缩放比例投影到推理分辨率。

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::frame::WorkingFrame;
use crate::geometry::{GeometryError, RawBox};
use crate::model::{Model, RawText};
use crate::{FromUrl, FromUrlWithScheme, url_to_path};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("标注目录不存在: {0}")]
  MissingDirectory(PathBuf),
  #[error("读取标注文件 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("标注文件 {path} 格式错误: {source}")]
  Parse {
    path: PathBuf,
    source: serde_json::Error,
  },
  #[error("标注坐标无效: {0}")]
  Geometry(#[from] GeometryError),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextRegion {
  Quad { quad: Vec<(f32, f32)> },
  Rect {
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
  },
}

#[derive(Debug, Deserialize)]
struct AnnotatedText {
  text: String,
  confidence: f32,
  #[serde(flatten)]
  region: TextRegion,
}

impl AnnotatedText {
  fn to_raw(&self, factor: f32) -> Result<RawText, GeometryError> {
    let region = match &self.region {
      TextRegion::Quad { quad } => RawBox::enclosing(quad, self.confidence)?,
      TextRegion::Rect {
        x_min,
        y_min,
        x_max,
        y_max,
      } => RawBox::new(*x_min, *y_min, *x_max, *y_max, self.confidence)?,
    };
    Ok(RawText::new(region.scaled(factor)?, self.text.clone()))
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Annotation {
  people: Vec<RawBox>,
  texts: Vec<AnnotatedText>,
}

/// 标注文件目录
#[derive(Debug, Clone)]
pub struct AnnotationStore {
  directory: PathBuf,
}

impl AnnotationStore {
  pub fn open(directory: impl Into<PathBuf>) -> Result<Self, ReplayError> {
    let directory = directory.into();
    if !directory.is_dir() {
      error!("标注目录不存在: {}", directory.display());
      return Err(ReplayError::MissingDirectory(directory));
    }
    Ok(Self { directory })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn annotation_path(&self, image_id: &str) -> PathBuf {
    let stem = Path::new(image_id)
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| image_id.to_string());
    self.directory.join(format!("{stem}.json"))
  }

  // 没有标注文件视为没有检测结果
  fn load(&self, image_id: &str) -> Result<Annotation, ReplayError> {
    let path = self.annotation_path(image_id);
    let content = match std::fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!("{} 没有标注文件", image_id);
        return Ok(Annotation::default());
      }
      Err(source) => return Err(ReplayError::Io { path, source }),
    };
    serde_json::from_str(&content).map_err(|source| ReplayError::Parse { path, source })
  }
}

fn store_from_url(url: &Url) -> Result<AnnotationStore, ReplayError> {
  if url.scheme() != REPLAY_SCHEME {
    return Err(ReplayError::SchemeMismatch);
  }
  AnnotationStore::open(url_to_path(url))
}

const REPLAY_SCHEME: &str = "replay";

/// 回放行人框
#[derive(Debug, Clone)]
pub struct ReplayPeople {
  store: AnnotationStore,
  min_confidence: f32,
}

impl ReplayPeople {
  pub fn new(store: AnnotationStore) -> Self {
    Self {
      store,
      min_confidence: 0.0,
    }
  }

  pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
    self.min_confidence = min_confidence;
    self
  }
}

impl FromUrlWithScheme for ReplayPeople {
  const SCHEME: &'static str = REPLAY_SCHEME;
}

impl FromUrl for ReplayPeople {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Ok(Self::new(store_from_url(url)?))
  }
}

impl Model for ReplayPeople {
  type Input = WorkingFrame;
  type Output = Vec<RawBox>;
  type Error = ReplayError;

  fn infer(&self, frame: &WorkingFrame) -> Result<Vec<RawBox>, ReplayError> {
    let factor = frame.scale().scale_factor() as f32;
    let annotation = self.store.load(frame.image_id())?;
    let mut people = Vec::with_capacity(annotation.people.len());
    for person in annotation
      .people
      .iter()
      .filter(|p| p.confidence() >= self.min_confidence)
    {
      people.push(person.scaled(factor)?);
    }
    Ok(people)
  }
}

/// 回放文字识别结果，不做任何过滤
#[derive(Debug, Clone)]
pub struct ReplayText {
  store: AnnotationStore,
}

impl ReplayText {
  pub fn new(store: AnnotationStore) -> Self {
    Self { store }
  }
}

impl FromUrlWithScheme for ReplayText {
  const SCHEME: &'static str = REPLAY_SCHEME;
}

impl FromUrl for ReplayText {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Ok(Self::new(store_from_url(url)?))
  }
}

impl Model for ReplayText {
  type Input = WorkingFrame;
  type Output = Vec<RawText>;
  type Error = ReplayError;

  fn infer(&self, frame: &WorkingFrame) -> Result<Vec<RawText>, ReplayError> {
    let factor = frame.scale().scale_factor() as f32;
    let annotation = self.store.load(frame.image_id())?;
    annotation
      .texts
      .iter()
      .map(|t| t.to_raw(factor).map_err(ReplayError::from))
      .collect()
  }
}
