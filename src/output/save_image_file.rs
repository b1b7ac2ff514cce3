// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::OutputConfig;
use crate::input::SourceImage;
use crate::output::Render;
use crate::output::draw::{Draw, DrawError};
use crate::record::DetectionRecord;

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("绘制初始化失败: {0}")]
  DrawError(#[from] DrawError),
}

/// 把标注后的图片写到 `<目录>/<文件名去扩展名><后缀>.<原扩展名>`
pub struct SaveImageFileOutput {
  directory: PathBuf,
  suffix: String,
  draw: Draw,
}

impl SaveImageFileOutput {
  pub fn new(directory: impl Into<PathBuf>, style: &OutputConfig) -> Result<Self, SaveImageFileError> {
    Ok(Self {
      directory: directory.into(),
      suffix: style.annotated_suffix.clone(),
      draw: Draw::from_config(style)?,
    })
  }

  pub fn with_draw(directory: impl Into<PathBuf>, suffix: impl Into<String>, draw: Draw) -> Self {
    Self {
      directory: directory.into(),
      suffix: suffix.into(),
      draw,
    }
  }

  pub fn annotated_path(&self, source: &Path) -> PathBuf {
    let stem = source
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    let ext = source
      .extension()
      .map(|e| e.to_string_lossy().to_ascii_lowercase())
      .unwrap_or_else(|| "png".to_string());
    self.directory.join(format!("{stem}{}.{ext}", self.suffix))
  }
}

impl Render<SourceImage, DetectionRecord> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, source: &SourceImage, record: &DetectionRecord) -> Result<(), Self::Error> {
    std::fs::create_dir_all(&self.directory)?;
    let path = self.annotated_path(source.path());
    let image = self.draw.draw_record(source.image(), record);
    image.save(&path)?;
    debug!("保存标注图像到文件: {}", path.display());
    Ok(())
  }
}
