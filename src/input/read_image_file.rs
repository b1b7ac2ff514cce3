// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/input/read_image_file.rs - 图像文件读取
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::record::ImageSize;

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("无法从路径得到图片名: {0}")]
  NoFileName(PathBuf),
}

/// 原始分辨率的 RGB 图片
#[derive(Debug, Clone)]
pub struct SourceImage {
  path: PathBuf,
  image_id: String,
  image: RgbImage,
}

impl SourceImage {
  pub fn new(path: impl Into<PathBuf>, image_id: impl Into<String>, image: RgbImage) -> Self {
    Self {
      path: path.into(),
      image_id: image_id.into(),
      image,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 文件名（含扩展名）
  pub fn image_id(&self) -> &str {
    &self.image_id
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn size(&self) -> ImageSize {
    let (width, height) = self.image.dimensions();
    ImageSize { width, height }
  }
}

/// 读取并解码图片，按内容识别格式而非扩展名
pub fn load_source_image(path: impl AsRef<Path>) -> Result<SourceImage, ImageFileInputError> {
  let path = path.as_ref();
  let image_id = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .ok_or_else(|| ImageFileInputError::NoFileName(path.to_path_buf()))?;

  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  debug!(
    "读取图片 {}: {}x{}",
    path.display(),
    image.width(),
    image.height()
  );

  Ok(SourceImage::new(path, image_id, image.into_rgb8()))
}
