// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/input.rs - 图片目录输入
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
use tracing::{debug, info};

use crate::{FromUrl, FromUrlWithScheme, url_to_path};

mod read_image_file;
pub use self::read_image_file::{ImageFileInputError, SourceImage, load_source_image};

pub const DEFAULT_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("读取目录 {path} 失败: {source}")]
  ReadDir {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("输入路径不是目录: {0}")]
  NotADirectory(PathBuf),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 目录中按文件名排序的图片列表
#[derive(Debug, Clone)]
pub struct ImageFolderInput {
  directory: PathBuf,
  files: Vec<PathBuf>,
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

impl ImageFolderInput {
  /// 扫描 `directory`（不递归），扩展名比较不区分大小写
  pub fn scan(directory: impl AsRef<Path>, extensions: &[String]) -> Result<Self, InputError> {
    let directory = directory.as_ref().to_path_buf();
    if !directory.is_dir() {
      return Err(InputError::NotADirectory(directory));
    }
    let read_dir = |source| InputError::ReadDir {
      path: directory.clone(),
      source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory).map_err(read_dir)? {
      let path = entry.map_err(read_dir)?.path();
      if path.is_file() && has_extension(&path, extensions) {
        files.push(path);
      } else {
        debug!("跳过非图片文件: {}", path.display());
      }
    }
    files.sort();
    info!("在 {} 中找到 {} 张图片", directory.display(), files.len());

    Ok(Self { directory, files })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn files(&self) -> &[PathBuf] {
    &self.files
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

impl IntoIterator for ImageFolderInput {
  type Item = PathBuf;
  type IntoIter = std::vec::IntoIter<PathBuf>;

  fn into_iter(self) -> Self::IntoIter {
    self.files.into_iter()
  }
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageFolderInput {
  type Error = InputError;

  /// `folder:///data/shots?ext=jpg&ext=png`，未给出 `ext` 时使用默认扩展名
  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    let defaults: Vec<String> = DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect();
    Self::from_url_or(url, &defaults)
  }
}

impl ImageFolderInput {
  /// URL 中没有 `ext` 参数时使用 `extensions`
  pub fn from_url_or(url: &url::Url, extensions: &[String]) -> Result<Self, InputError> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch);
    }
    let from_query: Vec<String> = url
      .query_pairs()
      .filter(|(k, _)| k == "ext")
      .map(|(_, v)| v.into_owned())
      .collect();
    if from_query.is_empty() {
      Self::scan(url_to_path(url), extensions)
    } else {
      Self::scan(url_to_path(url), &from_query)
    }
  }

  /// 接受 `folder://` URL 或普通目录路径
  pub fn open(location: &str, extensions: &[String]) -> Result<Self, InputError> {
    match url::Url::parse(location) {
      Ok(url) if url.scheme() == Self::SCHEME => Self::from_url_or(&url, extensions),
      _ => Self::scan(location, extensions),
    }
  }
}
