// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::PathBuf;

use thiserror::Error;
#[cfg(not(feature = "save_image_file"))]
use tracing::warn;

use crate::config::OutputConfig;
use crate::input::SourceImage;
use crate::record::DetectionRecord;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

pub mod atomic_file;

mod directory_record;
pub use self::directory_record::{
  COMBINED_FILE_NAME, DirectoryRecordOutput, DirectoryRecordOutputError, SUMMARY_FILE_NAME,
};

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
}

/// 每张图片的输出：JSON 记录和可选的标注图
pub struct OutputSet {
  records: Option<DirectoryRecordOutput>,
  #[cfg(feature = "save_image_file")]
  annotated: Option<SaveImageFileOutput>,
}

impl OutputSet {
  pub fn new(
    json_directory: Option<PathBuf>,
    image_directory: Option<PathBuf>,
    style: &OutputConfig,
  ) -> Result<Self, OutputError> {
    let records = json_directory.map(DirectoryRecordOutput::new);

    #[cfg(feature = "save_image_file")]
    let annotated = match image_directory {
      Some(dir) if style.visualize => Some(SaveImageFileOutput::new(dir, style)?),
      _ => None,
    };
    #[cfg(not(feature = "save_image_file"))]
    if style.visualize && image_directory.is_some() {
      warn!("未启用 save_image_file 特性，忽略标注图像输出");
    }

    Ok(Self {
      records,
      #[cfg(feature = "save_image_file")]
      annotated,
    })
  }

  /// 不写任何文件
  pub fn none() -> Self {
    Self {
      records: None,
      #[cfg(feature = "save_image_file")]
      annotated: None,
    }
  }

  pub fn records(&self) -> Option<&DirectoryRecordOutput> {
    self.records.as_ref()
  }
}

impl Render<SourceImage, DetectionRecord> for OutputSet {
  type Error = OutputError;

  fn render_result(&self, source: &SourceImage, record: &DetectionRecord) -> Result<(), OutputError> {
    if let Some(records) = &self.records {
      records.render_result(source, record)?;
    }
    #[cfg(feature = "save_image_file")]
    if let Some(annotated) = &self.annotated {
      annotated.render_result(source, record)?;
    }
    Ok(())
  }
}
