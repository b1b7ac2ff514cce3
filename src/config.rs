// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/config.rs - 运行配置
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

//! 一次运行的全部配置。
//!
//! 配置在运行开始前构造并校验，之后以只读引用传给各个组件。
//! 预设是返回配置值的普通函数。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::grouping::GroupingConfig;
use crate::input::DEFAULT_EXTENSIONS;
use crate::output::atomic_file::{self, AtomicFileError};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件 {path} 失败: {source}")]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("配置文件 {path} 解析失败: {source}")]
  Parse {
    path: PathBuf,
    source: toml::de::Error,
  },
  #[error("配置序列化失败: {0}")]
  Serialize(#[from] toml::ser::Error),
  #[error("写入配置文件失败: {0}")]
  Write(#[from] AtomicFileError),
  #[error("配置无效: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
  /// 行人框的最低置信度，交给检测模型预过滤
  pub people_confidence: f32,
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      people_confidence: 0.3,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
  /// 推理分辨率的长边上限，0 表示不缩小
  pub max_side: u32,
  pub min_width: u32,
  pub min_height: u32,
  pub extensions: Vec<String>,
}

impl Default for ImageConfig {
  fn default() -> Self {
    Self {
      max_side: 1600,
      min_width: 1,
      min_height: 1,
      extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
  pub visualize: bool,
  pub annotated_suffix: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub font_path: Option<PathBuf>,
  pub person_color: [u8; 3],
  pub banner_color: [u8; 3],
  pub box_thickness: u32,
}

impl Default for OutputConfig {
  fn default() -> Self {
    Self {
      visualize: false,
      annotated_suffix: "_annot".to_string(),
      font_path: None,
      person_color: [0, 0, 255],
      banner_color: [0, 255, 0],
      box_thickness: 2,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub workers: usize,
  pub detection: DetectionConfig,
  pub grouping: GroupingConfig,
  pub image: ImageConfig,
  pub output: OutputConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    balanced()
  }
}

/// 内置预设
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
  #[default]
  Balanced,
  HighAccuracy,
  HighSpeed,
}

pub fn balanced() -> PipelineConfig {
  PipelineConfig {
    workers: 1,
    detection: DetectionConfig::default(),
    grouping: GroupingConfig::default(),
    image: ImageConfig::default(),
    output: OutputConfig::default(),
  }
}

/// 更高阈值，原分辨率推理
pub fn high_accuracy() -> PipelineConfig {
  let mut config = balanced();
  config.detection.people_confidence = 0.5;
  config.grouping.confidence_threshold = 0.3;
  config.image.max_side = 0;
  config
}

/// 更低阈值，更小的推理分辨率
pub fn high_speed() -> PipelineConfig {
  let mut config = balanced();
  config.detection.people_confidence = 0.2;
  config.grouping.confidence_threshold = 0.05;
  config.image.max_side = 960;
  config
}

pub fn preset(preset: Preset) -> PipelineConfig {
  match preset {
    Preset::Balanced => balanced(),
    Preset::HighAccuracy => high_accuracy(),
    Preset::HighSpeed => high_speed(),
  }
}

fn check_unit(name: &str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::Invalid(format!("{name} 必须位于 [0, 1]，当前为 {value}")))
  }
}

impl PipelineConfig {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config: PipelineConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    info!("已加载配置文件: {}", path.display());
    Ok(config)
  }

  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(self)?;
    atomic_file::write_atomic(path.as_ref(), content.as_bytes())?;
    info!("配置已保存到: {}", path.as_ref().display());
    Ok(())
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    check_unit("detection.people_confidence", self.detection.people_confidence)?;
    check_unit("grouping.confidence_threshold", self.grouping.confidence_threshold)?;
    if self.workers == 0 {
      return Err(ConfigError::Invalid("workers 至少为 1".to_string()));
    }
    if self.image.extensions.is_empty() {
      return Err(ConfigError::Invalid("image.extensions 不能为空".to_string()));
    }
    if self.output.box_thickness == 0 {
      return Err(ConfigError::Invalid("output.box_thickness 至少为 1".to_string()));
    }
    if self.output.annotated_suffix.contains(std::path::is_separator) {
      return Err(ConfigError::Invalid(
        "output.annotated_suffix 不能包含路径分隔符".to_string(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grouping::ConfidencePolicy;
  use std::io::Write;
  use tempfile::NamedTempFile;

  #[test]
  fn balanced_defaults() {
    let config = PipelineConfig::default();
    assert_eq!(config, balanced());
    assert_eq!(config.detection.people_confidence, 0.3);
    assert_eq!(config.grouping.confidence_threshold, 0.1);
    assert_eq!(config.grouping.min_text_width, 10);
    assert_eq!(config.image.max_side, 1600);
    assert_eq!(config.output.annotated_suffix, "_annot");
    assert!(config.validate().is_ok());
  }

  #[test]
  fn presets_differ_in_thresholds() {
    let accurate = preset(Preset::HighAccuracy);
    assert_eq!(accurate.detection.people_confidence, 0.5);
    assert_eq!(accurate.grouping.confidence_threshold, 0.3);
    let fast = preset(Preset::HighSpeed);
    assert_eq!(fast.detection.people_confidence, 0.2);
    assert_eq!(fast.grouping.confidence_threshold, 0.05);
    assert!(fast.image.max_side < balanced().image.max_side);
  }

  #[test]
  fn save_and_load_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zhaopai.toml");
    let mut config = high_speed();
    config.workers = 4;
    config.grouping.confidence_policy = ConfidencePolicy::Mean;
    config.output.font_path = Some(PathBuf::from("/usr/share/fonts/DejaVuSans.ttf"));

    config.save(&path).unwrap();
    let loaded = PipelineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
  }

  #[test]
  fn partial_file_fills_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "workers = 2\n[grouping]\ny_tolerance = 12").unwrap();
    let config = PipelineConfig::load(file.path()).unwrap();
    assert_eq!(config.workers, 2);
    assert_eq!(config.grouping.y_tolerance, 12);
    assert_eq!(config.grouping.min_text_height, 10);
    assert_eq!(config.image, ImageConfig::default());
  }

  #[test]
  fn load_config_file_not_found() {
    let result = PipelineConfig::load("/nonexistent/path/zhaopai.toml");
    assert!(matches!(result, Err(ConfigError::Read { .. })));
  }

  #[test]
  fn load_config_invalid_toml() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "this is not valid toml {{{{").unwrap();
    assert!(matches!(
      PipelineConfig::load(file.path()),
      Err(ConfigError::Parse { .. })
    ));
  }

  #[test]
  fn validate_rejects_bad_values() {
    let mut config = balanced();
    config.detection.people_confidence = 1.5;
    assert!(config.validate().is_err());

    let mut config = balanced();
    config.workers = 0;
    assert!(config.validate().is_err());

    let mut config = balanced();
    config.grouping.confidence_threshold = f32::NAN;
    assert!(config.validate().is_err());
  }
}
