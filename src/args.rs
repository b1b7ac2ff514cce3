// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use zhaopai::config::{self, ConfigError, PipelineConfig, Preset};
use zhaopai::grouping::ConfidencePolicy;
use zhaopai::input::{ImageFolderInput, InputError};

/// Zhaopai 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图片目录（不递归）
  /// 支持格式:
  /// - 目录路径: /data/shots
  /// - 目录 URL: folder:///data/shots?ext=jpg&ext=png
  #[arg(long, value_name = "DIR|URL")]
  pub input: String,

  /// JSON 结果目录：每张图片的记录、combined_results.json、summary.json
  #[arg(long, value_name = "DIR", default_value = "results")]
  pub output_json: PathBuf,

  /// 标注图像目录，给出时开启可视化
  #[arg(long, value_name = "DIR")]
  pub output_images: Option<PathBuf>,

  /// 行人检测模型
  /// 支持格式:
  /// - 标注回放: replay:///path/to/annotations
  /// - ONNX YOLOv8 (需要 model_yolo_onnx 特性): yolo:///path/to/yolov8n.onnx
  #[arg(long, value_name = "URL")]
  pub people: Url,

  /// 文字识别模型
  /// 支持格式:
  /// - 标注回放: replay:///path/to/annotations
  /// - ONNX OCR (需要 model_ocr_onnx 特性): ocr:///path/to/models?det=det.onnx&rec=rec.onnx&dict=dict.txt
  #[arg(long, value_name = "URL")]
  pub text: Url,

  /// 预设配置，未给出 --config 时作为基础配置
  #[arg(long, value_enum, default_value_t = Preset::Balanced)]
  pub preset: Preset,

  /// TOML 配置文件，给出时代替预设作为基础配置
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 行人置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub people_confidence: Option<f32>,

  /// 文字置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub text_confidence: Option<f32>,

  /// 推理分辨率长边上限，0 表示不缩小
  #[arg(long, value_name = "PIXELS")]
  pub max_side: Option<u32>,

  /// 同一行文字 y_min 的容差
  #[arg(long, value_name = "PIXELS")]
  pub y_tolerance: Option<u32>,

  /// 招牌最小面积，0 表示不过滤
  #[arg(long, value_name = "PIXELS")]
  pub min_banner_area: Option<u64>,

  /// 招牌置信度的计算方式
  #[arg(long, value_enum)]
  pub confidence_policy: Option<ConfidencePolicy>,

  /// 生成标注图像
  #[arg(long)]
  pub visualize: bool,

  /// 标注文字所用的字体文件
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 工作线程数
  #[arg(long, value_name = "COUNT")]
  pub workers: Option<usize>,

  /// 把最终配置写入该文件
  #[arg(long, value_name = "FILE")]
  pub save_config: Option<PathBuf>,
}

impl Args {
  /// 基础配置取配置文件或预设，再叠加命令行参数，最后校验
  pub fn build_config(&self) -> Result<PipelineConfig, ConfigError> {
    let mut config = match &self.config {
      Some(path) => PipelineConfig::load(path)?,
      None => config::preset(self.preset),
    };

    if let Some(v) = self.people_confidence {
      config.detection.people_confidence = v;
    }
    if let Some(v) = self.text_confidence {
      config.grouping.confidence_threshold = v;
    }
    if let Some(v) = self.max_side {
      config.image.max_side = v;
    }
    if let Some(v) = self.y_tolerance {
      config.grouping.y_tolerance = v;
    }
    if let Some(v) = self.min_banner_area {
      config.grouping.min_banner_area = v;
    }
    if let Some(v) = self.confidence_policy {
      config.grouping.confidence_policy = v;
    }
    if self.visualize || self.output_images.is_some() {
      config.output.visualize = true;
    }
    if let Some(font) = &self.font {
      config.output.font_path = Some(font.clone());
    }
    if let Some(v) = self.workers {
      config.workers = v;
    }

    config.validate()?;
    Ok(config)
  }

  /// URL 中未指定扩展名时使用配置中的扩展名
  pub fn image_input(&self, config: &PipelineConfig) -> Result<ImageFolderInput, InputError> {
    ImageFolderInput::open(&self.input, &config.image.extensions)
  }

  /// 标注图像目录，开启可视化但未指定目录时使用 `output_images`
  pub fn annotated_directory(&self, config: &PipelineConfig) -> Option<PathBuf> {
    match &self.output_images {
      Some(dir) => Some(dir.clone()),
      None if config.output.visualize => Some(PathBuf::from("output_images")),
      None => None,
    }
  }
}
