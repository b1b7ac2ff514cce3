// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图片检测
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use zhaopai::{
  FromUrl,
  config::{self, PipelineConfig, Preset},
  model::{PersonModel, TextModel},
  output::OutputSet,
  task::{Detectors, OneShotTask, Task},
};

/// 对一张图片运行检测并打印 JSON 记录
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图片文件
  #[arg(long, value_name = "FILE")]
  pub input: PathBuf,
  /// 行人检测模型
  #[arg(long, value_name = "URL")]
  pub people: Url,
  /// 文字识别模型
  #[arg(long, value_name = "URL")]
  pub text: Url,
  /// 预设配置
  #[arg(long, value_enum, default_value_t = Preset::Balanced)]
  pub preset: Preset,
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 标注图像输出目录
  #[arg(long, value_name = "DIR")]
  pub output_images: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let mut config = match &args.config {
    Some(path) => PipelineConfig::load(path)?,
    None => config::preset(args.preset),
  };
  config.output.visualize |= args.output_images.is_some();
  config.validate()?;

  let people = PersonModel::from_url(&args.people)?.with_min_confidence(config.detection.people_confidence);
  let text = TextModel::from_url(&args.text)?;
  let output = OutputSet::new(None, args.output_images.clone(), &config.output)?;

  info!("开始推理: {}", args.input.display());
  let now = std::time::Instant::now();
  let record = OneShotTask::new(&config).run_task(args.input.as_path(), Detectors::new(people, text), output)?;
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  println!("{}", serde_json::to_string_pretty(&record)?);
  Ok(())
}
