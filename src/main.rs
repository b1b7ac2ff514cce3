// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zhaopai::FromUrl;
use zhaopai::model::{PersonModel, TextModel};
use zhaopai::output::{DirectoryRecordOutput, OutputSet};
use zhaopai::task::{BatchTask, Detectors, Task};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();
  let config = args.build_config()?;

  info!("输入目录: {}", args.input);
  info!("结果目录: {}", args.output_json.display());
  info!("行人模型: {}", args.people);
  info!("文字模型: {}", args.text);

  if let Some(path) = &args.save_config {
    config.save(path)?;
  }

  let input = args.image_input(&config)?;
  let people = PersonModel::from_url(&args.people)
    .with_context(|| format!("无法加载行人模型: {}", args.people))?
    .with_min_confidence(config.detection.people_confidence);
  let text = TextModel::from_url(&args.text)
    .with_context(|| format!("无法加载文字模型: {}", args.text))?;
  let output = OutputSet::new(
    Some(args.output_json.clone()),
    args.annotated_directory(&config),
    &config.output,
  )?;

  let stop = Arc::new(AtomicBool::new(false));
  {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
      warn!("收到中断信号，处理完当前图片后退出...");
      stop.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法设置 Ctrl-C 处理函数")?;
  }

  let report = BatchTask::new(&config)
    .with_stop_flag(stop)
    .run_task(input, Detectors::new(people, text), output)?;

  let records = DirectoryRecordOutput::new(&args.output_json);
  records.write_combined(&report.records, &report.failures)?;
  let summary = report.summary();
  records.write_summary(&summary)?;

  println!();
  println!("检测结果汇总");
  println!("============");
  println!("{summary}");
  if !report.failures.is_empty() {
    println!("失败的图片:");
    for failed in &report.failures {
      println!("  - {}: {}", failed.path.display(), failed.reason);
    }
  }
  if report.interrupted {
    warn!("任务被中断，结果只包含已处理的图片");
  }

  Ok(())
}
