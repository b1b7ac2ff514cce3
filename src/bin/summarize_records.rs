// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/bin/summarize_records.rs - 从已有记录重新统计
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
use tracing::{info, warn};

use zhaopai::output::{COMBINED_FILE_NAME, DirectoryRecordOutput};
use zhaopai::stats::aggregate;

/// 读取结果目录中的单张记录，重新生成 summary.json
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// JSON 结果目录
  #[arg(long, value_name = "DIR")]
  pub records: PathBuf,
  /// 失败图片数，缺省时从 combined_results.json 读取
  #[arg(long, value_name = "COUNT")]
  pub failed: Option<usize>,
}

fn failed_from_combined(directory: &std::path::Path) -> usize {
  let path = directory.join(COMBINED_FILE_NAME);
  let Ok(text) = std::fs::read_to_string(&path) else {
    return 0;
  };
  match serde_json::from_str::<serde_json::Value>(&text) {
    Ok(value) => value["failed"].as_array().map_or(0, Vec::len),
    Err(e) => {
      warn!("无法解析 {}: {}", path.display(), e);
      0
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let output = DirectoryRecordOutput::new(&args.records);
  let records = output.read_records()?;
  let failed = args
    .failed
    .unwrap_or_else(|| failed_from_combined(output.directory()));
  info!("读取到 {} 条记录，失败 {} 张", records.len(), failed);

  let summary = aggregate(&records, failed);
  output.write_summary(&summary)?;
  println!("{summary}");
  Ok(())
}
