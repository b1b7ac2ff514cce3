// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::input::SourceImage;
use crate::output::Render;
use crate::output::atomic_file::{AtomicFileError, write_json_atomic};
use crate::record::{DetectionRecord, FailedImage};
use crate::stats::RunSummary;

pub const COMBINED_FILE_NAME: &str = "combined_results.json";
pub const SUMMARY_FILE_NAME: &str = "summary.json";

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("写入记录失败: {0}")]
  AtomicFileError(#[from] AtomicFileError),
  #[error("读取目录 {path} 失败: {source}")]
  ReadDir {
    path: PathBuf,
    source: std::io::Error,
  },
}

#[derive(Serialize)]
struct CombinedResults<'a> {
  generated_at: String,
  records: &'a [DetectionRecord],
  failed: &'a [FailedImage],
}

/// 把检测记录写成 JSON 文件的目录
///
/// 每张图片写一个 `<文件名去扩展名>.json`，运行结束时另写
/// `combined_results.json` 和 `summary.json`。
#[derive(Debug, Clone)]
pub struct DirectoryRecordOutput {
  directory: PathBuf,
}

fn stem_of(image_id: &str) -> String {
  Path::new(image_id)
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| image_id.to_string())
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 与汇总文件同名的记录改写为 `<文件名>_record.json`
  pub fn record_path(&self, image_id: &str) -> PathBuf {
    let name = format!("{}.json", stem_of(image_id));
    if name == COMBINED_FILE_NAME || name == SUMMARY_FILE_NAME {
      return self
        .directory
        .join(format!("{}_record.json", stem_of(image_id)));
    }
    self.directory.join(name)
  }

  pub fn write_record(&self, record: &DetectionRecord) -> Result<(), DirectoryRecordOutputError> {
    write_json_atomic(&self.record_path(record.image_id()), record)?;
    Ok(())
  }

  pub fn write_combined(
    &self,
    records: &[DetectionRecord],
    failed: &[FailedImage],
  ) -> Result<PathBuf, DirectoryRecordOutputError> {
    let path = self.directory.join(COMBINED_FILE_NAME);
    let combined = CombinedResults {
      generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
      records,
      failed,
    };
    write_json_atomic(&path, &combined)?;
    info!("合并结果已写入: {}", path.display());
    Ok(path)
  }

  pub fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf, DirectoryRecordOutputError> {
    let path = self.directory.join(SUMMARY_FILE_NAME);
    write_json_atomic(&path, summary)?;
    info!("统计结果已写入: {}", path.display());
    Ok(path)
  }

  /// 读回目录中的单张记录，跳过汇总文件和无法解析的文件，按文件名排序
  pub fn read_records(&self) -> Result<Vec<DetectionRecord>, DirectoryRecordOutputError> {
    let read_dir = |source| DirectoryRecordOutputError::ReadDir {
      path: self.directory.clone(),
      source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(&self.directory).map_err(read_dir)? {
      let path = entry.map_err(read_dir)?.path();
      let is_json = path.extension().is_some_and(|e| e == "json");
      let is_aggregate = path
        .file_name()
        .is_some_and(|n| n == COMBINED_FILE_NAME || n == SUMMARY_FILE_NAME);
      if path.is_file() && is_json && !is_aggregate {
        paths.push(path);
      }
    }
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
      let parsed = std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str::<DetectionRecord>(&s).map_err(|e| e.to_string()));
      match parsed {
        Ok(record) => records.push(record),
        Err(e) => warn!("跳过无法解析的记录 {}: {}", path.display(), e),
      }
    }
    Ok(records)
  }
}

impl Render<SourceImage, DetectionRecord> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, _image: &SourceImage, record: &DetectionRecord) -> Result<(), Self::Error> {
    self.write_record(record)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::BBox;
  use crate::record::{Detections, FailureReason, ImageSize};
  use crate::stats::aggregate;

  fn record(id: &str, people: usize) -> DetectionRecord {
    DetectionRecord::new(
      id,
      ImageSize {
        width: 64,
        height: 64,
      },
      Detections {
        people: (0..people)
          .map(|i| BBox::new(i as u32, 0, i as u32 + 4, 8, 0.9).unwrap())
          .collect(),
        banners: Vec::new(),
      },
    )
  }

  #[test]
  fn records_round_trip_through_directory() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path().join("json"));
    let records = vec![record("b.png", 1), record("a.jpg", 2)];
    for r in &records {
      output.write_record(r).unwrap();
    }
    let failed = vec![FailedImage {
      image_id: "c.jpg".to_string(),
      path: PathBuf::from("/in/c.jpg"),
      reason: FailureReason::Unreadable("损坏".to_string()),
    }];
    output.write_combined(&records, &failed).unwrap();
    output.write_summary(&aggregate(&records, 1)).unwrap();
    std::fs::write(output.directory().join("junk.json"), "[1, 2").unwrap();

    assert!(output.record_path("a.jpg").ends_with("a.json"));
    let back = output.read_records().unwrap();
    assert_eq!(back.len(), 2);
    assert_eq!(back[0].image_id(), "a.jpg");
    assert_eq!(back[1].people_count(), 1);
  }

  #[test]
  fn records_never_collide_with_aggregate_files() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path());
    assert!(output.record_path("summary.jpg").ends_with("summary_record.json"));
    assert!(
      output
        .record_path("combined_results.png")
        .ends_with("combined_results_record.json")
    );

    let records = vec![record("summary.jpg", 3), record("street.jpg", 1)];
    for r in &records {
      output.write_record(r).unwrap();
    }
    output.write_combined(&records, &[]).unwrap();
    output.write_summary(&aggregate(&records, 0)).unwrap();

    let back = output.read_records().unwrap();
    assert_eq!(back.len(), 2);
    assert_eq!(back[0].image_id(), "street.jpg");
    assert_eq!(back[1].image_id(), "summary.jpg");
    assert_eq!(back[1].people_count(), 3);
  }

  #[test]
  fn combined_file_lists_failures() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path());
    let failed = vec![FailedImage {
      image_id: "tiny.png".to_string(),
      path: PathBuf::from("tiny.png"),
      reason: FailureReason::TooSmall {
        width: 2,
        height: 2,
        min_width: 10,
        min_height: 10,
      },
    }];
    let path = output.write_combined(&[record("a.jpg", 0)], &failed).unwrap();
    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert!(value["generated_at"].as_str().unwrap().ends_with('Z'));
    assert_eq!(value["records"][0]["image_id"], "a.jpg");
    assert_eq!(value["failed"][0]["reason"]["kind"], "too_small");
  }
}
