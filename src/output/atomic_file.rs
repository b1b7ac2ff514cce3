// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/output/atomic_file.rs - 原子写文件
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

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum AtomicFileError {
  #[error("写入 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("JSON 序列化失败: {0}")]
  Json(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AtomicFileError + '_ {
  move |source| AtomicFileError::Io {
    path: path.to_path_buf(),
    source,
  }
}

// 临时文件与目标位于同一目录，rename 才是原子的
fn temp_beside(path: &Path) -> Result<NamedTempFile, AtomicFileError> {
  let parent = match path.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  };
  std::fs::create_dir_all(parent).map_err(io_error(parent))?;
  NamedTempFile::new_in(parent).map_err(io_error(parent))
}

/// 先写同目录下的临时文件，再替换目标文件，读者不会看到写了一半的内容
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AtomicFileError> {
  let mut file = temp_beside(path)?;
  file.write_all(bytes).map_err(io_error(path))?;
  file.flush().map_err(io_error(path))?;
  file.persist(path).map_err(|e| io_error(path)(e.error))?;
  debug!("已写入 {}", path.display());
  Ok(())
}

/// 以缩进格式原子地写入 JSON
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AtomicFileError> {
  let file = temp_beside(path)?;
  let mut writer = BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, value)?;
  writer.write_all(b"\n").map_err(io_error(path))?;
  let file = writer.into_inner().map_err(|e| io_error(path)(e.into_error()))?;
  file.persist(path).map_err(|e| io_error(path)(e.error))?;
  debug!("已写入 {}", path.display());
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn replaces_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.json");
    std::fs::write(&path, "old").unwrap();

    write_json_atomic(&path, &serde_json::json!({"total_images": 3})).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["total_images"], 3);

    // 目录中不应残留临时文件
    let entries = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 1);
  }

  #[test]
  fn creates_missing_parent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a").join("b").join("config.toml");
    write_atomic(&path, b"workers = 1\n").unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"workers = 1\n");
  }
}
