// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/task.rs - 检测任务
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
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::frame::WorkingFrame;
use crate::geometry::RawBox;
use crate::grouping::TextRegionGrouper;
use crate::input::{SourceImage, load_source_image};
use crate::model::{Model, RawText};
use crate::output::Render;
use crate::pipeline::RecordAssembler;
use crate::record::{DetectionRecord, FailedImage, FailureReason, ImageOutcome};
use crate::stats::{RunSummary, aggregate};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 行人检测与文字识别两个模型
pub struct Detectors<P, T> {
  pub people: P,
  pub text: T,
}

impl<P, T> Detectors<P, T> {
  pub fn new(people: P, text: T) -> Self {
    Self { people, text }
  }
}

/// 对一张已读取的图片运行两个模型并组装记录
pub fn detect_image<P, T>(
  source: &SourceImage,
  config: &PipelineConfig,
  assembler: &RecordAssembler,
  detectors: &Detectors<P, T>,
) -> Result<DetectionRecord, FailureReason>
where
  P: Model<Input = WorkingFrame, Output = Vec<RawBox>>,
  P::Error: std::fmt::Display,
  T: Model<Input = WorkingFrame, Output = Vec<RawText>>,
  T::Error: std::fmt::Display,
{
  let size = source.size();
  if size.width < config.image.min_width || size.height < config.image.min_height {
    return Err(FailureReason::TooSmall {
      width: size.width,
      height: size.height,
      min_width: config.image.min_width,
      min_height: config.image.min_height,
    });
  }

  let frame = WorkingFrame::from_source(source, config.image.max_side);
  let now = Instant::now();
  let people = detectors
    .people
    .infer(&frame)
    .map_err(|e| FailureReason::PersonDetector(e.to_string()))?;
  let texts = detectors
    .text
    .infer(&frame)
    .map_err(|e| FailureReason::TextRecognizer(e.to_string()))?;
  debug!(
    "{} 推理完成，耗时: {:.2?}，行人 {} 个，文字 {} 段",
    frame.image_id(),
    now.elapsed(),
    people.len(),
    texts.len()
  );

  Ok(assembler.assemble(
    frame.image_id(),
    frame.original_size(),
    frame.scale(),
    &people,
    &texts,
  ))
}

fn image_id_of(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string())
}

/// 读取、检测、输出一张图片，任何一步失败都转成 [`ImageOutcome::Failed`]
pub fn process_image<P, T, O>(
  path: &Path,
  config: &PipelineConfig,
  assembler: &RecordAssembler,
  detectors: &Detectors<P, T>,
  output: &O,
) -> ImageOutcome
where
  P: Model<Input = WorkingFrame, Output = Vec<RawBox>>,
  P::Error: std::fmt::Display,
  T: Model<Input = WorkingFrame, Output = Vec<RawText>>,
  T::Error: std::fmt::Display,
  O: Render<SourceImage, DetectionRecord>,
  O::Error: std::fmt::Display,
{
  let failed = |reason: FailureReason| {
    warn!("{} 处理失败: {}", path.display(), reason);
    ImageOutcome::Failed(FailedImage {
      image_id: image_id_of(path),
      path: path.to_path_buf(),
      reason,
    })
  };

  let source = match load_source_image(path) {
    Ok(source) => source,
    Err(e) => return failed(FailureReason::Unreadable(e.to_string())),
  };
  let record = match detect_image(&source, config, assembler, detectors) {
    Ok(record) => record,
    Err(reason) => return failed(reason),
  };
  if let Err(e) = output.render_result(&source, &record) {
    return failed(FailureReason::Output(e.to_string()));
  }
  info!(
    "{}: 行人 {} 个，招牌 {} 个",
    record.image_id(),
    record.people_count(),
    record.banner_count()
  );
  ImageOutcome::Detected(record)
}

/// 一次批量运行的结果，记录按输入顺序排列
#[derive(Debug, Clone)]
pub struct RunReport {
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub records: Vec<DetectionRecord>,
  pub failures: Vec<FailedImage>,
  pub interrupted: bool,
}

impl RunReport {
  pub fn summary(&self) -> RunSummary {
    aggregate(&self.records, self.failures.len())
  }
}

/// 对目录中的所有图片运行检测
///
/// `config.workers` 个线程从共享的下标取图片，模型需可跨线程共享。
/// 设置了停止标志后不再取新图片，已完成的结果照常返回。
pub struct BatchTask<'a> {
  config: &'a PipelineConfig,
  stop: Option<Arc<AtomicBool>>,
}

impl<'a> BatchTask<'a> {
  pub fn new(config: &'a PipelineConfig) -> Self {
    Self { config, stop: None }
  }

  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn stopped(&self) -> bool {
    self
      .stop
      .as_ref()
      .is_some_and(|flag| flag.load(Ordering::SeqCst))
  }
}

impl<I, P, T, O> Task<I, Detectors<P, T>, O> for BatchTask<'_>
where
  I: IntoIterator<Item = PathBuf>,
  P: Model<Input = WorkingFrame, Output = Vec<RawBox>> + Sync,
  P::Error: std::fmt::Display,
  T: Model<Input = WorkingFrame, Output = Vec<RawText>> + Sync,
  T::Error: std::fmt::Display,
  O: Render<SourceImage, DetectionRecord> + Sync,
  O::Error: std::fmt::Display,
{
  type Output = RunReport;
  type Error = anyhow::Error;

  fn run_task(self, input: I, detectors: Detectors<P, T>, output: O) -> Result<RunReport, Self::Error> {
    let started_at = Utc::now();
    let paths: Vec<PathBuf> = input.into_iter().collect();
    let workers = self.config.workers.clamp(1, paths.len().max(1));
    let assembler = RecordAssembler::new(TextRegionGrouper::new(self.config.grouping.clone()));
    info!("开始任务: {} 张图片，{} 个工作线程", paths.len(), workers);

    let next = AtomicUsize::new(0);
    let (task, next, paths_ref) = (&self, &next, &paths);
    let (assembler, detectors, output) = (&assembler, &detectors, &output);
    let mut outcomes: Vec<(usize, ImageOutcome)> = thread::scope(|s| {
      let handles: Vec<_> = (0..workers)
        .map(|_| {
          s.spawn(move || {
            let mut local = Vec::new();
            loop {
              if task.stopped() {
                break;
              }
              let index = next.fetch_add(1, Ordering::SeqCst);
              let Some(path) = paths_ref.get(index) else {
                break;
              };
              info!("处理第 {}/{} 张图片: {}", index + 1, paths_ref.len(), path.display());
              let outcome = process_image(path, task.config, assembler, detectors, output);
              local.push((index, outcome));
            }
            local
          })
        })
        .collect();
      handles
        .into_iter()
        .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
        .collect()
    });
    outcomes.sort_by_key(|(index, _)| *index);

    let interrupted = outcomes.len() < paths.len();
    if interrupted {
      warn!(
        "任务被中断，已处理 {}/{} 张图片",
        outcomes.len(),
        paths.len()
      );
    }

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for (_, outcome) in outcomes {
      match outcome {
        ImageOutcome::Detected(record) => records.push(record),
        ImageOutcome::Failed(failed) => failures.push(failed),
      }
    }

    let report = RunReport {
      started_at,
      finished_at: Utc::now(),
      records,
      failures,
      interrupted,
    };
    info!(
      "任务完成，成功 {} 张，失败 {} 张，耗时 {} 秒",
      report.records.len(),
      report.failures.len(),
      (report.finished_at - report.started_at).num_seconds()
    );
    Ok(report)
  }
}

/// 只处理一张图片，任何失败都作为错误返回
pub struct OneShotTask<'a> {
  config: &'a PipelineConfig,
}

impl<'a> OneShotTask<'a> {
  pub fn new(config: &'a PipelineConfig) -> Self {
    Self { config }
  }
}

impl<P, T, O> Task<&Path, Detectors<P, T>, O> for OneShotTask<'_>
where
  P: Model<Input = WorkingFrame, Output = Vec<RawBox>>,
  P::Error: std::fmt::Display,
  T: Model<Input = WorkingFrame, Output = Vec<RawText>>,
  T::Error: std::fmt::Display,
  O: Render<SourceImage, DetectionRecord>,
  O::Error: std::fmt::Display,
{
  type Output = DetectionRecord;
  type Error = anyhow::Error;

  fn run_task(self, input: &Path, detectors: Detectors<P, T>, output: O) -> Result<DetectionRecord, Self::Error> {
    info!("开始任务: {}", input.display());
    let assembler = RecordAssembler::new(TextRegionGrouper::new(self.config.grouping.clone()));
    match process_image(input, self.config, &assembler, &detectors, &output) {
      ImageOutcome::Detected(record) => Ok(record),
      ImageOutcome::Failed(failed) => Err(anyhow::anyhow!("{}: {}", failed.image_id, failed.reason)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::output::OutputSet;
  use std::sync::Mutex;

  struct FixedPeople(Vec<RawBox>);

  impl Model for FixedPeople {
    type Input = WorkingFrame;
    type Output = Vec<RawBox>;
    type Error = std::io::Error;

    fn infer(&self, frame: &WorkingFrame) -> Result<Vec<RawBox>, Self::Error> {
      if frame.image_id().starts_with("fail") {
        return Err(std::io::Error::other("模型崩溃"));
      }
      Ok(self.0.clone())
    }
  }

  struct NoText;

  impl Model for NoText {
    type Input = WorkingFrame;
    type Output = Vec<RawText>;
    type Error = std::io::Error;

    fn infer(&self, _frame: &WorkingFrame) -> Result<Vec<RawText>, Self::Error> {
      Ok(Vec::new())
    }
  }

  #[derive(Default)]
  struct Collect(Mutex<Vec<String>>);

  impl Render<SourceImage, DetectionRecord> for &Collect {
    type Error = std::io::Error;

    fn render_result(&self, _source: &SourceImage, record: &DetectionRecord) -> Result<(), Self::Error> {
      self.0.lock().unwrap().push(record.image_id().to_string());
      Ok(())
    }
  }

  fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::new(width, height).save(&path).unwrap();
    path
  }

  fn detectors() -> Detectors<FixedPeople, NoText> {
    Detectors::new(
      FixedPeople(vec![RawBox::new(1.0, 1.0, 10.0, 10.0, 0.9).unwrap()]),
      NoText,
    )
  }

  #[test]
  fn failures_are_recorded_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = vec![
      write_png(dir.path(), "a.png", 32, 32),
      write_png(dir.path(), "fail.png", 32, 32),
      write_png(dir.path(), "tiny.png", 2, 2),
    ];
    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"nope").unwrap();
    paths.push(broken);

    let mut config = PipelineConfig::default();
    config.image.min_width = 8;
    config.image.min_height = 8;
    let collect = Collect::default();
    let report = BatchTask::new(&config)
      .run_task(paths, detectors(), &collect)
      .unwrap();

    assert!(!report.interrupted);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].people_count(), 1);
    let reasons: Vec<_> = report.failures.iter().map(|f| &f.reason).collect();
    assert!(matches!(reasons[0], FailureReason::PersonDetector(_)));
    assert!(matches!(reasons[1], FailureReason::TooSmall { width: 2, .. }));
    assert!(matches!(reasons[2], FailureReason::Unreadable(_)));
    assert_eq!(report.summary().failed_images, 3);
    assert_eq!(*collect.0.lock().unwrap(), vec!["a.png".to_string()]);
  }

  #[test]
  fn parallel_run_keeps_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..12)
      .map(|i| write_png(dir.path(), &format!("img_{i:02}.png"), 16, 16))
      .collect();
    let mut config = PipelineConfig::default();
    config.workers = 4;

    let report = BatchTask::new(&config)
      .run_task(paths, detectors(), OutputSet::none())
      .unwrap();
    let ids: Vec<_> = report.records.iter().map(|r| r.image_id().to_string()).collect();
    let expected: Vec<_> = (0..12).map(|i| format!("img_{i:02}.png")).collect();
    assert_eq!(ids, expected);
    assert_eq!(report.summary().total_people, 12);
  }

  #[test]
  fn stop_flag_prevents_new_work() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![write_png(dir.path(), "a.png", 16, 16)];
    let config = PipelineConfig::default();
    let stop = Arc::new(AtomicBool::new(true));

    let report = BatchTask::new(&config)
      .with_stop_flag(stop)
      .run_task(paths, detectors(), OutputSet::none())
      .unwrap();
    assert!(report.interrupted);
    assert!(report.records.is_empty());
    assert_eq!(report.summary(), RunSummary::default());
  }

  #[test]
  fn one_shot_reports_failure_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let ok = write_png(dir.path(), "ok.png", 16, 16);
    let bad = write_png(dir.path(), "fail_me.png", 16, 16);
    let config = PipelineConfig::default();

    let record = OneShotTask::new(&config)
      .run_task(ok.as_path(), detectors(), OutputSet::none())
      .unwrap();
    assert_eq!(record.image_id(), "ok.png");
    assert!(
      OneShotTask::new(&config)
        .run_task(bad.as_path(), detectors(), OutputSet::none())
        .is_err()
    );
  }
}
