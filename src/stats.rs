// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/stats.rs - 运行统计
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

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::record::DetectionRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CountRange {
  min: usize,
  max: usize,
}

impl CountRange {
  fn merge(self, other: CountRange) -> CountRange {
    CountRange {
      min: self.min.min(other.min),
      max: self.max.max(other.max),
    }
  }
}

/// 可合并的统计累加器
///
/// 各工作线程分别累加，最后用 [`StatsAccumulator::merge`] 合并，结果与单次遍历一致。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsAccumulator {
  images: usize,
  people: usize,
  banners: usize,
  people_confidence_sum: f64,
  banner_confidence_sum: f64,
  images_with_people: usize,
  images_with_banners: usize,
  // 无图片时为 None
  people_range: Option<CountRange>,
  banner_range: Option<CountRange>,
}

fn widen(range: Option<CountRange>, count: usize) -> Option<CountRange> {
  let point = CountRange {
    min: count,
    max: count,
  };
  Some(range.map_or(point, |r| r.merge(point)))
}

fn join(a: Option<CountRange>, b: Option<CountRange>) -> Option<CountRange> {
  match (a, b) {
    (Some(a), Some(b)) => Some(a.merge(b)),
    (a, b) => a.or(b),
  }
}

fn ratio(sum: f64, count: usize) -> f64 {
  if count == 0 { 0.0 } else { sum / count as f64 }
}

impl StatsAccumulator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, record: &DetectionRecord) {
    let people = record.people_count();
    let banners = record.banner_count();
    self.images += 1;
    self.people += people;
    self.banners += banners;
    self.people_confidence_sum += record
      .people()
      .iter()
      .map(|b| f64::from(b.confidence()))
      .sum::<f64>();
    self.banner_confidence_sum += record
      .banners()
      .iter()
      .map(|b| f64::from(b.confidence()))
      .sum::<f64>();
    if people > 0 {
      self.images_with_people += 1;
    }
    if banners > 0 {
      self.images_with_banners += 1;
    }
    self.people_range = widen(self.people_range, people);
    self.banner_range = widen(self.banner_range, banners);
  }

  pub fn merge(mut self, other: StatsAccumulator) -> StatsAccumulator {
    self.images += other.images;
    self.people += other.people;
    self.banners += other.banners;
    self.people_confidence_sum += other.people_confidence_sum;
    self.banner_confidence_sum += other.banner_confidence_sum;
    self.images_with_people += other.images_with_people;
    self.images_with_banners += other.images_with_banners;
    self.people_range = join(self.people_range, other.people_range);
    self.banner_range = join(self.banner_range, other.banner_range);
    self
  }

  pub fn finish(&self, failed_images: usize) -> RunSummary {
    let people_range = self.people_range.unwrap_or_default();
    let banner_range = self.banner_range.unwrap_or_default();
    RunSummary {
      total_images: self.images,
      total_people: self.people,
      total_banners: self.banners,
      average_people_per_image: ratio(self.people as f64, self.images),
      average_banners_per_image: ratio(self.banners as f64, self.images),
      average_confidence_people: ratio(self.people_confidence_sum, self.people),
      average_confidence_banners: ratio(self.banner_confidence_sum, self.banners),
      max_people_in_image: people_range.max,
      min_people_in_image: people_range.min,
      max_banners_in_image: banner_range.max,
      min_banners_in_image: banner_range.min,
      images_with_people: self.images_with_people,
      images_with_banners: self.images_with_banners,
      failed_images,
    }
  }
}

impl<'a> Extend<&'a DetectionRecord> for StatsAccumulator {
  fn extend<I: IntoIterator<Item = &'a DetectionRecord>>(&mut self, iter: I) {
    for record in iter {
      self.add(record);
    }
  }
}

impl<'a> FromIterator<&'a DetectionRecord> for StatsAccumulator {
  fn from_iter<I: IntoIterator<Item = &'a DetectionRecord>>(iter: I) -> Self {
    let mut acc = StatsAccumulator::new();
    acc.extend(iter);
    acc
  }
}

/// 对一组检测记录做完整统计，`failed_images` 原样写入结果
pub fn aggregate<'a, I>(records: I, failed_images: usize) -> RunSummary
where
  I: IntoIterator<Item = &'a DetectionRecord>,
{
  records
    .into_iter()
    .collect::<StatsAccumulator>()
    .finish(failed_images)
}

fn round_to(value: f64, digits: i32) -> f64 {
  let factor = 10f64.powi(digits);
  (value * factor).round() / factor
}

fn two_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_f64(round_to(*value, 2))
}

fn four_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_f64(round_to(*value, 4))
}

/// 一次运行的汇总统计
///
/// 字段保存全精度数值，仅在序列化与显示时取整：每图平均值保留 2 位小数，置信度均值保留 4 位。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
  pub total_images: usize,
  pub total_people: usize,
  pub total_banners: usize,
  #[serde(serialize_with = "two_decimals")]
  pub average_people_per_image: f64,
  #[serde(serialize_with = "two_decimals")]
  pub average_banners_per_image: f64,
  #[serde(serialize_with = "four_decimals")]
  pub average_confidence_people: f64,
  #[serde(serialize_with = "four_decimals")]
  pub average_confidence_banners: f64,
  pub max_people_in_image: usize,
  pub min_people_in_image: usize,
  pub max_banners_in_image: usize,
  pub min_banners_in_image: usize,
  pub images_with_people: usize,
  pub images_with_banners: usize,
  pub failed_images: usize,
}

impl fmt::Display for RunSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "处理图片: {} 张（失败 {} 张）", self.total_images, self.failed_images)?;
    writeln!(
      f,
      "行人: 共 {} 个，平均每张 {:.2} 个，单张最多 {} 个、最少 {} 个，含行人的图片 {} 张，平均置信度 {:.4}",
      self.total_people,
      self.average_people_per_image,
      self.max_people_in_image,
      self.min_people_in_image,
      self.images_with_people,
      self.average_confidence_people
    )?;
    write!(
      f,
      "招牌: 共 {} 个，平均每张 {:.2} 个，单张最多 {} 个、最少 {} 个，含招牌的图片 {} 张，平均置信度 {:.4}",
      self.total_banners,
      self.average_banners_per_image,
      self.max_banners_in_image,
      self.min_banners_in_image,
      self.images_with_banners,
      self.average_confidence_banners
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::BBox;
  use crate::record::{Detections, ImageSize};

  fn record(id: &str, people: &[f32]) -> DetectionRecord {
    let people = people
      .iter()
      .enumerate()
      .map(|(i, &c)| BBox::new(i as u32 * 10, 0, i as u32 * 10 + 5, 20, c).unwrap())
      .collect();
    DetectionRecord::new(
      id,
      ImageSize {
        width: 100,
        height: 100,
      },
      Detections {
        people,
        banners: Vec::new(),
      },
    )
  }

  fn sample() -> Vec<DetectionRecord> {
    vec![
      record("a", &[0.5, 0.75]),
      record("b", &[1.0]),
      record("c", &[]),
    ]
  }

  #[test]
  fn people_counts_fold() {
    let summary = aggregate(&sample(), 1);
    assert_eq!(summary.total_images, 3);
    assert_eq!(summary.total_people, 3);
    assert_eq!(summary.average_people_per_image, 1.0);
    assert_eq!(summary.max_people_in_image, 2);
    assert_eq!(summary.min_people_in_image, 0);
    assert_eq!(summary.images_with_people, 2);
    assert_eq!(summary.failed_images, 1);
    assert!((summary.average_confidence_people - 0.75).abs() < 1e-9);
    assert_eq!(summary.total_banners, 0);
    assert_eq!(summary.average_confidence_banners, 0.0);
  }

  #[test]
  fn no_records_gives_zero_summary() {
    let none: Vec<DetectionRecord> = Vec::new();
    let summary = aggregate(&none, 0);
    assert_eq!(summary, RunSummary::default());
    let summary = aggregate(&none, 4);
    assert_eq!(summary.failed_images, 4);
    assert_eq!(summary.min_people_in_image, 0);
  }

  #[test]
  fn aggregation_is_repeatable() {
    let records = sample();
    assert_eq!(aggregate(&records, 2), aggregate(&records, 2));
  }

  #[test]
  fn partial_folds_merge_to_full_fold() {
    let records = sample();
    let whole: StatsAccumulator = records.iter().collect();
    let left: StatsAccumulator = records[..1].iter().collect();
    let right: StatsAccumulator = records[1..].iter().collect();
    assert_eq!(right.clone().merge(left.clone()).finish(0), whole.finish(0));
    assert_eq!(
      StatsAccumulator::new().merge(whole.clone()).finish(0),
      whole.finish(0)
    );
  }

  #[test]
  fn rounding_applies_on_output_only() {
    let records = vec![record("a", &[0.12345]), record("b", &[]), record("c", &[])];
    let summary = aggregate(&records, 0);
    assert!((summary.average_people_per_image - 1.0 / 3.0).abs() < 1e-12);
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["average_people_per_image"], serde_json::json!(0.33));
    assert_eq!(json["average_confidence_people"], serde_json::json!(0.1235));
  }
}
