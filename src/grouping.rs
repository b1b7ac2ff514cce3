// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/grouping.rs - 文字区域合并为招牌
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

//! 把 OCR 给出的单词级文字框按阅读顺序贪心聚类成招牌。
//!
//! 聚类是单遍、顺序相关的：文字框按 `(y_min, x_min)` 排序后逐个处理，
//! 每个框并入第一个兼容的簇（按创建顺序扫描），没有兼容簇时新建一个。
//! 两者纵向有重叠，或 `y_min` 之差小于 `y_tolerance`，即视为兼容。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::BBox;

/// 原始分辨率下带识别文字的框
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
  #[serde(flatten)]
  bbox: BBox,
  text: String,
}

impl TextBox {
  /// 文字会去掉首尾空白
  pub fn new(bbox: BBox, text: impl AsRef<str>) -> Self {
    Self {
      bbox,
      text: text.as_ref().trim().to_string(),
    }
  }

  pub fn bbox(&self) -> &BBox {
    &self.bbox
  }

  pub fn text(&self) -> &str {
    &self.text
  }
}

/// 由一个或多个文字框合并得到的招牌
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
  #[serde(flatten)]
  bbox: BBox,
  text: String,
}

impl Banner {
  pub fn bbox(&self) -> &BBox {
    &self.bbox
  }

  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn confidence(&self) -> f32 {
    self.bbox.confidence()
  }
}

/// 招牌置信度的计算方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConfidencePolicy {
  /// 成员置信度的最大值
  #[default]
  Max,
  /// 成员置信度的算术平均
  ///
  /// 文字为空的成员同样计入平均值，只是不出现在招牌文字中
  Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
  /// 低于该置信度的文字框被丢弃
  pub confidence_threshold: f32,
  pub min_text_width: u32,
  pub min_text_height: u32,
  /// 两个框 `y_min` 之差小于此值时视为同一行
  pub y_tolerance: u32,
  /// 面积小于此值的招牌被丢弃，0 表示不过滤
  pub min_banner_area: u64,
  pub confidence_policy: ConfidencePolicy,
}

impl Default for GroupingConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: 0.1,
      min_text_width: 10,
      min_text_height: 10,
      y_tolerance: 20,
      min_banner_area: 0,
      confidence_policy: ConfidencePolicy::Max,
    }
  }
}

struct Cluster<'a> {
  bbox: BBox,
  texts: Vec<&'a str>,
  confidence_max: f32,
  confidence_sum: f64,
}

impl<'a> Cluster<'a> {
  fn seed(word: &'a TextBox) -> Self {
    let confidence = word.bbox.confidence();
    Self {
      bbox: word.bbox,
      texts: vec![word.text()],
      confidence_max: confidence,
      confidence_sum: f64::from(confidence),
    }
  }

  fn accepts(&self, word: &TextBox, y_tolerance: u32) -> bool {
    self.bbox.vertical_overlap(&word.bbox) > 0
      || self.bbox.y_min().abs_diff(word.bbox.y_min()) < y_tolerance
  }

  fn absorb(&mut self, word: &'a TextBox) {
    let confidence = word.bbox.confidence();
    self.bbox = self.bbox.union(&word.bbox);
    self.texts.push(word.text());
    self.confidence_max = self.confidence_max.max(confidence);
    self.confidence_sum += f64::from(confidence);
  }

  fn finish(self, policy: ConfidencePolicy) -> Banner {
    let confidence = match policy {
      ConfidencePolicy::Max => self.confidence_max,
      ConfidencePolicy::Mean => (self.confidence_sum / self.texts.len() as f64) as f32,
    };
    let text = self
      .texts
      .into_iter()
      .filter(|t| !t.is_empty())
      .collect::<Vec<_>>()
      .join(" ");
    Banner {
      bbox: self.bbox.with_confidence_clamped(confidence),
      text,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct TextRegionGrouper {
  config: GroupingConfig,
}

impl TextRegionGrouper {
  pub fn new(config: GroupingConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &GroupingConfig {
    &self.config
  }

  fn is_noise(&self, word: &TextBox) -> bool {
    word.bbox.confidence() < self.config.confidence_threshold
      || word.bbox.width() < self.config.min_text_width
      || word.bbox.height() < self.config.min_text_height
  }

  pub fn group(&self, words: &[TextBox]) -> Vec<Banner> {
    let mut kept: Vec<&TextBox> = words.iter().filter(|w| !self.is_noise(w)).collect();
    // 稳定排序，同坐标的框保持输入顺序
    kept.sort_by_key(|w| (w.bbox.y_min(), w.bbox.x_min()));

    let mut clusters: Vec<Cluster> = Vec::new();
    for word in kept {
      match clusters
        .iter_mut()
        .find(|c| c.accepts(word, self.config.y_tolerance))
      {
        Some(cluster) => cluster.absorb(word),
        None => clusters.push(Cluster::seed(word)),
      }
    }

    let total = clusters.len();
    let banners: Vec<Banner> = clusters
      .into_iter()
      .map(|c| c.finish(self.config.confidence_policy))
      .filter(|b| b.bbox.area() >= self.config.min_banner_area)
      .collect();
    debug!(
      "文字框 {} 个，聚类 {} 个，保留招牌 {} 个",
      words.len(),
      total,
      banners.len()
    );
    banners
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn word(x_min: u32, y_min: u32, x_max: u32, y_max: u32, conf: f32, text: &str) -> TextBox {
    TextBox::new(BBox::new(x_min, y_min, x_max, y_max, conf).unwrap(), text)
  }

  fn grouper() -> TextRegionGrouper {
    TextRegionGrouper::new(GroupingConfig {
      y_tolerance: 20,
      ..Default::default()
    })
  }

  fn coords(banner: &Banner) -> (u32, u32, u32, u32) {
    let b = banner.bbox();
    (b.x_min(), b.y_min(), b.x_max(), b.y_max())
  }

  #[test]
  fn words_on_one_line_merge() {
    let words = vec![
      word(0, 200, 50, 220, 0.7, "Far"),
      word(55, 12, 100, 28, 0.6, "World"),
      word(0, 10, 50, 30, 0.9, "Hello"),
    ];
    let banners = grouper().group(&words);
    assert_eq!(banners.len(), 2);
    assert_eq!(coords(&banners[0]), (0, 10, 100, 30));
    assert_eq!(banners[0].text(), "Hello World");
    assert_eq!(banners[0].confidence(), 0.9);
    assert_eq!(coords(&banners[1]), (0, 200, 50, 220));
    assert_eq!(banners[1].text(), "Far");
  }

  #[test]
  fn empty_input_gives_no_banners() {
    assert!(grouper().group(&[]).is_empty());
  }

  #[test]
  fn noise_is_dropped() {
    let words = vec![
      word(0, 0, 5, 40, 0.9, "thin"),
      word(0, 0, 40, 5, 0.9, "flat"),
      word(0, 0, 40, 40, 0.05, "faint"),
      word(100, 100, 160, 130, 0.8, " OPEN "),
    ];
    let banners = grouper().group(&words);
    assert_eq!(banners.len(), 1);
    assert_eq!(banners[0].text(), "OPEN");
  }

  #[test]
  fn mean_policy_averages_members() {
    let grouper = TextRegionGrouper::new(GroupingConfig {
      confidence_policy: ConfidencePolicy::Mean,
      ..Default::default()
    });
    let banners = grouper.group(&[
      word(0, 10, 50, 30, 0.9, "Grand"),
      word(60, 10, 120, 30, 0.5, "Opening"),
    ]);
    assert_eq!(banners.len(), 1);
    assert!((banners[0].confidence() - 0.7).abs() < 1e-6);
  }

  #[test]
  fn blank_member_counts_toward_mean_but_not_text() {
    let grouper = TextRegionGrouper::new(GroupingConfig {
      confidence_policy: ConfidencePolicy::Mean,
      ..Default::default()
    });
    let words = vec![word(0, 0, 40, 20, 0.9, "A"), word(45, 0, 80, 20, 0.1, "   ")];
    let banners = grouper.group(&words);
    assert_eq!(banners.len(), 1);
    assert_eq!(banners[0].text(), "A");
    assert_eq!(coords(&banners[0]), (0, 0, 80, 20));
    assert!((banners[0].confidence() - 0.5).abs() < 1e-6);
  }

  #[test]
  fn y_tolerance_bridges_close_lines() {
    let words = [
      word(0, 0, 100, 20, 0.8, "SALE"),
      word(0, 35, 100, 55, 0.8, "TODAY"),
    ];
    assert_eq!(grouper().group(&words).len(), 2);
    let wide = TextRegionGrouper::new(GroupingConfig {
      y_tolerance: 40,
      ..Default::default()
    });
    let banners = wide.group(&words);
    assert_eq!(banners.len(), 1);
    assert_eq!(banners[0].text(), "SALE TODAY");
    assert_eq!(coords(&banners[0]), (0, 0, 100, 55));
  }

  #[test]
  fn min_banner_area_filters_small_groups() {
    let grouper = TextRegionGrouper::new(GroupingConfig {
      min_banner_area: 1000,
      ..Default::default()
    });
    let banners = grouper.group(&[
      word(0, 0, 20, 20, 0.8, "a"),
      word(0, 300, 100, 340, 0.8, "big"),
    ]);
    assert_eq!(banners.len(), 1);
    assert_eq!(banners[0].text(), "big");
  }

  #[test]
  fn grouping_is_deterministic() {
    let words: Vec<TextBox> = (0..30)
      .map(|i| {
        let x = (i * 37 % 400) as u32;
        let y = (i * 53 % 300) as u32;
        word(x, y, x + 30, y + 15, 0.5, &format!("w{i}"))
      })
      .collect();
    let first = grouper().group(&words);
    for _ in 0..5 {
      assert_eq!(grouper().group(&words), first);
    }
  }

  #[test]
  fn banner_json_is_flat() {
    let banners = grouper().group(&[word(1, 2, 30, 40, 0.5, "Hi")]);
    let json = serde_json::to_value(&banners[0]).unwrap();
    assert_eq!(
      json,
      serde_json::json!({
        "x_min": 1, "y_min": 2, "x_max": 30, "y_max": 40,
        "confidence": 0.5, "text": "Hi"
      })
    );
  }
}
