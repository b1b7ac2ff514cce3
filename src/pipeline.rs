// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/pipeline.rs - 检测结果组装
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

use tracing::debug;

use crate::geometry::{RawBox, ScaleTransform};
use crate::grouping::{TextBox, TextRegionGrouper};
use crate::model::RawText;
use crate::record::{DetectionRecord, Detections, ImageSize};

/// 把模型的原始输出映射回原图坐标，合并文字框，组装成检测记录
#[derive(Debug, Clone, Default)]
pub struct RecordAssembler {
  grouper: TextRegionGrouper,
}

impl RecordAssembler {
  pub fn new(grouper: TextRegionGrouper) -> Self {
    Self { grouper }
  }

  pub fn grouper(&self) -> &TextRegionGrouper {
    &self.grouper
  }

  pub fn assemble(
    &self,
    image_id: &str,
    size: ImageSize,
    scale: ScaleTransform,
    people: &[RawBox],
    texts: &[RawText],
  ) -> DetectionRecord {
    let people = people
      .iter()
      .map(|p| scale.rescale(p, size.width, size.height))
      .collect();
    let words: Vec<TextBox> = texts
      .iter()
      .map(|t| TextBox::new(scale.rescale(t.region(), size.width, size.height), t.text()))
      .collect();
    let banners = self.grouper.group(&words);
    debug!("{}: 文字框 {} 个 -> 招牌 {} 个", image_id, words.len(), banners.len());

    DetectionRecord::new(image_id, size, Detections { people, banners })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grouping::GroupingConfig;

  #[test]
  fn working_boxes_map_to_original_resolution() {
    let assembler = RecordAssembler::new(TextRegionGrouper::new(GroupingConfig::default()));
    let size = ImageSize {
      width: 1000,
      height: 800,
    };
    let scale = ScaleTransform::new(0.5).unwrap();
    let people = [RawBox::new(10.0, 20.0, 60.0, 390.0, 0.9).unwrap()];
    let texts = [
      RawText::new(RawBox::new(0.0, 5.0, 25.0, 15.0, 0.8).unwrap(), "Hello"),
      RawText::new(RawBox::new(27.0, 6.0, 50.0, 14.0, 0.6).unwrap(), "World"),
      // 推理分辨率下 4x4，映射回原图后 8x8，仍低于最小尺寸
      RawText::new(RawBox::new(300.0, 300.0, 304.0, 304.0, 0.9).unwrap(), "x"),
    ];

    let record = assembler.assemble("shop.jpg", size, scale, &people, &texts);
    assert_eq!(record.image_id(), "shop.jpg");
    let p = record.people()[0];
    assert_eq!((p.x_min(), p.y_min(), p.x_max(), p.y_max()), (20, 40, 120, 780));
    assert_eq!(record.banner_count(), 1);
    let b = record.banners()[0].bbox();
    assert_eq!((b.x_min(), b.y_min(), b.x_max(), b.y_max()), (0, 10, 100, 30));
    assert_eq!(record.banners()[0].text(), "Hello World");
  }

  #[test]
  fn boxes_outside_the_image_are_clipped_not_dropped() {
    let assembler = RecordAssembler::default();
    let size = ImageSize {
      width: 80,
      height: 80,
    };
    let people = [
      RawBox::new(0.0, 0.0, 100.0, 100.0, 0.7).unwrap(),
      RawBox::new(90.0, 90.0, 120.0, 120.0, 0.7).unwrap(),
    ];
    let record = assembler.assemble("edge.png", size, ScaleTransform::new(0.5).unwrap(), &people, &[]);
    assert_eq!(record.people_count(), 2);
    assert_eq!(record.people()[0].x_max(), 80);
    assert_eq!(record.people()[1].area(), 0);
  }
}
