// 该文件是 Zhaopai （招牌） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::OutputConfig;
use crate::geometry::BBox;
use crate::record::DetectionRecord;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_FALLBACK_CHAR_WIDTH: u32 = 8;
const LABEL_FALLBACK_HEIGHT: u32 = 16;
const LABEL_PADDING: u32 = 2;
const LABEL_MAX_CHARS: usize = 50;
const LABEL_BACKGROUND: [u8; 3] = [0, 0, 0];
const LEGEND_TEXT: [u8; 3] = [255, 255, 255];
const LEGEND_MARGIN: i32 = 10;

const SYSTEM_FONTS: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("读取字体文件 {path} 失败: {source}")]
  FontRead {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("字体文件无效: {0}")]
  FontInvalid(PathBuf),
}

fn load_font(path: &Path) -> Result<FontVec, DrawError> {
  let data = std::fs::read(path).map_err(|source| DrawError::FontRead {
    path: path.to_path_buf(),
    source,
  })?;
  FontVec::try_from_vec(data).map_err(|_| DrawError::FontInvalid(path.to_path_buf()))
}

fn system_font() -> Option<FontVec> {
  for path in SYSTEM_FONTS {
    if let Ok(data) = std::fs::read(path)
      && let Ok(font) = FontVec::try_from_vec(data)
    {
      info!("使用系统字体: {}", path);
      return Some(font);
    }
  }
  debug!("未找到系统字体，只绘制边框与标签底色");
  None
}

/// 超过 `max_chars` 个字符时截断并追加 `...`
pub fn truncate_label(text: &str, max_chars: usize) -> String {
  match text.char_indices().nth(max_chars) {
    Some((cut, _)) => format!("{}...", &text[..cut]),
    None => text.to_string(),
  }
}

pub fn person_label(index: usize, confidence: f32) -> String {
  format!("Person #{index} ({confidence:.2})")
}

pub fn banner_label(index: usize, confidence: f32, text: &str) -> String {
  format!(
    "Banner #{index} ({confidence:.2}): {}",
    truncate_label(text, LABEL_MAX_CHARS)
  )
}

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  thickness: u32,
  person_color: [u8; 3],
  banner_color: [u8; 3],
}

impl Draw {
  pub fn new(font: Option<FontVec>, style: &OutputConfig) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      thickness: style.box_thickness.max(1),
      person_color: style.person_color,
      banner_color: style.banner_color,
    }
  }

  /// 指定了字体文件时必须能加载，否则尝试常见的系统字体
  pub fn from_config(style: &OutputConfig) -> Result<Self, DrawError> {
    let font = match &style.font_path {
      Some(path) => Some(load_font(path)?),
      None => system_font(),
    };
    Ok(Self::new(font, style))
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  fn label_extent(&self, text: &str) -> (u32, u32) {
    match &self.font {
      Some(font) => text_size(PxScale::from(self.font_size), font, text),
      None => (
        text.chars().count() as u32 * LABEL_FALLBACK_CHAR_WIDTH,
        LABEL_FALLBACK_HEIGHT,
      ),
    }
  }

  // 边框向内加粗，零宽或零高的框不画
  fn draw_box(&self, image: &mut RgbImage, bbox: &BBox, color: [u8; 3]) {
    for t in 0..self.thickness {
      let width = bbox.width().saturating_sub(2 * t);
      let height = bbox.height().saturating_sub(2 * t);
      if width == 0 || height == 0 {
        break;
      }
      let rect = Rect::at((bbox.x_min() + t) as i32, (bbox.y_min() + t) as i32).of_size(width, height);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }
  }

  /// 在 (x, y) 处画带底色的标签，返回标签高度
  fn draw_label(&self, image: &mut RgbImage, x: i32, y: i32, text: &str, color: [u8; 3]) -> u32 {
    let (text_width, text_height) = self.label_extent(text);
    let max_width = (image.width() as i32 - x).max(0) as u32;
    let width = (text_width + 2 * LABEL_PADDING).min(max_width);
    let height = text_height + LABEL_PADDING;
    if width == 0 || x < 0 || y < 0 || y >= image.height() as i32 {
      return height;
    }
    let rect = Rect::at(x, y).of_size(width, height);
    draw_filled_rect_mut(image, rect, Rgb(LABEL_BACKGROUND));
    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb(color),
        x + LABEL_PADDING as i32,
        y + 1,
        PxScale::from(self.font_size),
        font,
        text,
      );
    }
    height
  }

  /// 行人标签在框上方，招牌标签在框下方，左上角为图例
  pub fn draw_record(&self, image: &RgbImage, record: &DetectionRecord) -> RgbImage {
    let mut canvas = image.clone();
    let image_height = canvas.height() as i32;

    for (idx, person) in record.people().iter().enumerate() {
      self.draw_box(&mut canvas, person, self.person_color);
      let label = person_label(idx + 1, person.confidence());
      let (_, h) = self.label_extent(&label);
      let y = (person.y_min() as i32 - h as i32 - 5).max(0);
      self.draw_label(&mut canvas, person.x_min() as i32, y, &label, self.person_color);
    }

    for (idx, banner) in record.banners().iter().enumerate() {
      let bbox = banner.bbox();
      self.draw_box(&mut canvas, bbox, self.banner_color);
      let label = banner_label(idx + 1, banner.confidence(), banner.text());
      let (_, h) = self.label_extent(&label);
      let y = (bbox.y_max() as i32 + 5).min(image_height - h as i32 - 5).max(0);
      self.draw_label(&mut canvas, bbox.x_min() as i32, y, &label, self.banner_color);
    }

    let legend = [
      format!("Image: {}", record.image_id()),
      format!("People: {}", record.people_count()),
      format!("Banners: {}", record.banner_count()),
    ];
    let mut y = LEGEND_MARGIN;
    for line in &legend {
      let height = self.draw_label(&mut canvas, LEGEND_MARGIN, y, line, LEGEND_TEXT);
      y += height as i32 + 5;
    }

    canvas
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::{Detections, ImageSize};

  fn record(people: Vec<BBox>) -> DetectionRecord {
    DetectionRecord::new(
      "street.png",
      ImageSize {
        width: 200,
        height: 120,
      },
      Detections {
        people,
        banners: Vec::new(),
      },
    )
  }

  #[test]
  fn labels_follow_report_format() {
    assert_eq!(person_label(1, 0.876), "Person #1 (0.88)");
    let long = "A".repeat(60);
    let label = banner_label(2, 0.5, &long);
    assert_eq!(label, format!("Banner #2 (0.50): {}...", "A".repeat(50)));
    assert_eq!(truncate_label("招牌", 50), "招牌");
    assert_eq!(truncate_label("营业中欢迎光临", 3), "营业中...");
  }

  #[test]
  fn boxes_are_drawn_without_font() {
    let draw = Draw::new(None, &OutputConfig::default());
    let image = RgbImage::from_pixel(200, 120, Rgb([128, 128, 128]));
    let people = vec![BBox::new(100, 50, 150, 110, 0.9).unwrap()];
    let out = draw.draw_record(&image, &record(people));
    assert_eq!(out.dimensions(), (200, 120));
    // 框的左边线
    assert_eq!(out.get_pixel(100, 80).0, OutputConfig::default().person_color);
    // 框内部保持原样
    assert_eq!(out.get_pixel(125, 80).0, [128, 128, 128]);
  }

  #[test]
  fn degenerate_boxes_do_not_panic() {
    let draw = Draw::new(None, &OutputConfig::default());
    let image = RgbImage::new(50, 50);
    let people = vec![
      BBox::new(10, 10, 10, 30, 0.5).unwrap(),
      BBox::new(50, 50, 50, 50, 0.5).unwrap(),
      BBox::new(0, 0, 1, 1, 0.5).unwrap(),
    ];
    let out = draw.draw_record(&image, &record(people));
    assert_eq!(out.dimensions(), (50, 50));
  }

  #[test]
  fn explicit_missing_font_is_an_error() {
    let style = OutputConfig {
      font_path: Some(PathBuf::from("/definitely/missing/font.ttf")),
      ..Default::default()
    };
    assert!(matches!(
      Draw::from_config(&style),
      Err(DrawError::FontRead { .. })
    ));
  }
}
