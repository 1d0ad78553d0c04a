// 该文件是 Fuguang （浮光） 项目的一部分。
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
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbaFrame,
  model::{DetectResult, label_name},
  output::{
    Render,
    save_image_file::{SaveImageFileError, save_frame},
  },
  url_file_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("保存图像错误: {0}")]
  SaveError(#[from] SaveImageFileError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 检测结果文本记录，每行 `label, score, x, y, w, h`
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn format(&self, result: &DetectResult) -> String {
    let mut records = Vec::new();
    for item in result.items.iter() {
      let name = match label_name(item.class_id) {
        Some(name) if self.label_with_name => name.to_string(),
        _ => format!("{}", item.class_id),
      };
      records.push(format!(
        "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}",
        name, item.score, item.rect.x, item.rect.y, item.rect.width, item.rect.height
      ));
    }
    records.join("\n")
  }

  pub fn record(&self, result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.format(result))
  }
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: Option<Record>,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| Record {
        label_with_name: v != "id",
      });
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(url_file_path(uri)),
      record,
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  /// `<dir>/YYYY/MM/DD/HH-MM-SS-XXXX.png`
  fn frame_path(&self) -> Result<PathBuf, std::io::Error> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbaFrame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbaFrame, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("没有检测结果，跳过记录");
      return Ok(());
    }

    let path = self.frame_path()?;
    save_frame(frame, &path)?;
    if let Some(record) = &self.record {
      record.record(result, &path)?;
    }
    debug!("记录帧到: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{geometry::Rect, model::DetectItem};

  fn result() -> DetectResult {
    DetectResult {
      items: vec![DetectItem {
        class_id: 16,
        score: 0.875,
        rect: Rect::new(8.0, 8.0, 4.0, 4.0),
      }]
      .into_boxed_slice(),
    }
  }

  #[test]
  fn test_record_format() {
    let by_name = Record {
      label_with_name: true,
    };
    assert_eq!(by_name.format(&result()), "dog, 0.8750, 8.0, 8.0, 4.0, 4.0");
    let by_id = Record {
      label_with_name: false,
    };
    assert_eq!(by_id.format(&result()), "16, 0.8750, 8.0, 8.0, 4.0, 4.0");
  }

  #[test]
  fn test_records_into_dated_directory() {
    let dir = std::env::temp_dir().join(format!("fuguang-record-{}", std::process::id()));
    let url = url::Url::parse(&format!("folder://{}?record=id", dir.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    // 没有检测结果且未设置 always 时不写文件
    output
      .render_result(&RgbaFrame::new(4, 4), &DetectResult::default())
      .unwrap();
    assert!(!dir.exists());

    output.render_result(&RgbaFrame::new(4, 4), &result()).unwrap();
    let day = std::fs::read_dir(&dir)
      .unwrap()
      .flatten()
      .flat_map(|y| std::fs::read_dir(y.path()).unwrap().flatten())
      .flat_map(|m| std::fs::read_dir(m.path()).unwrap().flatten())
      .next()
      .unwrap()
      .path();
    let mut names: Vec<String> = std::fs::read_dir(day)
      .unwrap()
      .flatten()
      .map(|e| e.file_name().to_string_lossy().into_owned())
      .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].ends_with("-0001.png"));
    assert!(names[1].ends_with("-0001.txt"));
    std::fs::remove_dir_all(&dir).ok();
  }
}
