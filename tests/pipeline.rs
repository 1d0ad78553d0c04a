// 该文件是 Fuguang （浮光） 项目的一部分。
// tests/pipeline.rs - 端到端管线测试
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

use image::{Rgb, RgbImage, Rgba};
use url::Url;

use fuguang::{
  FromUrl,
  input::{InputError, SourceWrapper},
  model::{ModelWrapper, ReplayDocument, TensorDump},
  output::{CompositeConfig, CompositeMode, OutputWrapper},
  task::{ContinuousTask, OneShotTask, PipelineSettings, Task},
};

const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
const GRAY: Rgba<u8> = Rgba([50, 50, 50, 255]);

fn workspace(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("fuguang-it-{}-{}", name, std::process::id()));
  std::fs::remove_dir_all(&dir).ok();
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

fn url(scheme: &str, path: &Path, query: &str) -> Url {
  Url::parse(&format!("{}://{}{}", scheme, path.display(), query)).unwrap()
}

fn write_replay(dir: &Path, document: &ReplayDocument) -> Url {
  let path = dir.join("dump.json");
  std::fs::write(&path, serde_json::to_string(document).unwrap()).unwrap();
  url("tensor", &path, "")
}

fn settings(mode: CompositeMode) -> PipelineSettings {
  PipelineSettings {
    class_count: 2,
    threshold: 0.3,
    composite: CompositeConfig::new(mode, 0.3)
      .unwrap()
      .with_max_stroke_width(Some(1)),
  }
}

/// 递归收集目录下指定扩展名的文件
fn collect(dir: &Path, ext: &str, found: &mut Vec<PathBuf>) {
  for entry in std::fs::read_dir(dir).unwrap().flatten() {
    let path = entry.path();
    if path.is_dir() {
      collect(&path, ext, found);
    } else if path.extension().is_some_and(|e| e == ext) {
      found.push(path);
    }
  }
  found.sort();
}

#[test]
fn test_oneshot_overlay_to_image_file() {
  let dir = workspace("oneshot");
  let frames = dir.join("frames");
  std::fs::create_dir_all(&frames).unwrap();
  // 32x16 的画面按覆盖缩放后居中裁剪为 16x16
  RgbImage::from_pixel(32, 16, Rgb([50, 50, 50]))
    .save(frames.join("0001.png"))
    .unwrap();

  let document = ReplayDocument {
    input_width: 16,
    input_height: 16,
    boxes: TensorDump {
      shape: vec![2, 6],
      data: vec![
        8.0, 4.0, 8.0, 4.0, 0.1, 0.9, // 类别 1，框 (4, 2, 8, 4)
        8.0, 8.0, 4.0, 4.0, 0.2, 0.1, // 低于阈值
      ],
    },
    prototypes: None,
  };

  let out = dir.join("out.png");
  let input = SourceWrapper::from_url(&url("clip", &frames, "")).unwrap();
  let model = ModelWrapper::from_url(&write_replay(&dir, &document)).unwrap();
  let output = OutputWrapper::from_url(&url("image", &out, "")).unwrap();

  OneShotTask::new(settings(CompositeMode::Overlay))
    .run_task(input, model, output)
    .unwrap();

  let saved = image::open(&out).unwrap().to_rgba8();
  assert_eq!(saved.dimensions(), (16, 16));

  let green = saved.pixels().filter(|p| **p == GREEN).count();
  assert_eq!(green, 24);
  assert_eq!(*saved.get_pixel(4, 5), GREEN);
  assert_eq!(*saved.get_pixel(12, 1), GREEN);
  assert_eq!(*saved.get_pixel(8, 3), GRAY);
  assert_eq!(*saved.get_pixel(0, 0), GRAY);

  std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_continuous_transparent_masks_to_directory() {
  let dir = workspace("continuous");
  let frame = dir.join("still.png");
  RgbImage::from_pixel(16, 16, Rgb([50, 50, 50]))
    .save(&frame)
    .unwrap();

  // 一个带掩膜的类别 0 检测，框 (4, 4, 8, 8)
  let document = ReplayDocument {
    input_width: 16,
    input_height: 16,
    boxes: TensorDump {
      shape: vec![1, 7],
      data: vec![8.0, 8.0, 8.0, 8.0, 0.9, 0.0, 1.0],
    },
    prototypes: Some(TensorDump {
      shape: vec![1, 4, 4],
      data: vec![10.0; 16],
    }),
  };

  let record = dir.join("record");
  let input = SourceWrapper::from_url(&url("clip", &frame, "")).unwrap();
  let model = ModelWrapper::from_url(&write_replay(&dir, &document)).unwrap();
  let output = OutputWrapper::from_url(&url("folder", &record, "?record=name&always")).unwrap();

  ContinuousTask::new(settings(CompositeMode::Transparent))
    .with_frame_number(Some(2))
    .run_task(input, model, output)
    .unwrap();

  let mut images = Vec::new();
  collect(&record, "png", &mut images);
  let mut records = Vec::new();
  collect(&record, "txt", &mut records);
  assert_eq!(images.len(), 2);
  assert_eq!(records.len(), 2);
  assert_eq!(
    std::fs::read_to_string(&records[0]).unwrap(),
    "person, 0.9000, 4.0, 4.0, 8.0, 8.0"
  );

  let saved = image::open(&images[0]).unwrap().to_rgba8();
  let red = Rgba([255, 0, 0, 255]);
  // 边框 32 个像素，另有 2 个掩膜像素没有被边框覆盖
  assert_eq!(saved.pixels().filter(|p| **p == red).count(), 32);
  assert_eq!(saved.pixels().filter(|p| p.0[3] != 0).count(), 34);
  for (x, y) in [(8, 4), (8, 8)] {
    let Rgba([r, g, b, a]) = *saved.get_pixel(x, y);
    assert_eq!([r, g, b], [255, 0, 0]);
    assert!((77..=179).contains(&a), "透明度 {} 超出范围", a);
  }
  // 源画面没有进入透明输出
  assert_eq!(saved.get_pixel(0, 0).0[3], 0);

  std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_empty_clip_fails_to_start() {
  let dir = workspace("empty");
  let document = ReplayDocument {
    input_width: 8,
    input_height: 8,
    boxes: TensorDump {
      shape: vec![1, 6],
      data: vec![0.0; 6],
    },
    prototypes: None,
  };

  let input = SourceWrapper::from_url(&url("clip", &dir.join("none"), "")).unwrap();
  let model = ModelWrapper::from_url(&write_replay(&dir, &document)).unwrap();
  let output = OutputWrapper::from_url(&url("image", &dir.join("out.png"), "")).unwrap();

  let err = OneShotTask::new(settings(CompositeMode::Overlay))
    .run_task(input, model, output)
    .unwrap_err();
  assert!(matches!(
    err.downcast_ref::<InputError>(),
    Some(InputError::ClipUnset(_))
  ));
  assert!(!dir.join("out.png").exists());

  std::fs::remove_dir_all(&dir).ok();
}
